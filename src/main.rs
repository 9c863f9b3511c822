use clap::Parser;
use converse_relay::cli::Args;
use converse_relay::client::ChatSession;
use dotenv::dotenv;
use std::error::Error;
use std::io::Write;
use log::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(prompt) = args.ask.clone() {
        return ask(&args, &prompt).await;
    }

    converse_relay::run(args).await
}

/// One-shot client mode: send a single prompt through a running relay and
/// stream the reply to stdout.
async fn ask(args: &Args, prompt: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut session = ChatSession::new(&args.relay_url);

    let result = session.send(prompt, &args.temperature, |delta| {
        print!("{}", delta);
        let _ = std::io::stdout().flush();
    }).await;

    println!();
    if let Err(e) = result {
        error!("Request failed: {}", e);
        return Err(Box::new(e));
    }
    Ok(())
}
