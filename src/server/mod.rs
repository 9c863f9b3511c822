pub mod api;

use crate::cli::Args;
use api::AppState;
use std::error::Error;
use std::net::SocketAddr;
use log::{ info, error };

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = api::app(self.state.clone());

        if self.args.enable_tls {
            let (cert_path, key_path) = match (
                &self.args.tls_cert_path,
                &self.args.tls_key_path,
            ) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    error!("--enable-tls was set but no certificate/key paths provided.");
                    return Err("TLS enabled without cert/key".into());
                }
            };

            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;

            info!("Relay listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        } else {
            info!("Relay listening on: http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await
                .map_err(|e| format!("Failed to bind relay server to {}: {}", addr, e))?;
            axum::serve(listener, app.into_make_service()).await?;
        }

        Ok(())
    }
}
