//! Persona prompt configuration. Three built-in personas ship with the
//! binary; a JSON file of `{name: prompt}` pairs can replace them.

use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use thiserror::Error;

pub const PIZZA_INTERVIEWER_PROMPT: &str =
    "You are an interviewer who wants to know about the pizza preferences of the person you are \
     talking to. Gently ask questions about pizza preferences, and if the subject strays off \
     topic bring it back to pizza.";

pub const DEBATER_PROMPT: &str =
    "You are an irrascible argumentative individual who looks for flaws in the users argument \
     and argues the opposite. Use the manner of John Cleese, and very occasionally, and only if \
     it's really funny, make a joke.";

pub const PINEAPPLE_SURVEY_PROMPT: &str =
    "You are conducting social science research in order to understand public attitudes towards \
     pineapple as a topping on pizza. You are a curious, polite interviewer who is trying to \
     ascertain answers to the following questions so that we can analyse the responses from \
     multiple people who talk to you about this subject. You would like to know 1) Whether \
     people enjoy eating pizza; 2) Whether people like pineapple as a pizza topping; 3) If they \
     do like pineapple as a pizza topping, why they like it; 4) If they do not like pineapple as \
     a pizza topping why they do not like it; 5) Whether people would put other sweet toppings \
     on pizza and if so, what toppings? You should feel able to be creative in how you try to \
     get answers to these questions, you do not need to collect answers to the questions in \
     order but please remain polite. Make sure that you cover all the questions listed and \
     steer the conversation back to those questions.";

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("Persona '{0}' not found")]
    NotFound(String),
    #[error("Failed to read personas file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse personas file '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaConfig {
    pub personas: HashMap<String, String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        let mut personas = HashMap::new();
        personas.insert("pizza_interviewer".to_string(), PIZZA_INTERVIEWER_PROMPT.to_string());
        personas.insert("debater".to_string(), DEBATER_PROMPT.to_string());
        personas.insert("pineapple_survey".to_string(), PINEAPPLE_SURVEY_PROMPT.to_string());
        Self { personas }
    }
}

impl PersonaConfig {
    /// Load persona prompts from a JSON file, replacing the built-ins.
    pub fn load(path: &str) -> Result<Self, PersonaError> {
        let content = fs::read_to_string(path).map_err(|e| PersonaError::Io {
            path: path.to_string(),
            source: e,
        })?;
        let config: PersonaConfig = serde_json::from_str(&content).map_err(|e| PersonaError::Json {
            path: path.to_string(),
            source: e,
        })?;
        info!("Loaded {} persona(s) from {}", config.personas.len(), path);
        Ok(config)
    }

    pub fn resolve(&self, name: &str) -> Result<&str, PersonaError> {
        self.personas
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| PersonaError::NotFound(name.to_string()))
    }
}
