use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a config field path like `gemini.api_key` back to the environment
/// variable a user would set, `CONCIERGE_GEMINI__API_KEY`
pub fn to_env_var(field: &str) -> String {
    format!("CONCIERGE_{}", field.replace('.', "__").to_uppercase())
}
