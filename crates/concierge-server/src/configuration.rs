use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::MissingEnvVar {
                env_var: to_env_var("server.host"),
            })
    }
}

/// Hosted model settings: one API key covers completion, embedding,
/// transcription and speech synthesis.
#[derive(Debug, Deserialize)]
pub struct GeminiSettings {
    #[serde(default = "default_gemini_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

/// The managed backend hosting both the similarity-search RPC and the
/// chat history table
#[derive(Debug, Deserialize)]
pub struct BackendSettings {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_rpc_function")]
    pub rpc_function: String,
    #[serde(default = "default_history_table")]
    pub history_table: String,
}

#[derive(Debug, Deserialize)]
pub struct RerankerSettings {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CrmSettings {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaSettings {
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            audio_dir: default_audio_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub gemini: GeminiSettings,
    pub backend: BackendSettings,
    pub reranker: RerankerSettings,
    #[serde(default)]
    pub crm: CrmSettings,
    #[serde(default)]
    pub media: MediaSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("CONCIERGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Surface missing fields as the environment variable a user would set
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches("`");
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_gemini_host() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_tts_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

fn default_voice() -> String {
    "Kore".to_string()
}

fn default_rpc_function() -> String {
    "buscar_similares".to_string()
}

fn default_history_table() -> String {
    "historial_chat".to_string()
}

fn default_image_dir() -> String {
    "/tmp/temp_images".to_string()
}

fn default_audio_dir() -> String {
    "/tmp/temp_audio".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("CONCIERGE_") {
                env::remove_var(&key);
            }
        }
    }

    fn set_required() {
        env::set_var("CONCIERGE_GEMINI__API_KEY", "test-key");
        env::set_var("CONCIERGE_BACKEND__URL", "https://backend.example.com");
        env::set_var("CONCIERGE_BACKEND__API_KEY", "backend-key");
        env::set_var("CONCIERGE_RERANKER__URL", "https://rerank.example.com/score");
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        set_required();

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.gemini.api_key, "test-key");
        assert_eq!(settings.gemini.model, "gemini-2.5-flash");
        assert_eq!(settings.gemini.tts_model, "gemini-2.5-flash-preview-tts");
        assert_eq!(settings.gemini.embedding_model, "text-embedding-004");
        assert_eq!(settings.gemini.voice, "Kore");
        assert_eq!(settings.gemini.temperature, None);
        assert_eq!(settings.backend.rpc_function, "buscar_similares");
        assert_eq!(settings.backend.history_table, "historial_chat");
        assert_eq!(settings.crm.base_url, None);
        assert_eq!(settings.media.image_dir, "/tmp/temp_images");
        assert_eq!(settings.media.audio_dir, "/tmp/temp_audio");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        set_required();
        env::set_var("CONCIERGE_SERVER__PORT", "8080");
        env::set_var("CONCIERGE_GEMINI__MODEL", "gemini-2.0-flash");
        env::set_var("CONCIERGE_GEMINI__TEMPERATURE", "0.7");
        env::set_var("CONCIERGE_CRM__BASE_URL", "https://crm.example.com/clients");
        env::set_var("CONCIERGE_MEDIA__AUDIO_DIR", "/var/tmp/audio");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.gemini.model, "gemini-2.0-flash");
        assert_eq!(settings.gemini.temperature, Some(0.7));
        assert_eq!(
            settings.crm.base_url.as_deref(),
            Some("https://crm.example.com/clients")
        );
        assert_eq!(settings.media.audio_dir, "/var/tmp/audio");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key_names_env_var() {
        clean_env();
        env::set_var("CONCIERGE_GEMINI__MODEL", "gemini-2.5-flash");
        env::set_var("CONCIERGE_BACKEND__URL", "https://backend.example.com");
        env::set_var("CONCIERGE_BACKEND__API_KEY", "backend-key");
        env::set_var("CONCIERGE_RERANKER__URL", "https://rerank.example.com/score");

        let err = Settings::new().unwrap_err();
        match err {
            ConfigError::MissingEnvVar { env_var } => {
                assert!(env_var.starts_with("CONCIERGE_"));
            }
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
