use std::sync::Arc;

use anyhow::Result;

use super::{base::Provider, configs::ProviderConfig, gemini::GeminiProvider};

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config {
        ProviderConfig::Gemini(gemini_config) => Ok(Arc::new(GeminiProvider::new(gemini_config)?)),
    }
}
