use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use concierge::providers::base::Provider;
use concierge::providers::configs::{GeminiProviderConfig, ProviderConfig};
use concierge::providers::factory::get_provider;
use concierge::retrieval::{GeminiEmbedder, HttpScorer, Retriever, RpcVectorSearch};
use concierge::session::{RestSessionStore, SessionStore};
use concierge::speech::{GeminiSynthesizer, Synthesizer};
use concierge::systems::transcribe::{GeminiTranscriber, Transcriber};

use crate::configuration::Settings;

/// Shared application state. All remote dependencies live behind trait
/// objects so the routes can be exercised with in-process stand-ins.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub retriever: Arc<Retriever>,
    pub session_store: Arc<dyn SessionStore>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub crm_base_url: Option<String>,
    pub image_dir: PathBuf,
    pub audio_dir: PathBuf,
}

impl AppState {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider = get_provider(ProviderConfig::Gemini(GeminiProviderConfig {
            host: settings.gemini.host.clone(),
            api_key: settings.gemini.api_key.clone(),
            model: settings.gemini.model.clone(),
            temperature: settings.gemini.temperature,
            max_tokens: settings.gemini.max_tokens,
        }))?;

        let embedder = GeminiEmbedder::new(
            settings.gemini.host.clone(),
            settings.gemini.api_key.clone(),
            settings.gemini.embedding_model.clone(),
        )?;
        let search = RpcVectorSearch::new(
            settings.backend.url.clone(),
            settings.backend.api_key.clone(),
            settings.backend.rpc_function.clone(),
        )?;
        let scorer = HttpScorer::new(settings.reranker.url.clone())?;
        let retriever = Retriever::new(Arc::new(embedder), Arc::new(search), Arc::new(scorer));

        let session_store = RestSessionStore::new(
            settings.backend.url.clone(),
            settings.backend.api_key.clone(),
            settings.backend.history_table.clone(),
        )?;

        let synthesizer = GeminiSynthesizer::new(
            settings.gemini.host.clone(),
            settings.gemini.api_key.clone(),
            settings.gemini.tts_model.clone(),
            settings.gemini.voice.clone(),
        )?;

        let transcriber = GeminiTranscriber::new(
            settings.gemini.host.clone(),
            settings.gemini.api_key.clone(),
            settings.gemini.model.clone(),
        )?;

        Ok(Self {
            provider,
            retriever: Arc::new(retriever),
            session_store: Arc::new(session_store),
            synthesizer: Arc::new(synthesizer),
            transcriber: Arc::new(transcriber),
            crm_base_url: settings.crm.base_url.clone(),
            image_dir: PathBuf::from(&settings.media.image_dir),
            audio_dir: PathBuf::from(&settings.media.audio_dir),
        })
    }
}
