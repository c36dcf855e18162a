use std::sync::Arc;

use anyhow::Result;

use crate::models::message::Message;
use crate::prompt::GUARDIAN_PROMPT;
use crate::providers::base::Provider;

/// Fixed refusal returned when the guardian rejects a request
pub const REFUSAL_MESSAGE: &str =
    "Lo siento, no puedo procesar esa solicitud por motivos de seguridad.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Malicious,
}

/// Single-shot safety classifier gating the main agent.
///
/// The model is asked for exactly one word ('segura' or 'maliciosa'). The
/// check is substring based: only an output containing 'maliciosa' blocks the
/// request, so ambiguous or multi-word output fails open to Safe.
pub struct Guardian {
    provider: Arc<dyn Provider>,
}

impl Guardian {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub async fn classify(&self, query: &str) -> Result<Verdict> {
        tracing::info!(query, "guardian analyzing query");

        let messages = vec![Message::user().with_text(query)];
        let (response, _usage) = self.provider.complete(GUARDIAN_PROMPT, &messages, &[]).await?;

        let classification = response.text().unwrap_or_default().trim().to_lowercase();
        tracing::info!(classification, "guardian verdict");

        if classification.contains("maliciosa") {
            Ok(Verdict::Malicious)
        } else {
            Ok(Verdict::Safe)
        }
    }
}
