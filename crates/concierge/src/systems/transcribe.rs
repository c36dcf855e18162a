use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use indoc::indoc;
use reqwest::Client;
use serde_json::json;

use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// Speech-to-text over a hosted model
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Transcription through the Gemini file store: upload the audio, request a
/// transcription referencing the uploaded file, then delete the remote copy.
pub struct GeminiTranscriber {
    client: Client,
    host: String,
    api_key: String,
    model: String,
}

impl GeminiTranscriber {
    pub fn new(host: String, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(600)).build()?;
        Ok(Self {
            client,
            host,
            api_key,
            model,
        })
    }

    async fn upload(&self, audio_path: &Path) -> Result<(String, String)> {
        let bytes = tokio::fs::read(audio_path).await?;
        let url = format!("{}/upload/v1beta/files", self.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", "audio/wav")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        let name = body["file"]["name"]
            .as_str()
            .ok_or_else(|| anyhow!("No file name in upload response"))?
            .to_string();
        let uri = body["file"]["uri"]
            .as_str()
            .ok_or_else(|| anyhow!("No file uri in upload response"))?
            .to_string();
        Ok((name, uri))
    }

    async fn generate_transcript(&self, file_uri: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.host.trim_end_matches('/'),
            self.model
        );

        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": "Transcribe el siguiente audio:"},
                    {"fileData": {"mimeType": "audio/wav", "fileUri": file_uri}}
                ]
            }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("No transcript in response"))
    }

    async fn delete_remote(&self, file_name: &str) {
        let url = format!("{}/v1beta/{}", self.host.trim_end_matches('/'), file_name);
        let result = self
            .client
            .delete(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!(file_name, error = %e, "could not delete remote audio file");
        }
    }
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let (name, uri) = self.upload(audio_path).await?;
        let transcript = self.generate_transcript(&uri).await;
        // The remote copy is removed whether or not transcription succeeded
        self.delete_remote(&name).await;
        transcript
    }
}

/// Audio transcription bound to the agent.
///
/// The temporary audio file is deleted on every exit path, success or not.
pub struct SpeechSystem {
    transcriber: Arc<dyn Transcriber>,
    tools: Vec<Tool>,
}

impl SpeechSystem {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        let tools = vec![Tool::new(
            "transcribe_audio",
            "Útil para transcribir un archivo de audio a texto. Recibe la ruta a un archivo de audio local y devuelve el texto contenido en él. Este debe ser el primer paso si el usuario envía una consulta de voz.",
            json!({
                "type": "object",
                "properties": {
                    "audio_path": {"type": "string"}
                },
                "required": ["audio_path"]
            }),
        )];

        Self { transcriber, tools }
    }
}

#[async_trait]
impl System for SpeechSystem {
    fn name(&self) -> &str {
        "speech"
    }

    fn description(&self) -> &str {
        "Transcripción de audios enviados por el usuario"
    }

    fn instructions(&self) -> &str {
        indoc! {"
            Si el usuario envió un audio, llama a transcribe_audio con la ruta
            indicada como primer paso y responde a la consulta transcrita.
        "}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "transcribe_audio" => {
                let audio_path = tool_call.arguments["audio_path"].as_str().ok_or_else(|| {
                    AgentError::InvalidParameters("'audio_path' must be a string".to_string())
                })?;

                tracing::info!(audio_path, "transcribing audio");
                let result = self.transcriber.transcribe(Path::new(audio_path)).await;

                // Unconditional cleanup, the file is read exactly once
                if Path::new(audio_path).exists() {
                    if let Err(e) = tokio::fs::remove_file(audio_path).await {
                        tracing::warn!(audio_path, error = %e, "could not remove temp audio");
                    }
                }

                let text = match result {
                    Ok(transcript) => transcript,
                    Err(e) => format!("Error al transcribir el audio: {}", e),
                };
                Ok(vec![Content::text(text)])
            }
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
