use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indoc::indoc;
use serde_json::json;

use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::Provider;

const VISION_INSTRUCTIONS: &str =
    "Describe el contenido de la imagen adjunta según la petición del usuario.";

/// Image description through the multi-modal provider.
///
/// The temporary image file is deleted on every exit path, success or not.
pub struct VisionSystem {
    provider: Arc<dyn Provider>,
    tools: Vec<Tool>,
}

impl VisionSystem {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let tools = vec![Tool::new(
            "describe_image",
            "Analiza el contenido de una imagen ubicada en la ruta (image_path) y devuelve una descripción según el texto que el usuario envió como prompt. Debe ser invocada antes de intentar responder a una pregunta que involucre una imagen.",
            json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string"},
                    "image_path": {"type": "string"}
                },
                "required": ["prompt", "image_path"]
            }),
        )];

        Self { provider, tools }
    }

    async fn describe(&self, prompt: &str, image_path: &str) -> String {
        tracing::info!(image_path, "describing image");

        let bytes = match tokio::fs::read(image_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return format!(
                    "Error al analizar la imagen desde la ruta {}: {}",
                    image_path, e
                )
            }
        };

        let mime_type = if image_path.ends_with(".jpg") || image_path.ends_with(".jpeg") {
            "image/jpeg"
        } else {
            "image/png"
        };

        let message = Message::user()
            .with_text(prompt)
            .with_image(BASE64.encode(bytes), mime_type);

        match self
            .provider
            .complete(VISION_INSTRUCTIONS, &[message], &[])
            .await
        {
            Ok((response, _usage)) => response
                .text()
                .unwrap_or_else(|| "No pude describir la imagen.".to_string()),
            Err(e) => format!(
                "Error al analizar la imagen desde la ruta {}: {}",
                image_path, e
            ),
        }
    }
}

#[async_trait]
impl System for VisionSystem {
    fn name(&self) -> &str {
        "vision"
    }

    fn description(&self) -> &str {
        "Descripción de imágenes adjuntadas por el usuario"
    }

    fn instructions(&self) -> &str {
        indoc! {"
            Si el usuario adjuntó una imagen, llama a describe_image con la
            ruta indicada antes de responder cualquier pregunta sobre ella.
        "}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "describe_image" => {
                let prompt = tool_call.arguments["prompt"].as_str().ok_or_else(|| {
                    AgentError::InvalidParameters("'prompt' must be a string".to_string())
                })?;
                let image_path = tool_call.arguments["image_path"].as_str().ok_or_else(|| {
                    AgentError::InvalidParameters("'image_path' must be a string".to_string())
                })?;

                let description = self.describe(prompt, image_path).await;

                // Unconditional cleanup, the file is read exactly once
                if Path::new(image_path).exists() {
                    if let Err(e) = tokio::fs::remove_file(image_path).await {
                        tracing::warn!(image_path, error = %e, "could not remove temp image");
                    }
                }

                Ok(vec![Content::text(description)])
            }
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
