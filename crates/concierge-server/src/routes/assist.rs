use std::collections::HashMap;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use concierge::agent::Agent;
use concierge::guardian::{Guardian, Verdict, REFUSAL_MESSAGE};
use concierge::models::message::Message;
use concierge::models::role::Role;
use concierge::speech::{encode_wav, markdown_to_plain};
use concierge::systems::crm::CrmSystem;
use concierge::systems::documents::{DocumentSystem, SEARCH_DOCUMENTS_TOOL};
use concierge::systems::transcribe::SpeechSystem;
use concierge::systems::vision::VisionSystem;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

const FALLBACK_RESPONSE: &str = "No pude procesar la respuesta.";

#[derive(Debug, Deserialize)]
pub struct AssistRequest {
    #[serde(default)]
    pub consulta: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub session_id: String,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub audio_base64: Option<String>,
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct AssistResponse {
    pub respuesta: String,
    pub contexto: Vec<String>,
}

/// Any error bubbling out of the handler becomes a 500 with the detail in
/// the body, matching the JSON error shape clients already expect
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": self.0.to_string()})),
        )
            .into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/assist", post(assist_handler))
        .with_state(state)
}

async fn assist_handler(
    State(state): State<AppState>,
    Json(payload): Json<AssistRequest>,
) -> Result<Response, ApiError> {
    let mut consulta = payload.consulta.clone().unwrap_or_default();

    // Safety gate on text queries. Voice queries go straight to the agent
    // since there is no text to classify before transcription.
    if !consulta.is_empty() && payload.audio_base64.is_none() {
        let guardian = Guardian::new(state.provider.clone());
        if guardian.classify(&consulta).await? == Verdict::Malicious {
            return Ok(Json(AssistResponse {
                respuesta: REFUSAL_MESSAGE.to_string(),
                contexto: Vec::new(),
            })
            .into_response());
        }
    }

    // Attachments land on disk; the tools receive paths, not payloads.
    // A voice note replaces the text query, an image is appended to it.
    if let Some(audio_base64) = &payload.audio_base64 {
        let bytes = BASE64.decode(audio_base64)?;
        let audio_path = state.audio_dir.join(format!("{}_audio.wav", Uuid::new_v4()));
        tokio::fs::write(&audio_path, bytes).await?;
        consulta = format!(
            "El usuario envió un audio. Transcríbelo. Ruta: {}",
            audio_path.display()
        );
    }

    if let Some(image_base64) = &payload.image_base64 {
        let bytes = BASE64.decode(image_base64)?;
        let image_path = state.image_dir.join(format!("{}_image.png", Uuid::new_v4()));
        tokio::fs::write(&image_path, bytes).await?;
        consulta.push_str(&format!(
            "[El usuario también adjuntó una imagen] Ruta: {}",
            image_path.display()
        ));
    }

    let mut agent = Agent::new(state.provider.clone());
    agent.add_system(Box::new(DocumentSystem::new(
        state.retriever.clone(),
        payload.top_k,
    )));
    agent.add_system(Box::new(CrmSystem::new(state.crm_base_url.clone())?));
    agent.add_system(Box::new(VisionSystem::new(state.provider.clone())));
    agent.add_system(Box::new(SpeechSystem::new(state.transcriber.clone())));

    let user_message = Message::user().with_text(&consulta);
    let mut messages = state.session_store.history(&payload.session_id).await?;
    messages.push(user_message.clone());

    let search_tool = format!("documents__{}", SEARCH_DOCUMENTS_TOOL);
    let mut tool_names: HashMap<String, String> = HashMap::new();
    let mut contexto: Vec<String> = Vec::new();
    let mut respuesta = FALLBACK_RESPONSE.to_string();

    let mut stream = agent.reply(&messages).await?;
    while let Some(message) = stream.next().await {
        let message = message?;

        for request in message.content.iter().filter_map(|c| c.as_tool_request()) {
            if let Ok(call) = &request.tool_call {
                tool_names.insert(request.id.clone(), call.name.clone());
            }
        }

        // Document search output is surfaced to the client alongside the answer
        for response in message.content.iter().filter_map(|c| c.as_tool_response()) {
            let is_search = tool_names
                .get(&response.id)
                .map(|name| name == &search_tool)
                .unwrap_or(false);
            if !is_search {
                continue;
            }
            if let Ok(contents) = &response.tool_result {
                contexto.extend(
                    contents
                        .iter()
                        .filter_map(|c| c.as_text())
                        .map(str::to_string),
                );
            }
        }

        if message.role == Role::Assistant {
            if let Some(text) = message.text() {
                respuesta = text;
            }
        }
    }

    state
        .session_store
        .append(
            &payload.session_id,
            &[user_message, Message::assistant().with_text(&respuesta)],
        )
        .await?;

    // Voice in, voice out. A synthesis failure degrades to the JSON reply
    // rather than failing the whole request.
    if payload.audio_base64.is_some() {
        match state
            .synthesizer
            .synthesize(&markdown_to_plain(&respuesta))
            .await
        {
            Ok(pcm) => {
                return Ok((
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, "audio/wav"),
                        (
                            header::CONTENT_DISPOSITION,
                            "attachment; filename=\"response.wav\"",
                        ),
                    ],
                    encode_wav(&pcm),
                )
                    .into_response());
            }
            Err(e) => {
                tracing::error!(error = %e, "audio synthesis failed, falling back to text");
            }
        }
    }

    Ok(Json(AssistResponse {
        respuesta,
        contexto,
    })
    .into_response())
}
