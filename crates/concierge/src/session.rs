use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;

/// Per-session conversation history, keyed by session id.
///
/// History is append-only and externally persisted; no local cache and no
/// read-modify-write protection, those guarantees are the backend's.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the full ordered history for a session
    async fn history(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Append messages to the end of a session's history
    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    session_id: String,
    message: Message,
}

/// Session history stored in a managed PostgREST-style table with
/// `session_id` and `message` (JSON) columns.
pub struct RestSessionStore {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl RestSessionStore {
    pub fn new(base_url: String, api_key: String, table: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(600)).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            table,
        })
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        )
    }
}

#[async_trait]
impl SessionStore for RestSessionStore {
    async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        let response = self
            .client
            .get(self.table_url())
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .query(&[
                ("select", "session_id,message"),
                ("session_id", &format!("eq.{}", session_id)),
                ("order", "id.asc"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let rows: Vec<HistoryRow> = response.json().await?;
        Ok(rows.into_iter().map(|row| row.message).collect())
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let rows: Vec<HistoryRow> = messages
            .iter()
            .map(|message| HistoryRow {
                session_id: session_id.to_string(),
                message: message.clone(),
            })
            .collect();

        self.client
            .post(self.table_url())
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=minimal")
            .json(&rows)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// In-process store used by tests and local development
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        let sessions = self.sessions.lock().expect("session lock");
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let mut sessions = self.sessions.lock().expect("session lock");
        sessions
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        let user = Message::user().with_text("hola");
        let assistant = Message::assistant().with_text("¡Hola!");

        store.append("s1", &[user.clone(), assistant.clone()]).await.unwrap();
        let history = store.history("s1").await.unwrap();
        assert_eq!(history, vec![user, assistant]);

        // Sessions are isolated
        assert!(store.history("s2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rest_store_history() {
        let server = MockServer::start().await;
        let row = json!({
            "session_id": "s1",
            "message": Message::user().with_text("hola")
        });
        Mock::given(method("GET"))
            .and(path("/rest/v1/chat_history"))
            .and(query_param("session_id", "eq.s1"))
            .and(header("apikey", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
            .mount(&server)
            .await;

        let store = RestSessionStore::new(
            server.uri(),
            "secret".to_string(),
            "chat_history".to_string(),
        )
        .unwrap();

        let history = store.history("s1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text().as_deref(), Some("hola"));
    }

    #[tokio::test]
    async fn test_rest_store_append() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/chat_history"))
            .and(header("Prefer", "return=minimal"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestSessionStore::new(
            server.uri(),
            "secret".to_string(),
            "chat_history".to_string(),
        )
        .unwrap();

        store
            .append("s1", &[Message::user().with_text("hola")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rest_store_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = RestSessionStore::new(
            server.uri(),
            "secret".to_string(),
            "chat_history".to_string(),
        )
        .unwrap();

        assert!(store.history("s1").await.is_err());
    }
}
