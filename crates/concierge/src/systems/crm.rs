use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use indoc::indoc;
use serde_json::json;

use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

const URL_NOT_CONFIGURED: &str =
    "Error: La URL del CRM no está configurada en las variables de entorno.";

/// Customer CRUD against a configurable REST backend.
///
/// Contract: any transport error or non-2xx response becomes a descriptive
/// string handed back to the agent, never an Err. A single attempt per call,
/// no retries, no validation beyond what the remote service enforces.
pub struct CrmSystem {
    client: reqwest::Client,
    base_url: Option<String>,
    tools: Vec<Tool>,
}

impl CrmSystem {
    pub fn new(base_url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        let tools = vec![
            Tool::new(
                "get_customer",
                "Útil para los detalles de un cliente por su id en el sistema CRM.",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer", "description": "Id del cliente"}
                    },
                    "required": ["id"]
                }),
            ),
            Tool::new(
                "create_customer",
                "Útil para CREAR o REGISTRAR un nuevo cliente. Necesita el nombre y el email.",
                json!({
                    "type": "object",
                    "properties": {
                        "nombre": {"type": "string"},
                        "email": {"type": "string"}
                    },
                    "required": ["nombre", "email"]
                }),
            ),
            Tool::new(
                "update_customer",
                "Útil para ACTUALIZAR o EDITAR un cliente existente. Necesita el ID del cliente y los nuevos datos de nombre y email.",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer"},
                        "nombre": {"type": "string"},
                        "email": {"type": "string"}
                    },
                    "required": ["id", "nombre", "email"]
                }),
            ),
            Tool::new(
                "delete_customer",
                "Útil para BORRAR o ELIMINAR un cliente del sistema. Necesita el ID del cliente.",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "integer"}
                    },
                    "required": ["id"]
                }),
            ),
        ];

        Ok(Self {
            client,
            base_url,
            tools,
        })
    }

    fn require_id(tool_call: &ToolCall) -> AgentResult<i64> {
        tool_call.arguments["id"]
            .as_i64()
            .ok_or_else(|| AgentError::InvalidParameters("'id' must be an integer".to_string()))
    }

    fn require_str<'a>(tool_call: &'a ToolCall, field: &str) -> AgentResult<&'a str> {
        tool_call.arguments[field].as_str().ok_or_else(|| {
            AgentError::InvalidParameters(format!("'{}' must be a string", field))
        })
    }

    async fn get_customer(&self, base: &str, id: i64) -> String {
        tracing::info!(id, "crm lookup");
        let result = self.client.get(format!("{}/{}", base, id)).send().await;
        match result {
            Ok(response) => match response.error_for_status() {
                Ok(response) => match response.text().await {
                    Ok(body) if body.trim().is_empty() || body.trim() == "null" => {
                        format!("No se encontró ningún cliente con el id '{}'.", id)
                    }
                    Ok(body) => body,
                    Err(e) => format!("Ocurrió un error al contactar la API del CRM: {}", e),
                },
                Err(e) => format!("Ocurrió un error al contactar la API del CRM: {}", e),
            },
            Err(e) => format!("Ocurrió un error al contactar la API del CRM: {}", e),
        }
    }

    async fn create_customer(&self, base: &str, nombre: &str, email: &str) -> String {
        tracing::info!(nombre, "crm create");
        let body = json!({
            "name": nombre,
            "email": email,
            "createdAt": Utc::now().to_rfc3339(),
        });

        let result = async {
            let response = self
                .client
                .post(base)
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            response.json::<serde_json::Value>().await
        }
        .await;

        match result {
            Ok(created) => format!(
                "Cliente '{}' registrado con éxito. Su nuevo ID es {}.",
                nombre, created["id"]
            ),
            Err(e) => format!("Error al registrar cliente: {}", e),
        }
    }

    async fn update_customer(&self, base: &str, id: i64, nombre: &str, email: &str) -> String {
        tracing::info!(id, "crm update");
        let body = json!({"name": nombre, "email": email});

        let result = async {
            self.client
                .put(format!("{}/{}", base, id))
                .json(&body)
                .send()
                .await?
                .error_for_status()
        }
        .await;

        match result {
            Ok(_) => format!("Cliente con ID {} actualizado correctamente.", id),
            Err(e) => format!("Error al editar cliente: {}", e),
        }
    }

    async fn delete_customer(&self, base: &str, id: i64) -> String {
        tracing::info!(id, "crm delete");
        let result = async {
            self.client
                .delete(format!("{}/{}", base, id))
                .send()
                .await?
                .error_for_status()
        }
        .await;

        match result {
            Ok(_) => format!("Cliente con ID {} eliminado correctamente.", id),
            Err(e) => format!("Error al eliminar cliente: {}", e),
        }
    }
}

#[async_trait]
impl System for CrmSystem {
    fn name(&self) -> &str {
        "crm"
    }

    fn description(&self) -> &str {
        "Gestión de clientes en el sistema CRM"
    }

    fn instructions(&self) -> &str {
        indoc! {"
            Usa estas herramientas para consultar, registrar, editar o
            eliminar clientes. Pide el id cuando la operación lo requiera.
        "}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let base = match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => return Ok(vec![Content::text(URL_NOT_CONFIGURED)]),
        };

        let message = match tool_call.name.as_str() {
            "get_customer" => {
                let id = Self::require_id(&tool_call)?;
                self.get_customer(&base, id).await
            }
            "create_customer" => {
                let nombre = Self::require_str(&tool_call, "nombre")?;
                let email = Self::require_str(&tool_call, "email")?;
                self.create_customer(&base, nombre, email).await
            }
            "update_customer" => {
                let id = Self::require_id(&tool_call)?;
                let nombre = Self::require_str(&tool_call, "nombre")?;
                let email = Self::require_str(&tool_call, "email")?;
                self.update_customer(&base, id, nombre, email).await
            }
            "delete_customer" => {
                let id = Self::require_id(&tool_call)?;
                self.delete_customer(&base, id).await
            }
            _ => return Err(AgentError::ToolNotFound(tool_call.name)),
        };

        Ok(vec![Content::text(message)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_customer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 12, "name": "Ana", "email": "ana@example.com"
            })))
            .mount(&server)
            .await;

        let system = CrmSystem::new(Some(server.uri())).unwrap();
        let output = system
            .call(ToolCall::new("get_customer", json!({"id": 12})))
            .await
            .unwrap();
        assert!(output[0].as_text().unwrap().contains("Ana"));
    }

    #[tokio::test]
    async fn test_non_2xx_becomes_descriptive_string() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/99"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let system = CrmSystem::new(Some(server.uri())).unwrap();
        let output = system
            .call(ToolCall::new("get_customer", json!({"id": 99})))
            .await
            .unwrap();
        let text = output[0].as_text().unwrap();
        assert!(text.contains("Ocurrió un error al contactar la API del CRM"));
    }

    #[tokio::test]
    async fn test_create_customer_reports_new_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({"name": "Ana", "email": "ana@example.com"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
            .mount(&server)
            .await;

        let system = CrmSystem::new(Some(server.uri())).unwrap();
        let output = system
            .call(ToolCall::new(
                "create_customer",
                json!({"nombre": "Ana", "email": "ana@example.com"}),
            ))
            .await
            .unwrap();
        let text = output[0].as_text().unwrap();
        assert!(text.contains("registrado con éxito"));
        assert!(text.contains('7'));
    }

    #[tokio::test]
    async fn test_create_failure_is_ok_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let system = CrmSystem::new(Some(server.uri())).unwrap();
        let output = system
            .call(ToolCall::new(
                "create_customer",
                json!({"nombre": "Ana", "email": "ana@example.com"}),
            ))
            .await
            .unwrap();
        assert!(output[0].as_text().unwrap().contains("Error al registrar cliente"));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/3"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let system = CrmSystem::new(Some(server.uri())).unwrap();
        let updated = system
            .call(ToolCall::new(
                "update_customer",
                json!({"id": 3, "nombre": "Ana", "email": "ana@example.com"}),
            ))
            .await
            .unwrap();
        assert!(updated[0].as_text().unwrap().contains("actualizado correctamente"));

        let deleted = system
            .call(ToolCall::new("delete_customer", json!({"id": 3})))
            .await
            .unwrap();
        assert!(deleted[0].as_text().unwrap().contains("eliminado correctamente"));
    }

    #[tokio::test]
    async fn test_missing_base_url() {
        let system = CrmSystem::new(None).unwrap();
        let output = system
            .call(ToolCall::new("get_customer", json!({"id": 1})))
            .await
            .unwrap();
        assert_eq!(output[0].as_text(), Some(URL_NOT_CONFIGURED));
    }

    #[tokio::test]
    async fn test_invalid_id_parameter() {
        let system = CrmSystem::new(Some("http://localhost".to_string())).unwrap();
        let result = system
            .call(ToolCall::new("get_customer", json!({"id": "doce"})))
            .await;
        assert!(matches!(result, Err(AgentError::InvalidParameters(_))));
    }
}
