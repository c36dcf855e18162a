use std::collections::HashMap;

use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AgentError;
use crate::models::content::Content;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Convert the internal Message format to the Gemini `contents` specification.
///
/// Gemini identifies function responses by function name rather than by call
/// id, so the conversion first collects the id -> name mapping from the tool
/// requests present in the transcript.
pub fn messages_to_gemini_spec(messages: &[Message]) -> Vec<Value> {
    let mut call_names: HashMap<String, String> = HashMap::new();
    for message in messages {
        for content in &message.content {
            if let MessageContent::ToolRequest(request) = content {
                if let Ok(tool_call) = &request.tool_call {
                    call_names.insert(request.id.clone(), tool_call.name.clone());
                }
            }
        }
    }

    let mut contents = Vec::new();
    for message in messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        let mut parts = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        parts.push(json!({"text": text.text}));
                    }
                }
                MessageContent::Image(image) => {
                    parts.push(json!({
                        "inlineData": {
                            "mimeType": image.mime_type,
                            "data": image.data,
                        }
                    }));
                }
                MessageContent::ToolRequest(request) => {
                    // An unparseable tool call never reached a system; the
                    // paired response carries the error text for the model.
                    if let Ok(tool_call) = &request.tool_call {
                        parts.push(json!({
                            "functionCall": {
                                "name": sanitize_function_name(&tool_call.name),
                                "args": tool_call.arguments,
                            }
                        }));
                    }
                }
                MessageContent::ToolResponse(response) => {
                    let name = call_names
                        .get(&response.id)
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());

                    match &response.tool_result {
                        Ok(outputs) => {
                            let texts: Vec<&str> =
                                outputs.iter().filter_map(|c| c.as_text()).collect();
                            parts.push(json!({
                                "functionResponse": {
                                    "name": sanitize_function_name(&name),
                                    "response": {"content": texts.join("\n")},
                                }
                            }));
                            // Images inside tool results ride along as inline data
                            for content in outputs {
                                if let Content::Image(image) = content {
                                    parts.push(json!({
                                        "inlineData": {
                                            "mimeType": image.mime_type,
                                            "data": image.data,
                                        }
                                    }));
                                }
                            }
                        }
                        Err(e) => {
                            parts.push(json!({
                                "functionResponse": {
                                    "name": sanitize_function_name(&name),
                                    "response": {"error": format!("The tool call returned the following error:\n{}", e)},
                                }
                            }));
                        }
                    }
                }
            }
        }

        if !parts.is_empty() {
            contents.push(json!({"role": role, "parts": parts}));
        }
    }

    contents
}

/// Convert the internal Tool format to Gemini function declarations
pub fn tools_to_gemini_spec(tools: &[Tool]) -> Result<Value> {
    let mut tool_names = std::collections::HashSet::new();
    let mut declarations = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
        declarations.push(json!({
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }));
    }

    Ok(json!([{"functionDeclarations": declarations}]))
}

/// Convert a Gemini `generateContent` response to the internal Message format
pub fn gemini_response_to_message(response: &Value) -> Result<Message> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut message = Message::assistant();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            message = message.with_text(text);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call["name"].as_str().unwrap_or_default().to_string();
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            // Gemini does not assign call ids, so we mint one per request
            let id = format!("call_{}", Uuid::new_v4().simple());

            if !is_valid_function_name(&name) {
                let error = AgentError::ToolNotFound(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    name
                ));
                message = message.with_tool_request(id, Err(error));
            } else {
                message = message.with_tool_request(id, Ok(ToolCall::new(&name, args)));
            }
        }
    }

    Ok(message)
}

pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").expect("static regex");
    re.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex");
    re.is_match(name)
}
