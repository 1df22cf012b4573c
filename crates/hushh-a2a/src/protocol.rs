//! Wire shapes sent to remote agents
//!
//! These are owned by the providers; the structs only mirror them.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC methods understood by the text agents
pub mod methods {
    pub const TASKS_SEND: &str = "tasks/send";
}

/// JSON-RPC 2.0 `tasks/send` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSendRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: TaskSendParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskSendParams {
    pub session_id: String,
    pub message: TaskMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskMessage {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
}

/// WhatsApp Cloud API template message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhatsAppTemplateMessage {
    pub messaging_product: String,
    /// Digits only
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub template: Template,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub name: String,
    pub language: TemplateLanguage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<TemplateComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateLanguage {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateParameter {
    Text { text: String },
}

/// Transactional email, forwarded as is
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub mime_type: String,
}

// Wire JSON is assembled with `json!` from owned strings, so building a
// request body has no failure path.

impl Part {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text { text } => json!({"type": "text", "text": text}),
        }
    }
}

impl TaskSendRequest {
    pub fn to_value(&self) -> Value {
        let parts: Vec<Value> = self.params.message.parts.iter().map(Part::to_value).collect();
        json!({
            "jsonrpc": self.jsonrpc,
            "id": self.id,
            "method": self.method,
            "params": {
                "sessionId": self.params.session_id,
                "message": {"role": self.params.message.role, "parts": parts},
            }
        })
    }
}

impl TemplateParameter {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text { text } => json!({"type": "text", "text": text}),
        }
    }
}

impl WhatsAppTemplateMessage {
    pub fn to_value(&self) -> Value {
        let mut template = json!({
            "name": self.template.name,
            "language": {"code": self.template.language.code},
        });
        if !self.template.components.is_empty() {
            let components: Vec<Value> = self
                .template
                .components
                .iter()
                .map(|component| {
                    let parameters: Vec<Value> =
                        component.parameters.iter().map(TemplateParameter::to_value).collect();
                    json!({"type": component.kind, "parameters": parameters})
                })
                .collect();
            template["components"] = Value::Array(components);
        }
        json!({
            "messaging_product": self.messaging_product,
            "to": self.to,
            "type": self.kind,
            "template": template,
        })
    }
}

impl EmailMessage {
    pub fn to_value(&self) -> Value {
        json!({
            "to": self.to,
            "subject": self.subject,
            "body": self.body,
            "mimeType": self.mime_type,
        })
    }
}
