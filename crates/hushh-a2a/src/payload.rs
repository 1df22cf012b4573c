//! Payload builder: request bodies per agent kind
//!
//! Builders never fail. Malformed input goes out as is and comes back as a
//! provider-side HTTP error.

use chrono::Utc;
use hushh_core::AgentKind;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::protocol::{
    EmailMessage, JSONRPC_VERSION, Part, TaskMessage, TaskSendParams, TaskSendRequest, Template,
    TemplateComponent, TemplateLanguage, TemplateParameter, WhatsAppTemplateMessage, methods,
};

pub const DEFAULT_MIME_TYPE: &str = "text/html";

/// Timestamp plus random suffix. Only used to correlate log lines.
pub fn new_session_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("session-{}-{}", Utc::now().timestamp_millis(), &random[..8])
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// JSON-RPC `tasks/send` envelope carrying one user text part
pub fn jsonrpc_text(
    text: &str,
    session_id: Option<&str>,
    request_id: Option<&str>,
) -> TaskSendRequest {
    TaskSendRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: request_id.map(str::to_string).unwrap_or_else(new_request_id),
        method: methods::TASKS_SEND.to_string(),
        params: TaskSendParams {
            session_id: session_id.map(str::to_string).unwrap_or_else(new_session_id),
            message: TaskMessage {
                role: "user".to_string(),
                parts: vec![Part::Text { text: text.to_string() }],
            },
        },
    }
}

/// Strip every non-digit character
pub fn sanitize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Form-layer length check: 10 to 15 digits once sanitized
pub fn phone_looks_valid(raw: &str) -> bool {
    (10..=15).contains(&sanitize_phone(raw).len())
}

pub fn whatsapp_template(
    phone: &str,
    template_name: &str,
    language_code: &str,
    body_parameters: &[String],
) -> WhatsAppTemplateMessage {
    let components = if body_parameters.is_empty() {
        vec![]
    } else {
        vec![TemplateComponent {
            kind: "body".to_string(),
            parameters: body_parameters
                .iter()
                .map(|p| TemplateParameter::Text { text: p.clone() })
                .collect(),
        }]
    };

    WhatsAppTemplateMessage {
        messaging_product: "whatsapp".to_string(),
        to: sanitize_phone(phone),
        kind: "template".to_string(),
        template: Template {
            name: template_name.to_string(),
            language: TemplateLanguage { code: language_code.to_string() },
            components,
        },
    }
}

pub fn email(to: &str, subject: &str, html_body: &str, mime_type: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: subject.to_string(),
        body: html_body.to_string(),
        mime_type: mime_type.to_string(),
    }
}

/// What the caller wants to say, independent of wire format
#[derive(Debug, Clone, PartialEq)]
pub enum AgentRequest {
    Text {
        text: String,
        session_id: Option<String>,
    },
    WhatsAppTemplate {
        phone: String,
        template: String,
        language: String,
        parameters: Vec<String>,
    },
    Email {
        to: String,
        subject: String,
        body: String,
        mime_type: String,
    },
}

impl AgentRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into(), session_id: None }
    }

    /// The agent kind this request is shaped for
    pub fn kind(&self) -> AgentKind {
        match self {
            Self::Text { .. } => AgentKind::JsonrpcText,
            Self::WhatsAppTemplate { .. } => AgentKind::WhatsappTemplate,
            Self::Email { .. } => AgentKind::Email,
        }
    }

    pub fn to_payload(&self) -> Value {
        match self {
            Self::Text { text, session_id } => {
                jsonrpc_text(text, session_id.as_deref(), None).to_value()
            }
            Self::WhatsAppTemplate { phone, template, language, parameters } => {
                whatsapp_template(phone, template, language, parameters).to_value()
            }
            Self::Email { to, subject, body, mime_type } => {
                email(to, subject, body, mime_type).to_value()
            }
        }
    }
}

/// Request body for an agent of `kind`. A mismatched request is sent in its
/// own shape; the provider decides what to do with it.
pub fn build_payload(kind: AgentKind, request: &AgentRequest) -> Value {
    if request.kind() != kind {
        warn!(
            "Building {} payload for a {} agent; sending as is",
            request.kind(),
            kind
        );
    }
    request.to_payload()
}
