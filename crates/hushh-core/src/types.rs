//! Shared types for hushh-core

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire family an agent speaks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// JSON-RPC 2.0 `tasks/send` envelope carrying a text part
    JsonrpcText,
    /// WhatsApp template message
    WhatsappTemplate,
    /// Transactional email, forwarded as a flat object
    Email,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JsonrpcText => write!(f, "jsonrpc-text"),
            Self::WhatsappTemplate => write!(f, "whatsapp-template"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// A remote agent endpoint, fixed at process start
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    pub kind: AgentKind,
    /// Sent as `Authorization: Bearer <token>` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("kind", &self.kind)
            .field("auth_token", &self.auth_token.as_deref().map(|_| "***"))
            .finish()
    }
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, kind: AgentKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            base_url: base_url.into(),
            kind,
            auth_token: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// Outcome of a single agent call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// `None` when no response was ever received
    #[serde(default)]
    pub response_time_ms: Option<u64>,
}

impl DispatchResult {
    pub fn ok(data: Option<Value>, response_time_ms: u64) -> Self {
        Self {
            success: true,
            data,
            error: None,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn failed(
        error: impl Into<String>,
        data: Option<Value>,
        response_time_ms: Option<u64>,
    ) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
            response_time_ms,
        }
    }

    /// "123ms", or "N/A" when the call never got a response
    pub fn response_time_label(&self) -> String {
        match self.response_time_ms {
            Some(ms) => format!("{}ms", ms),
            None => "N/A".to_string(),
        }
    }
}

/// A dispatch result tagged with the agent it came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    pub agent_id: String,
    pub result: DispatchResult,
}
