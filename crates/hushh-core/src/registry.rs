//! Agent registry: the fixed set of remote agents, looked up by id

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::types::{AgentDescriptor, AgentKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent id must not be empty")]
    EmptyId,
    #[error("duplicate agent id '{0}'")]
    DuplicateId(String),
    #[error("agent '{id}' has an invalid base URL '{url}': {reason}")]
    InvalidUrl {
        id: String,
        url: String,
        reason: String,
    },
}

/// Ordered, immutable list of agent descriptors
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentDescriptor>) -> Result<Self, RegistryError> {
        {
            let mut seen = HashSet::new();
            for agent in &agents {
                if agent.id.trim().is_empty() {
                    return Err(RegistryError::EmptyId);
                }
                if !seen.insert(agent.id.as_str()) {
                    return Err(RegistryError::DuplicateId(agent.id.clone()));
                }
                validate_base_url(agent)?;
            }
        }
        debug!("Agent registry built with {} agents", agents.len());
        Ok(Self { agents })
    }

    pub fn get(&self, id: &str) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// First agent of the given kind, in registry order
    pub fn first_of_kind(&self, kind: AgentKind) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|a| a.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn validate_base_url(agent: &AgentDescriptor) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidUrl {
        id: agent.id.clone(),
        url: agent.base_url.clone(),
        reason,
    };
    let url = Url::parse(&agent.base_url).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}
