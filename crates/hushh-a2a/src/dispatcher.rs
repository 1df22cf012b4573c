//! Dispatcher: one POST per agent call, folded into a [`DispatchResult`]
//!
//! Calls are single attempts: no retries, no backoff, no timeout. Failures never
//! surface as `Err`; they become `success = false` with a readable message.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hushh_core::{AgentDescriptor, AgentOutcome, AgentRegistry, DispatchResult};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::payload::{AgentRequest, build_payload};
use crate::transport::AgentTransport;

/// Where requests go
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Route {
    /// Straight to the agent's base URL
    #[default]
    Direct,
    /// Through the pass-through proxy at `{base_url}/api/a2a/{agent_id}`
    Proxy { base_url: String },
}

impl Route {
    pub fn endpoint(&self, agent: &AgentDescriptor) -> String {
        match self {
            Self::Direct => agent.base_url.clone(),
            Self::Proxy { base_url } => {
                format!("{}/api/a2a/{}", base_url.trim_end_matches('/'), agent.id)
            }
        }
    }
}

/// One step of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCall {
    pub agent_id: String,
    pub payload: Value,
}

impl BatchCall {
    pub fn new(agent_id: impl Into<String>, payload: Value) -> Self {
        Self { agent_id: agent_id.into(), payload }
    }
}

/// Progress events emitted while a batch runs
#[derive(Debug, Clone, PartialEq)]
pub enum BatchProgress {
    Started {
        index: usize,
        total: usize,
        agent_id: String,
    },
    Finished {
        index: usize,
        total: usize,
        agent_id: String,
        success: bool,
        response_time_ms: Option<u64>,
    },
}

pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    transport: Arc<dyn AgentTransport>,
    route: Route,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            registry,
            transport,
            route: Route::Direct,
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Build the payload for the agent's kind and send it
    pub async fn send(&self, agent_id: &str, request: &AgentRequest) -> DispatchResult {
        let Some(agent) = self.registry.get(agent_id) else {
            return unknown_agent(agent_id);
        };
        let payload = build_payload(agent.kind, request);
        self.dispatch(agent_id, &payload).await
    }

    pub async fn dispatch(&self, agent_id: &str, payload: &Value) -> DispatchResult {
        let Some(agent) = self.registry.get(agent_id) else {
            return unknown_agent(agent_id);
        };

        let url = self.route.endpoint(agent);
        // The proxy attaches the agent's token itself
        let bearer = match self.route {
            Route::Direct => agent.auth_token.as_deref(),
            Route::Proxy { .. } => None,
        };

        debug!("Dispatching to {} at {}", agent_id, url);
        let started = Instant::now();
        match self.transport.post_json(&url, payload, bearer).await {
            Ok(response) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let data = parse_body(&response.body);
                if response.is_success() {
                    info!("{} responded {} in {}ms", agent_id, response.status, elapsed);
                    DispatchResult::ok(data, elapsed)
                } else {
                    let error = data.as_ref().and_then(error_message).unwrap_or_else(|| {
                        format!("Request failed with status {}", response.status)
                    });
                    warn!("{} failed with status {}: {}", agent_id, response.status, error);
                    DispatchResult::failed(error, data, Some(elapsed))
                }
            }
            Err(e) => {
                warn!("{} unreachable: {}", agent_id, e);
                DispatchResult::failed(e.to_string(), None, None)
            }
        }
    }

    /// Run calls one after another in input order, sleeping `step_delay`
    /// between them. Always yields one outcome per call.
    pub async fn dispatch_batch<F>(
        &self,
        calls: &[BatchCall],
        step_delay: Duration,
        mut progress: F,
    ) -> Vec<AgentOutcome>
    where
        F: FnMut(&BatchProgress),
    {
        let total = calls.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, call) in calls.iter().enumerate() {
            if index > 0 && !step_delay.is_zero() {
                tokio::time::sleep(step_delay).await;
            }

            progress(&BatchProgress::Started {
                index,
                total,
                agent_id: call.agent_id.clone(),
            });

            let result = self.dispatch(&call.agent_id, &call.payload).await;

            progress(&BatchProgress::Finished {
                index,
                total,
                agent_id: call.agent_id.clone(),
                success: result.success,
                response_time_ms: result.response_time_ms,
            });

            outcomes.push(AgentOutcome {
                agent_id: call.agent_id.clone(),
                result,
            });
        }

        outcomes
    }
}

fn unknown_agent(agent_id: &str) -> DispatchResult {
    warn!("Dispatch requested for unknown agent '{}'", agent_id);
    DispatchResult::failed(format!("Unknown agent: {}", agent_id), None, None)
}

/// JSON when the body parses, the raw text otherwise, nothing when empty
fn parse_body(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

/// `error` as a string, or `error.message` when it is an object
fn error_message(data: &Value) -> Option<String> {
    let error = data.get("error")?;
    let message = match error {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("message").and_then(Value::as_str)?,
        _ => return None,
    };
    if message.trim().is_empty() { None } else { Some(message.to_string()) }
}
