//! hushh-a2a: talking to remote agents
//!
//! Builds request envelopes per agent kind (JSON-RPC `tasks/send`, WhatsApp
//! templates, email), sends them through an injectable [`AgentTransport`], and
//! runs the sequential full-profile analysis.

pub mod analysis;
pub mod dispatcher;
pub mod payload;
pub mod protocol;
pub mod transport;

pub use analysis::{AnalysisError, AnalysisPlan, ProfileQuery, ProfileReport, analyze_profile};
pub use dispatcher::{BatchCall, BatchProgress, Dispatcher, Route};
pub use payload::{AgentRequest, build_payload, phone_looks_valid, sanitize_phone};
pub use transport::{AgentTransport, HttpTransport, TransportError, TransportResponse};
