//! hushh-gateway: same-origin pass-through proxy for agent endpoints
//!
//! Browsers cannot call most agent endpoints directly (CORS, secret headers),
//! so the console can route calls through `/api/a2a/{agent_id}` instead.

pub mod server;

pub use server::{GatewayServer, ProxyState};
