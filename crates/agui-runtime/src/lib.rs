//! # agui-runtime — running agents from the client side
//!
//! - [`session`] — `AgentSession`: conversation ownership, run lifecycle,
//!   hooks and cancellation
//! - [`http`] — `HttpAgent`, an `Agent` backed by an HTTP endpoint
//! - [`config`] — `AgentConfig`, `RunAgentParameters`

pub mod config;
pub mod http;
pub mod session;

pub use config::{AgentConfig, RunAgentParameters};
pub use http::{HttpAgent, HttpAgentConfig, WireFormat};
pub use session::{
    AbortHandle, AgentSession, DefaultHooks, RunHooks, RunStatus, run_pipeline,
};
