//! Stream stages between an agent and the client-side state.
//!
//! Each stage is a single-pass, order-preserving fold with an explicit state
//! struct ([`ChunkNormalizer`], [`EventVerifier`], [`Projector`]) and a
//! stream adapter around it. [`pipeline`] chains the three.

pub mod apply;
pub mod chunks;
pub mod repair;
pub mod verify;

pub use apply::{PREDICT_STATE_EVENT, PredictStateMapping, Projector, apply_events};
pub use chunks::{ChunkNormalizer, normalize_chunks};
pub use repair::{parse_partial_json, repair_json};
pub use verify::{EventVerifier, verify_events};

use agui_protocol::{AgentState, EventStream, StateStream};

/// Normalizes, validates and projects `events` onto `initial`.
pub fn pipeline(initial: AgentState, events: EventStream) -> StateStream {
    apply_events(initial, verify_events(normalize_chunks(events)))
}
