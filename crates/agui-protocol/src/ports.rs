//! The boundary between the run pipeline and agent implementations.
//!
//! Traits use `async-trait` for dyn-dispatch; streams are boxed so any
//! agent (in-process, HTTP-backed, test fixture) fits behind one type.

use crate::error::AguiResult;
use crate::event::Event;
use crate::message::RunAgentInput;
use crate::state::AgentState;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub type EventStream = BoxStream<'static, AguiResult<Event>>;
pub type StateStream = BoxStream<'static, AguiResult<AgentState>>;

/// Something that turns a run request into a stream of raw events.
///
/// The returned stream may contain chunk events; the pipeline normalizes and
/// validates it. A single agent must not be driven by two runs at once on
/// the same session.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn run(&self, input: RunAgentInput) -> AguiResult<EventStream>;
}

#[async_trait]
impl<A> Agent for std::sync::Arc<A>
where
    A: Agent + ?Sized,
{
    async fn run(&self, input: RunAgentInput) -> AguiResult<EventStream> {
        (**self).run(input).await
    }
}
