//! Publish/subscribe transport between agents.
//!
//! - [`Broker`]: the pub/sub backend (one channel per agent inbox)
//! - [`MemoryBroker`]: in-process backend
//! - [`AgentRuntime`]: connect/register/listen/send for one agent
//!
//! Delivery is best-effort and at-most-once: no acknowledgement, no retry,
//! no deduplication, and messages sent while nobody listens are lost.

pub mod broker;
pub mod dispatch;
pub mod memory;
pub mod runtime;

pub use broker::{channel_name, Broker, Subscription};
pub use dispatch::{handler_fn, Action, Handler, HandlerError, HandlerTable};
pub use memory::MemoryBroker;
pub use runtime::{AgentRuntime, ListenStats, Publisher, SendOptions, StopHandle};
