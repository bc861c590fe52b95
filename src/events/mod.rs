//! Execution Events Module
//!
//! Typed push events emitted by the engine after every state change, and
//! the sinks that carry them to observers. The engine is agnostic to the
//! transport; a sink may forward to a UI channel, a log, or a test
//! harness.
//!
//! # Components
//!
//! - [`ExecutionEvent`]: the event payloads and their wire layout
//! - [`EventSink`]: the observer interface, with channel/log/null impls

pub mod event;
pub mod sink;

pub use event::ExecutionEvent;
pub use sink::{ChannelSink, EventSink, LogSink, NullSink};
