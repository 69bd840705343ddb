pub mod frame;
pub mod link;

pub use link::{HostLink, PollOutcome, ResponseSink, SinkError, StatusBlock};
