//! Transport-agnostic plumbing shared by every other crate: channel
//! wrappers with a drop-on-disconnect convention, and a priority token
//! bucket rate limiter.

pub mod channel;
pub mod rate_limit;

/// Implemented by error types so callers can decide whether to keep
/// retrying or give up a channel/stream for good.
pub trait Unrecoverable {
    fn is_unrecoverable(&self) -> bool;
}

impl<T> Unrecoverable for tokio::sync::mpsc::error::SendError<T> {
    fn is_unrecoverable(&self) -> bool {
        true
    }
}
