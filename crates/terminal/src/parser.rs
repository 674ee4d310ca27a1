//! The `Parser` contract (§4.2): translate a terminal buffer into a
//! `ParsedResponse` and detect readiness. Implementations are pure --
//! they read a buffer and must never mutate it -- so a stable buffer
//! parses idempotently.

use nerve_domain::response::ParsedResponse;

pub trait Parser: Send + Sync {
    /// The process is idle and waiting for user input. Implementations
    /// must locate the *latest* status line scanning from the tail and
    /// consider only content after it, so a transient "busy" frame
    /// earlier in the buffer never produces a false positive.
    fn is_ready(&self, buffer: &str) -> bool;

    /// Extract the region between the most recent user-prompt
    /// indicator and the current prompt indicator, split into
    /// sections according to the dialect.
    fn parse(&self, buffer: &str) -> ParsedResponse;

    /// The byte sequence written after the caller's input to submit it.
    fn submit_sequence(&self) -> &'static [u8] {
        b"\r"
    }
}
