//! Keepalive supervision.
//!
//! A periodic tick pings every connected client and retires those whose
//! pong is overdue. A large gap between ticks indicates the host slept;
//! that tick grants a grace window instead of mass-closing clients that
//! never had a chance to answer.

/// Default ping interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Payload carried by keepalive pings.
pub(crate) const PING_PAYLOAD: &[u8] = b"ping";

/// Per-client decision for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickAction {
    /// The client is live enough; send a ping.
    Ping,
    /// No pong within the allowed window; retire the client.
    Timeout,
}

/// True when the gap since the previous tick exceeds 1.5x the interval,
/// i.e. the host clock jumped (sleep/wake). The caller resets every
/// client's pong timestamp so nobody is closed on this tick.
pub(crate) fn clock_jumped(now: u64, last_run: u64, interval_ms: u64) -> bool {
    2 * now.saturating_sub(last_run) > 3 * interval_ms
}

/// Decision for a single connected client.
///
/// A client gets one interval for its ping to go out and one more for
/// the pong to come back before it is declared dead.
pub(crate) fn tick_action(now: u64, last_pong_recv: u64, interval_ms: u64) -> TickAction {
    if now.saturating_sub(last_pong_recv) < 2 * interval_ms {
        TickAction::Ping
    } else {
        TickAction::Timeout
    }
}
