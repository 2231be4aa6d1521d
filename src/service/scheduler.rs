//! Background expiration loop run by the service thread.

use std::sync::PoisonError;
use std::time::Duration;

use super::Shared;
use crate::slot::AggregationSlot;

/// Background expiration loop.
///
/// Sleeps until the earliest of the next slot deadline, a new-slot wake-up or
/// shutdown. Every wake-up recomputes the deadline from the registry, so a
/// spurious or early wake-up drains nothing and goes back to sleep.
pub(super) fn run(shared: &Shared) {
    #[cfg(feature = "logging")]
    log::debug!("expiration scheduler started");

    let mut state = shared.lock_state();
    while !state.shutdown {
        let now = shared.clock.now_micros();
        let expired = state.registry.drain_expired(now);

        if !expired.is_empty() {
            // Sink I/O happens with the registry unlocked; shutdown is checked
            // again once the flush completes.
            drop(state);
            flush(shared, expired);
            state = shared.lock_state();
            continue;
        }

        state = match state.registry.peek_next_deadline() {
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
            Some(deadline) => {
                let timeout = Duration::from_micros(deadline.saturating_sub(now));
                shared
                    .wake
                    .wait_timeout(state, timeout)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
    }

    #[cfg(feature = "logging")]
    log::debug!(
        "expiration scheduler stopped with {} open slots",
        state.registry.len()
    );
}

fn flush(shared: &Shared, expired: Vec<AggregationSlot>) {
    let count = expired.len();
    if let Err(err) = shared.sink.accept(expired) {
        #[cfg(feature = "logging")]
        log::warn!("flush of {count} expired slots failed: {err}");
        #[cfg(not(feature = "logging"))]
        let _ = (count, err);
    }
}
