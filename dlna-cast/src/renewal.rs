//! Subscription renewal timing and the per-session timer set

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::CastConfig;

/// Delay before renewing a subscription granted for `timeout_seconds`.
///
/// Leases longer than the short-lease threshold renew after
/// `lease / divisor` whole seconds; shorter ones use the fixed short-lease
/// delay. A missing lease counts as the configured fallback.
pub fn renewal_interval(timeout_seconds: Option<u32>, config: &CastConfig) -> Duration {
    let lease = timeout_seconds
        .map(u64::from)
        .unwrap_or_else(|| config.fallback_timeout.as_secs());

    if lease > config.short_lease_threshold.as_secs() {
        Duration::from_secs(lease / u64::from(config.renewal_divisor.max(1)))
    } else {
        config.short_lease_renewal
    }
}

/// Armed renewal timers of one session, keyed by subscription identifier.
///
/// Once stopped the set refuses new timers, so a timer that fires while the
/// session is being torn down cannot re-arm itself. Each armed timer carries
/// a generation so a timer that was replaced after it woke up can tell it is
/// stale.
#[derive(Debug, Default)]
pub(crate) struct RenewalTimers {
    stopped: bool,
    next_generation: u64,
    timers: HashMap<String, (u64, JoinHandle<()>)>,
}

impl RenewalTimers {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Generation to hand to the next timer task
    pub(crate) fn reserve(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Store `handle` for `uuid`, aborting any timer it replaces.
    /// Refused (and `handle` aborted) when stopped.
    pub(crate) fn arm(&mut self, uuid: &str, generation: u64, handle: JoinHandle<()>) -> bool {
        if self.stopped {
            handle.abort();
            return false;
        }
        if let Some((_, previous)) = self.timers.insert(uuid.to_string(), (generation, handle)) {
            previous.abort();
        }
        true
    }

    /// Called by a fired timer: removes its own entry without aborting it.
    /// Returns `false` when the set is stopped or the entry belongs to a
    /// newer timer.
    pub(crate) fn claim(&mut self, uuid: &str, generation: u64) -> bool {
        if self.stopped {
            return false;
        }
        match self.timers.get(uuid) {
            Some((armed, _)) if *armed == generation => {
                self.timers.remove(uuid);
                true
            }
            _ => false,
        }
    }

    /// Abort and discard the timer for `uuid`
    pub(crate) fn cancel(&mut self, uuid: &str) -> bool {
        match self.timers.remove(uuid) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Stop the set and abort every timer. Returns how many were armed.
    pub(crate) fn stop(&mut self) -> usize {
        self.stopped = true;
        let count = self.timers.len();
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
        count
    }

    pub(crate) fn armed(&self) -> Vec<String> {
        self.timers.keys().cloned().collect()
    }
}

impl Drop for RenewalTimers {
    fn drop(&mut self) {
        for (_, handle) in self.timers.values() {
            handle.abort();
        }
    }
}
