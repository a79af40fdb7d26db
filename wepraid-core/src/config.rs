//! Attack timing configuration
//!
//! The aircrack-ng tools are observed through polling, so the engine is
//! shaped by a handful of delays. Their defaults were tuned against real
//! tool behavior and are environment-dependent, which is why they live in a
//! config struct instead of constants.

use std::time::Duration;

/// Timing parameters for process supervision and attack orchestration
#[derive(Debug, Clone)]
pub struct Timings {
    /// Grace period between SIGTERM and SIGKILL when stopping a process
    pub termination_grace: Duration,
    /// Delay after starting fake authentication before polling it
    pub fakeauth_start_delay: Duration,
    /// Poll interval of the fake-authentication wait loop
    pub auth_poll_interval: Duration,
    /// Backoff before restarting fake authentication after a
    /// deauthentication was received
    pub fakeauth_backoff: Duration,
    /// Spacing between deauthentication bursts while forcing keystream
    /// disclosure
    pub deauth_spacing: Duration,
    /// Settle time after starting ARP replay, letting the capture register
    /// the replay stream
    pub replay_settle: Duration,
    /// Poll interval of the cracking loop
    pub poll_interval: Duration,
    /// Poll interval while waiting for the capture CSV to appear
    pub csv_poll_interval: Duration,
    /// Deadline for reaching authenticated state
    pub auth_deadline: Duration,
    /// Deadline for the nested keystream-acquisition loop
    pub keystream_deadline: Duration,
    /// Deadline for the cracking loop
    pub crack_deadline: Duration,
    /// Maximum deauthentication rounds per keystream acquisition
    pub max_deauth_rounds: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            termination_grace: Duration::from_secs(1),
            fakeauth_start_delay: Duration::from_secs(1),
            auth_poll_interval: Duration::from_secs(1),
            fakeauth_backoff: Duration::from_secs(5),
            deauth_spacing: Duration::from_secs(2),
            replay_settle: Duration::from_secs(6),
            poll_interval: Duration::from_secs(5),
            csv_poll_interval: Duration::from_secs(1),
            auth_deadline: Duration::from_secs(300),
            keystream_deadline: Duration::from_secs(120),
            crack_deadline: Duration::from_secs(3600),
            max_deauth_rounds: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let t = Timings::default();
        assert_eq!(t.termination_grace, Duration::from_secs(1));
        assert_eq!(t.deauth_spacing, Duration::from_secs(2));
        assert_eq!(t.fakeauth_backoff, Duration::from_secs(5));
        assert_eq!(t.replay_settle, Duration::from_secs(6));
        assert_eq!(t.poll_interval, Duration::from_secs(5));
    }
}
