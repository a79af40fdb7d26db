//! Targeted wireless capture
//!
//! `airodump-ng` locked to the target's BSSID and channel, writing CSV and
//! pcap output into its scratch directory. The tool paints its text UI on
//! stderr and keeps stdout silent, so stderr is the protocol stream here
//! and any stdout line is an anomaly.
//!
//! The capture is also the source of two kinds of key material: the
//! keystream (PRGA XOR) file airodump-ng drops when it observes a shared
//! key authentication, and WPA handshakes, which are extracted into a
//! minimal capture via `wpaclean` on first sight.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use wepraid_core::scan::parse_scan_csv;
use wepraid_core::{
    CancelToken, Error, Result, Timings, WirelessAccessPoint, WirelessInterface,
};
use wepraid_process::{
    FlagSet, LineEffects, Stream, SupervisedProcess, ToolSpec, UpdateReport,
};

use crate::{flags, SharedAccessPoint};

/// Capture lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    New,
    /// Spawned and writing output files
    Capturing,
    Terminated,
}

/// Side effects requested by the capture classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEffect {
    /// A WPA handshake is now present in the capture file
    ExtractHandshake,
}

/// Pure classifier for airodump-ng stderr
#[derive(Debug, Clone, Default)]
pub struct CaptureClassifier;

impl ToolSpec for CaptureClassifier {
    type State = CaptureState;
    type Effect = CaptureEffect;

    fn tool(&self) -> &'static str {
        "capture"
    }

    fn initial_state(&self) -> CaptureState {
        CaptureState::New
    }

    fn started_state(&self) -> Option<CaptureState> {
        Some(CaptureState::Capturing)
    }

    fn terminated_state(&self) -> CaptureState {
        CaptureState::Terminated
    }

    fn protocol_stream(&self) -> Stream {
        Stream::Stderr
    }

    fn flag_names(&self) -> &'static [&'static str] {
        &[flags::DETECTED_HANDSHAKE]
    }

    fn classify(&self, line: &str) -> LineEffects<CaptureState, CaptureEffect> {
        if line.contains("WPA handshake:") {
            let mut fx = LineEffects::flag(flags::DETECTED_HANDSHAKE);
            fx.effects.push(CaptureEffect::ExtractHandshake);
            fx
        } else {
            LineEffects::none()
        }
    }
}

/// Supervised airodump-ng process plus its output files
pub struct WirelessCapture {
    process: SupervisedProcess<CaptureClassifier>,
    interface: WirelessInterface,
    ap: SharedAccessPoint,
    csv_path: Option<PathBuf>,
    cap_path: Option<PathBuf>,
    xor_path: Option<PathBuf>,
    handshake_path: Option<PathBuf>,
}

impl WirelessCapture {
    pub fn new(interface: WirelessInterface, ap: SharedAccessPoint, timings: &Timings) -> Self {
        Self {
            process: SupervisedProcess::new(CaptureClassifier, timings.termination_grace),
            interface,
            ap,
            csv_path: None,
            cap_path: None,
            xor_path: None,
            handshake_path: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        let (bssid, channel) = {
            let ap = self.ap.lock();
            (ap.bssid, ap.channel)
        };

        let argv = vec![
            "airodump-ng".to_string(),
            "--bssid".to_string(),
            bssid.to_string(),
            "--channel".to_string(),
            channel.to_string(),
            "-w".to_string(),
            "capture".to_string(),
            "--output-format".to_string(),
            "csv,pcap".to_string(),
            "--write-interval".to_string(),
            "5".to_string(),
            "--update".to_string(),
            "5".to_string(),
            "-a".to_string(),
            self.interface.name.clone(),
        ];
        self.process.start(&argv)?;

        if let Some(dir) = self.process.work_dir() {
            self.csv_path = Some(dir.join("capture-01.csv"));
            self.cap_path = Some(dir.join("capture-01.cap"));
            self.xor_path = Some(dir.join(format!("capture-01-{}.xor", bssid.dashed())));
        }
        Ok(())
    }

    pub fn update(&mut self) -> Result<UpdateReport<CaptureState, CaptureEffect>> {
        let report = self.process.update()?;
        for effect in &report.effects {
            match effect {
                CaptureEffect::ExtractHandshake => {
                    // first occurrence only; a failed extraction leaves the
                    // flag set and is retried on the next occurrence
                    if self.handshake_path.is_none() {
                        if let Err(e) = self.extract_handshake() {
                            warn!(error = %e, "handshake extraction failed");
                        }
                    }
                }
            }
        }
        Ok(report)
    }

    /// Isolate the handshake frames into a minimal capture file.
    fn extract_handshake(&mut self) -> Result<()> {
        let cap = self
            .cap_path
            .as_deref()
            .filter(|p| p.is_file())
            .ok_or_else(|| Error::extraction("capture file is not available yet"))?;
        let out = cap.with_file_name("wpa_handshake.cap");

        let status = Command::new("wpaclean")
            .arg(&out)
            .arg(cap)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| Error::Spawn {
                command: format!("wpaclean {} {}", out.display(), cap.display()),
                source,
            })?;
        if !status.success() {
            return Err(Error::extraction(format!(
                "wpaclean exited with {status}"
            )));
        }

        debug!(path = %out.display(), "WPA handshake extracted");
        self.handshake_path = Some(out);
        Ok(())
    }

    /// Path of the growing pcap file, available once started
    pub fn cap_path(&self) -> Option<&Path> {
        self.cap_path.as_deref()
    }

    /// True once airodump-ng has disclosed a keystream file
    pub fn has_keystream(&self) -> bool {
        self.xor_path.as_deref().is_some_and(Path::is_file)
    }

    /// The disclosed keystream file, once it exists
    pub fn keystream_path(&self) -> Option<&Path> {
        self.xor_path.as_deref().filter(|p| p.is_file())
    }

    pub fn handshake_path(&self) -> Option<&Path> {
        self.handshake_path.as_deref()
    }

    /// Parse the capture CSV into access points with associated stations.
    pub fn capture_result(&self) -> Result<Vec<WirelessAccessPoint>> {
        let csv = self
            .csv_path
            .as_deref()
            .filter(|p| p.is_file())
            .ok_or_else(|| Error::extraction("capture CSV is not available yet"))?;
        parse_scan_csv(csv)
    }

    /// Wait until the capture CSV exists, then parse it.
    pub async fn wait_for_result(
        &self,
        poll: Duration,
        limit: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<WirelessAccessPoint>> {
        let deadline = Instant::now() + limit;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.csv_path.as_deref().is_some_and(Path::is_file) {
                return self.capture_result();
            }
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded {
                    waiting_for: "capture results",
                    limit,
                });
            }
            debug!("waiting for capture results");
            tokio::time::sleep(poll).await;
        }
    }

    /// Total initialization vectors observed for the target; diagnostic
    /// only, 0 while no CSV is available.
    pub fn iv_count(&self) -> u64 {
        self.capture_result()
            .ok()
            .and_then(|aps| aps.first().map(|ap| ap.iv_count))
            .unwrap_or(0)
    }

    pub fn stop(&mut self) -> Option<i32> {
        self.process.stop()
    }

    pub fn clean(&mut self) {
        self.process.clean();
        self.csv_path = None;
        self.cap_path = None;
        self.xor_path = None;
        self.handshake_path = None;
    }

    pub fn state(&self) -> CaptureState {
        self.process.state()
    }

    pub fn flags(&self) -> &FlagSet {
        self.process.flags()
    }
}
