//! WEP key recovery
//!
//! `aircrack-ng` runs the PTW attack against the capture file, falling back
//! to FMS/KoreK; both are opaque to this crate. With `-q` set and stdout
//! redirected, the tool buffers its output and flushes only on exit, so the
//! interesting lines usually arrive as one final burst.
//!
//! `-l` makes the tool write the recovered key into `psk.hex` inside the
//! process working directory; spotting `KEY FOUND!` is what persists that
//! file onto the access point and ends the attack.

use std::path::Path;

use tracing::warn;

use wepraid_core::{Result, Timings};
use wepraid_process::{LineEffects, SupervisedProcess, ToolSpec, UpdateReport};

use crate::SharedAccessPoint;

/// Key cracker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCrackerState {
    New,
    /// Cracking or waiting for more IVs
    Ok,
    Terminated,
}

/// Side effects requested by the key cracker classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCrackerEffect {
    /// The key file has been generated and should land on the AP
    PersistRecoveredKey,
}

/// Pure classifier for aircrack-ng stdout
#[derive(Debug, Clone, Default)]
pub struct KeyCrackerClassifier;

impl ToolSpec for KeyCrackerClassifier {
    type State = KeyCrackerState;
    type Effect = KeyCrackerEffect;

    fn tool(&self) -> &'static str {
        "wepcrack"
    }

    fn initial_state(&self) -> KeyCrackerState {
        KeyCrackerState::New
    }

    fn started_state(&self) -> Option<KeyCrackerState> {
        // aircrack-ng prints no banner worth waiting for; it is cracking
        // from the first instant
        Some(KeyCrackerState::Ok)
    }

    fn terminated_state(&self) -> KeyCrackerState {
        KeyCrackerState::Terminated
    }

    fn classify(&self, line: &str) -> LineEffects<KeyCrackerState, KeyCrackerEffect> {
        if line.contains("Failed. Next try with") {
            // not enough IVs yet, the tool retries by itself
            LineEffects::state(KeyCrackerState::Ok)
        } else if line.contains("KEY FOUND!") {
            LineEffects::state(KeyCrackerState::Ok).with_effect(KeyCrackerEffect::PersistRecoveredKey)
        } else if line.contains("Decrypted correctly:") && !line.contains("100%") {
            LineEffects::none().with_warning("decryption confidence below 100%")
        } else {
            LineEffects::none()
        }
    }
}

/// Supervised aircrack-ng process
pub struct KeyCracker {
    process: SupervisedProcess<KeyCrackerClassifier>,
    ap: SharedAccessPoint,
    persisted: bool,
}

impl KeyCracker {
    pub fn new(ap: SharedAccessPoint, timings: &Timings) -> Self {
        Self {
            process: SupervisedProcess::new(KeyCrackerClassifier, timings.termination_grace),
            ap,
            persisted: false,
        }
    }

    /// Start cracking against `cap_path`, typically the capture's growing
    /// pcap file.
    pub fn start(&mut self, cap_path: &Path) -> Result<()> {
        let bssid = self.ap.lock().bssid;
        let argv = vec![
            "aircrack-ng".to_string(),
            "-a".to_string(),
            "1".to_string(),
            "--bssid".to_string(),
            bssid.to_string(),
            "-q".to_string(),
            "-l".to_string(),
            "psk.hex".to_string(),
            cap_path.to_string_lossy().into_owned(),
        ];
        self.process.start(&argv)
    }

    pub fn update(&mut self) -> Result<UpdateReport<KeyCrackerState, KeyCrackerEffect>> {
        let report = self.process.update()?;
        for effect in &report.effects {
            match effect {
                KeyCrackerEffect::PersistRecoveredKey => self.persist_key()?,
            }
        }
        Ok(report)
    }

    fn persist_key(&mut self) -> Result<()> {
        if self.persisted {
            return Ok(());
        }
        let Some(key_file) = self.process.work_dir().map(|d| d.join("psk.hex")) else {
            return Ok(());
        };
        if !key_file.is_file() {
            warn!(path = %key_file.display(), "key reported found but key file is missing");
            return Ok(());
        }
        self.ap.lock().save_key_file(&key_file)?;
        self.persisted = true;
        Ok(())
    }

    pub fn stop(&mut self) -> Option<i32> {
        self.process.stop()
    }

    pub fn clean(&mut self) {
        self.process.clean();
        self.persisted = false;
    }

    pub fn state(&self) -> KeyCrackerState {
        self.process.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_next_try_keeps_ok() {
        let fx = KeyCrackerClassifier.classify("Failed. Next try with 5000 IVs");
        assert_eq!(fx.state, Some(KeyCrackerState::Ok));
        assert!(fx.effects.is_empty());
    }

    #[test]
    fn test_key_found_requests_persist_exactly_once() {
        let fx = KeyCrackerClassifier.classify("KEY FOUND! [ AB:CD:EF:01:02:03 ]");
        assert_eq!(fx.state, Some(KeyCrackerState::Ok));
        assert_eq!(fx.effects, vec![KeyCrackerEffect::PersistRecoveredKey]);
    }

    #[test]
    fn test_full_confidence_is_accepted_silently() {
        let fx = KeyCrackerClassifier.classify("Decrypted correctly: 100%");
        assert_eq!(fx, LineEffects::none());
    }

    #[test]
    fn test_low_confidence_is_surfaced_as_warning() {
        let fx = KeyCrackerClassifier.classify("Decrypted correctly:  97%");
        assert!(fx.warning.is_some());
        assert_eq!(fx.state, None);
    }

    #[test]
    fn test_unrecognized_line_is_ignored() {
        let fx = KeyCrackerClassifier.classify("Attack will be restarted every 5000 captured ivs.");
        assert_eq!(fx, LineEffects::none());
    }
}
