//! WEP attack orchestration for wepraid
//!
//! This crate wraps the four aircrack-ng processes taking part in a WEP
//! key-recovery attack and sequences them:
//!
//! - `WirelessCapture`: airodump-ng, targeted capture with CSV + pcap output
//! - `FakeAuthentication`: aireplay-ng --fakeauth, association with the AP
//! - `ArpReplay`: aireplay-ng --arpreplay, IV generation
//! - `KeyCracker`: aircrack-ng, PTW / FMS-KoreK key recovery
//! - `deauthenticate`: fire-and-forget aireplay-ng --deauth bursts
//! - `WepAttackOrchestrator`: the top-level attack state machine
//!
//! Each wrapper composes a `SupervisedProcess` with a pure line classifier
//! and executes the side effects its classifier requests (persisting key
//! material onto the shared access point record).

pub mod arpreplay;
pub mod capture;
pub mod cracker;
pub mod deauth;
pub mod fakeauth;
pub mod orchestrator;
pub mod scanner;

use std::sync::Arc;

use parking_lot::Mutex;
use wepraid_core::WirelessAccessPoint;

pub use arpreplay::{ArpReplay, ArpReplayEffect, ArpReplayState, ReplayStats};
pub use capture::{CaptureEffect, CaptureState, WirelessCapture};
pub use cracker::{KeyCracker, KeyCrackerEffect, KeyCrackerState};
pub use deauth::deauthenticate;
pub use fakeauth::{FakeAuthEffect, FakeAuthOptions, FakeAuthState, FakeAuthentication};
pub use orchestrator::{AttackPhase, WepAttackOrchestrator, WirelessAttack};
pub use scanner::WirelessScanner;

/// Access point record shared between the orchestrator and the tool
/// wrappers; mutated only through its explicit `save_*` operations.
pub type SharedAccessPoint = Arc<Mutex<WirelessAccessPoint>>;

/// Flags raised by the tool classifiers
pub mod flags {
    /// At least one deauthentication packet was received since start
    pub const DEAUTHENTICATED: &str = "deauthenticated";
    /// Shared key authentication requires a keystream file we do not have
    pub const NEEDS_KEYSTREAM: &str = "needs_keystream";
    /// The capture has seen (and saved) a WPA handshake
    pub const DETECTED_HANDSHAKE: &str = "detected_handshake";
}
