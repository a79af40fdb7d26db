//! Wireless network entity model
//!
//! Access points and stations are shared, read-mostly records. The attack
//! engine never mutates them directly from classification code; key material
//! produced by the external tools reaches an access point only through the
//! explicit `save_*` persistence operations below.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::types::MacAddr;

/// Wireless interface used for the attack (already in monitor mode)
#[derive(Debug, Clone)]
pub struct WirelessInterface {
    /// Interface name (e.g. "wlan0mon")
    pub name: String,
    /// MAC address of the interface, used as the attacker address
    pub mac_address: MacAddr,
}

impl WirelessInterface {
    pub fn new(name: impl Into<String>, mac_address: MacAddr) -> Self {
        Self {
            name: name.into(),
            mac_address,
        }
    }
}

/// A station associated with an access point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirelessStation {
    /// Station MAC address
    pub mac_address: MacAddr,
    /// Last seen signal power
    pub power: i32,
    /// BSSID of the access point this station is associated with
    pub bssid: MacAddr,
}

impl WirelessStation {
    pub fn new(mac_address: MacAddr, power: i32, bssid: MacAddr) -> Self {
        Self {
            mac_address,
            power,
            bssid,
        }
    }
}

/// A wireless access point, the target of the attack.
///
/// Besides the scan attributes, an access point carries optional paths to
/// key material recovered during previous or current attacks: a keystream
/// (PRGA XOR) file enabling shared key authentication, a reusable ARP
/// request capture, and the recovered key file.
#[derive(Debug, Clone)]
pub struct WirelessAccessPoint {
    pub bssid: MacAddr,
    pub essid: String,
    pub power: i32,
    pub channel: u8,
    pub encryption: String,
    pub cipher: String,
    pub authentication: String,
    /// Number of initialization vectors seen so far
    pub iv_count: u64,
    pub associated_stations: Vec<WirelessStation>,

    persist_dir: Option<PathBuf>,
    keystream_path: Option<PathBuf>,
    arp_capture_path: Option<PathBuf>,
    key_file_path: Option<PathBuf>,
}

impl WirelessAccessPoint {
    pub fn new(bssid: MacAddr, essid: impl Into<String>, channel: u8) -> Self {
        Self {
            bssid,
            essid: essid.into(),
            power: 0,
            channel,
            encryption: String::new(),
            cipher: String::new(),
            authentication: String::new(),
            iv_count: 0,
            associated_stations: Vec::new(),
            persist_dir: None,
            keystream_path: None,
            arp_capture_path: None,
            key_file_path: None,
        }
    }

    /// Directory where key material for this network is persisted across
    /// attack runs. Created if missing. Without a persist directory, the
    /// `save_*` operations record the source path in place instead of
    /// copying.
    pub fn set_persist_dir(&mut self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        self.persist_dir = Some(dir);
        Ok(())
    }

    /// True once a recovered key file is known for this network
    pub fn is_cracked(&self) -> bool {
        self.key_file_path.is_some()
    }

    pub fn keystream_path(&self) -> Option<&Path> {
        self.keystream_path.as_deref()
    }

    pub fn arp_capture_path(&self) -> Option<&Path> {
        self.arp_capture_path.as_deref()
    }

    pub fn key_file_path(&self) -> Option<&Path> {
        self.key_file_path.as_deref()
    }

    /// Persist a keystream (PRGA XOR) file disclosed by the capture
    pub fn save_keystream(&mut self, src: &Path) -> Result<()> {
        let path = self.persist(src, "keystream.xor")?;
        debug!(bssid = %self.bssid, path = %path.display(), "keystream saved");
        self.keystream_path = Some(path);
        Ok(())
    }

    /// Persist an ARP request capture for replay in later attack runs
    pub fn save_arp_capture(&mut self, src: &Path) -> Result<()> {
        let path = self.persist(src, "arp_requests.cap")?;
        debug!(bssid = %self.bssid, path = %path.display(), "ARP capture saved");
        self.arp_capture_path = Some(path);
        Ok(())
    }

    /// Persist the recovered key file; marks this network as cracked
    pub fn save_key_file(&mut self, src: &Path) -> Result<()> {
        let path = self.persist(src, "psk.hex")?;
        debug!(bssid = %self.bssid, path = %path.display(), "key file saved");
        self.key_file_path = Some(path);
        Ok(())
    }

    pub fn add_associated_station(&mut self, station: WirelessStation) {
        self.associated_stations.push(station);
    }

    fn persist(&self, src: &Path, name: &str) -> Result<PathBuf> {
        match &self.persist_dir {
            Some(dir) => {
                let dst = dir.join(name);
                fs::copy(src, &dst)?;
                Ok(dst)
            }
            None => Ok(src.to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_ap() -> WirelessAccessPoint {
        WirelessAccessPoint::new(
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            "testnet",
            6,
        )
    }

    #[test]
    fn test_new_ap_is_not_cracked() {
        let ap = test_ap();
        assert!(!ap.is_cracked());
        assert!(ap.keystream_path().is_none());
        assert!(ap.arp_capture_path().is_none());
    }

    #[test]
    fn test_save_key_file_marks_cracked() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("psk.hex");
        fs::File::create(&src)
            .unwrap()
            .write_all(b"AB:CD:EF:01:02:03")
            .unwrap();

        let mut ap = test_ap();
        ap.save_key_file(&src).unwrap();
        assert!(ap.is_cracked());
        assert_eq!(ap.key_file_path().unwrap(), src.as_path());
    }

    #[test]
    fn test_persist_dir_copies_material() {
        let scratch = tempfile::tempdir().unwrap();
        let persist = tempfile::tempdir().unwrap();
        let src = scratch.path().join("capture-01-00-11-22-33-44-55.xor");
        fs::File::create(&src).unwrap().write_all(b"xor").unwrap();

        let mut ap = test_ap();
        ap.set_persist_dir(persist.path().join("00-11-22-33-44-55"))
            .unwrap();
        ap.save_keystream(&src).unwrap();

        let saved = ap.keystream_path().unwrap();
        assert!(saved.starts_with(persist.path()));
        assert_eq!(fs::read(saved).unwrap(), b"xor");

        // the original scratch file may disappear, the persisted copy stays
        fs::remove_file(&src).unwrap();
        assert!(ap.keystream_path().unwrap().is_file());
    }

    #[test]
    fn test_add_associated_station() {
        let mut ap = test_ap();
        let st = WirelessStation::new(
            MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            -40,
            ap.bssid,
        );
        ap.add_associated_station(st.clone());
        assert_eq!(ap.associated_stations, vec![st]);
    }
}
