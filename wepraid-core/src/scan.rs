//! Parsing of airodump-ng CSV output
//!
//! airodump-ng writes two sections into its CSV file: access point rows
//! (15 columns) followed by station rows (7 columns). The column layout is a
//! fixed contract of the capture tool and must not be altered here:
//! access points carry bssid, channel, encryption, cipher, authentication,
//! power, IV count and ESSID; stations carry their MAC, power and the BSSID
//! of the access point they are associated with.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::Result;
use crate::model::{WirelessAccessPoint, WirelessStation};
use crate::types::MacAddr;

const AP_ROW_FIELDS: usize = 15;
const STATION_ROW_FIELDS: usize = 7;

/// Parse an airodump-ng CSV file into access points with their associated
/// stations attached.
pub fn parse_scan_csv(path: &Path) -> Result<Vec<WirelessAccessPoint>> {
    let file = File::open(path)?;
    Ok(parse_scan(BufReader::new(file)))
}

/// Parse airodump-ng CSV content.
///
/// Section headers, empty lines and rows that fail to parse are skipped;
/// the station section follows the access point section, so stations can be
/// attached to already-seen access points. Stations whose BSSID column does
/// not name a known access point (e.g. "(not associated)") are dropped.
pub fn parse_scan<R: Read>(reader: R) -> Vec<WirelessAccessPoint> {
    let mut result: Vec<WirelessAccessPoint> = Vec::new();

    for line in BufReader::new(reader).lines() {
        let Ok(line) = line else { break };
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 2 || fields[1] == " First time seen" {
            // section header or empty line
            continue;
        }
        if fields.len() == AP_ROW_FIELDS {
            if let Some(ap) = parse_ap_row(&fields) {
                result.push(ap);
            }
        } else if fields.len() == STATION_ROW_FIELDS {
            if let Some(station) = parse_station_row(&fields) {
                if let Some(ap) = result.iter_mut().find(|ap| ap.bssid == station.bssid) {
                    ap.add_associated_station(station);
                }
            }
        }
    }

    result
}

fn parse_ap_row(fields: &[&str]) -> Option<WirelessAccessPoint> {
    let bssid: MacAddr = fields[0].trim().parse().ok()?;
    let channel: u8 = fields[3].trim().parse().ok()?;
    let essid = fields[13].trim();

    let mut ap = WirelessAccessPoint::new(bssid, essid, channel);
    ap.encryption = fields[5].trim().to_string();
    ap.cipher = fields[6].trim().to_string();
    ap.authentication = fields[7].trim().to_string();
    ap.power = fields[8].trim().parse().unwrap_or(0);
    ap.iv_count = fields[10].trim().parse().unwrap_or(0);
    Some(ap)
}

fn parse_station_row(fields: &[&str]) -> Option<WirelessStation> {
    let mac_address: MacAddr = fields[0].trim().parse().ok()?;
    let power = fields[3].trim().parse().unwrap_or(0);
    let bssid: MacAddr = fields[5].trim().parse().ok()?;
    Some(WirelessStation::new(mac_address, power, bssid))
}
