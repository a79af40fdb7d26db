//! Network discovery scan
//!
//! A short airodump-ng run in CSV-only mode, used by the embedding driver
//! to find the target access point before the attack starts. Unlike the
//! attack processes, the scanner has no states or flags to classify; it is
//! started, left to write its CSV, and stopped.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use wepraid_core::scan::parse_scan_csv;
use wepraid_core::{
    CancelToken, Error, Result, Timings, WirelessAccessPoint, WirelessInterface,
};
use wepraid_process::ProcessHandle;

/// One-shot wireless scanner
pub struct WirelessScanner {
    interface: WirelessInterface,
    grace: Duration,
    handle: Option<ProcessHandle>,
    csv_path: Option<PathBuf>,
}

impl WirelessScanner {
    pub fn new(interface: WirelessInterface, timings: &Timings) -> Self {
        Self {
            interface,
            grace: timings.termination_grace,
            handle: None,
            csv_path: None,
        }
    }

    pub fn start(&mut self, write_interval: u32) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::AlreadyRunning("scan"));
        }
        let argv = vec![
            "airodump-ng".to_string(),
            "-w".to_string(),
            "scan".to_string(),
            "--output-format".to_string(),
            "csv".to_string(),
            "--write-interval".to_string(),
            write_interval.to_string(),
            "-a".to_string(),
            self.interface.name.clone(),
        ];
        let handle = ProcessHandle::start("scan", &argv, None)?;
        self.csv_path = handle.work_dir().map(|dir| dir.join("scan-01.csv"));
        self.handle = Some(handle);
        debug!("scan started");
        Ok(())
    }

    pub fn stop(&mut self) -> Option<i32> {
        let mut handle = self.handle.take()?;
        let code = handle.terminate(self.grace);
        handle.release();
        self.csv_path = None;
        debug!("scan stopped");
        code
    }

    /// Scan for `duration`, parse the result, stop.
    pub async fn scan_once(
        &mut self,
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<WirelessAccessPoint>> {
        self.start(2)?;
        tokio::time::sleep(duration).await;
        let result = match (&self.csv_path, cancel.is_cancelled()) {
            (_, true) => Err(Error::Cancelled),
            (Some(csv), false) => parse_scan_csv(csv),
            (None, false) => Ok(Vec::new()),
        };
        self.stop();
        result
    }

    /// Scan once and look the target up by ESSID.
    pub async fn find_target(
        &mut self,
        essid: &str,
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<WirelessAccessPoint> {
        let scan = self.scan_once(duration, cancel).await?;
        scan.into_iter()
            .find(|ap| ap.essid == essid)
            .ok_or_else(|| Error::TargetNotFound(essid.to_string()))
    }
}

impl Drop for WirelessScanner {
    fn drop(&mut self) {
        self.stop();
    }
}
