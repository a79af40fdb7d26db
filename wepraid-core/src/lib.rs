//! wepraid core library
//!
//! This crate provides the fundamental types and error handling for the
//! wepraid attack engine:
//!
//! - Error taxonomy with process exit-code mapping
//! - `MacAddr` and the wireless network model (access points, stations,
//!   interfaces)
//! - Parsing of airodump-ng scan/capture CSV output
//! - Attack timing configuration
//! - Cooperative cancellation token

pub mod cancel;
pub mod config;
pub mod error;
pub mod model;
pub mod scan;
pub mod types;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::Timings;
pub use error::{Error, Result};
pub use model::{WirelessAccessPoint, WirelessInterface, WirelessStation};
pub use types::MacAddr;
