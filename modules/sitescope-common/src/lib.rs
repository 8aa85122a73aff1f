pub mod config;
pub mod error;
pub mod features;
pub mod hex;
pub mod report;
pub mod types;

pub use config::{ScanConfig, ScanDocument};
pub use error::ScanError;
pub use features::*;
pub use hex::HexCoord;
pub use report::*;
pub use types::*;
