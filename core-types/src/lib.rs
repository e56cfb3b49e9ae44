//! Shared kernel for the LTP ingestion pipeline: tick and instrument
//! types, strike arithmetic, retry policy, configuration, and the
//! transport seam.

pub mod config;
pub mod retry;
pub mod transport;
pub mod types;
