//! # Phlegon - strip-cycle EV charging controller
//!
//! A Rust implementation of the ZCell maintenance-cycle energy arbitrage
//! controller: while a Redflow zinc-bromide flow battery runs its periodic
//! strip (maintenance) cycle, excess capacity is routed into an EV through a
//! Victron EV Charging Station, within configured state-of-charge and AC-load
//! safety thresholds.
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of
//! concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `modbus`: Modbus TCP transport shared by the device gateways
//! - `gateway`: Device gateway traits (dependency-injection seam)
//! - `battery`, `charger`, `inverter`: Modbus-backed gateways for the ZCell
//!   BMS, the EV charger and the Cerbo GX
//! - `telemetry`: Snapshot types and raw-register normalization
//! - `engine`: The charging decision state machine
//! - `controls`: Ordered charger enable/disable sequences
//! - `scheduler`: Fast/slow poll cadence behind an injectable clock
//! - `driver`: Control loop orchestration

pub mod battery;
pub mod charger;
pub mod config;
pub mod controls;
pub mod driver;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod inverter;
pub mod logging;
pub mod modbus;
pub mod scheduler;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use driver::StripChargeDriver;
pub use error::{PhlegonError, Result};
