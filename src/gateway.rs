//! Device gateway traits
//!
//! Each of the three remote devices is reached through one of these traits,
//! constructed once at startup and passed into the control loop. Tests
//! substitute in-memory fakes; production uses the Modbus-backed
//! implementations in `battery`, `charger` and `inverter`.

use crate::error::Result;
use crate::telemetry::{BatteryDischarge, ChargerState, ChargingMode, StartStop};
use async_trait::async_trait;

/// Battery unit gateway (ZCell BMS)
#[async_trait]
pub trait BatteryGateway: Send {
    /// State of charge in percent for the configured unit index
    async fn state_of_charge(&mut self) -> Result<f64>;

    /// Whether the strip (maintenance) cycle is required or running
    async fn maintenance_active(&mut self) -> Result<bool>;

    /// Bus voltage, current and derived discharge power
    async fn discharge(&mut self) -> Result<BatteryDischarge>;
}

/// EV charger controller gateway
#[async_trait]
pub trait ChargerGateway: Send {
    /// Plug/charging state
    async fn state(&mut self) -> Result<ChargerState>;

    /// Current charging mode
    async fn mode(&mut self) -> Result<ChargingMode>;

    /// Charge current setpoint in amps
    async fn charge_current(&mut self) -> Result<u16>;

    /// Set the charging mode register
    async fn set_mode(&mut self, mode: ChargingMode) -> Result<()>;

    /// Set the start/stop register
    async fn set_start_stop(&mut self, value: StartStop) -> Result<()>;

    /// Set the charge current register in amps
    async fn set_charge_current(&mut self, amps: u16) -> Result<()>;
}

/// Inverter/load monitor gateway (Cerbo GX)
#[async_trait]
pub trait LoadGateway: Send {
    /// AC load on the first phase in watts
    async fn ac_load(&mut self) -> Result<f64>;

    /// Live AC output voltage on the first phase in volts
    async fn ac_voltage(&mut self) -> Result<f64>;
}
