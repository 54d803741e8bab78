//! Telemetry types and normalization for Phlegon
//!
//! Raw register encodings from the three devices are normalized here into
//! engineering units: signed reinterpretation of current registers,
//! tenths/hundredths fixed-point scaling, and the strip status-flag bitmask.
//! Every entity is fetched fresh at the top of each poll iteration and none
//! survives past it.

use crate::error::{PhlegonError, Result};
use crate::gateway::{BatteryGateway, ChargerGateway, LoadGateway};
use crate::logging::get_logger;
use crate::modbus::scale_signed_tenths;

/// Status-flag bit: the unit requires a strip cycle
pub const STRIP_REQUIRED: u16 = 64;

/// Status-flag bit: a strip cycle is currently running
pub const STRIP_RUNNING: u16 = 128;

/// Maintenance is active iff either strip bit is set in the status register
pub fn maintenance_flag_active(status: u16) -> bool {
    status & (STRIP_REQUIRED | STRIP_RUNNING) != 0
}

/// Discharge rate in watts from the raw bus-voltage and current words.
/// Both registers are deci-scaled; the current word is signed. Positive
/// means net discharge, negative means net charge.
pub fn discharge_rate_watts(bus_voltage_raw: u16, current_raw: u16) -> f64 {
    let bus_voltage = f64::from(bus_voltage_raw) / 10.0;
    let current = scale_signed_tenths(current_raw);
    bus_voltage * current
}

/// Charger plug/charging state, register values 0-6 (5 is unassigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerState {
    Disconnected = 0,
    Connected = 1,
    Charging = 2,
    Charged = 3,
    WaitingForSun = 4,
    WaitingForStart = 6,
}

impl ChargerState {
    /// Decode the raw state register. Unknown values are an error so the
    /// engine never takes a charging action on unknown data.
    pub fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(Self::Disconnected),
            1 => Ok(Self::Connected),
            2 => Ok(Self::Charging),
            3 => Ok(Self::Charged),
            4 => Ok(Self::WaitingForSun),
            6 => Ok(Self::WaitingForStart),
            other => Err(PhlegonError::telemetry(format!(
                "unknown charger state register value {}",
                other
            ))),
        }
    }

    /// Whether a vehicle is physically connected in this state
    pub fn is_plugged_in(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Charging | Self::WaitingForSun | Self::WaitingForStart
        )
    }
}

/// Charging mode register values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingMode {
    /// Start/stop and current are explicitly commanded
    Manual = 0,

    /// Solar-opportunistic charging, the desired resting state
    Auto = 1,

    /// Time-based charging
    Scheduled = 2,
}

impl ChargingMode {
    pub fn from_raw(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(Self::Manual),
            1 => Ok(Self::Auto),
            2 => Ok(Self::Scheduled),
            other => Err(PhlegonError::telemetry(format!(
                "unknown charging mode register value {}",
                other
            ))),
        }
    }

    pub fn as_register(self) -> u16 {
        self as u16
    }
}

/// Start/stop register values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStop {
    Stop = 0,
    Start = 1,
}

impl StartStop {
    pub fn as_register(self) -> u16 {
        self as u16
    }
}

/// Battery readings for one poll iteration
#[derive(Debug, Clone, Copy)]
pub struct BatteryTelemetry {
    /// State of charge in percent, one-decimal precision
    pub state_of_charge: f64,

    /// Whether a strip cycle is required or running
    pub maintenance_active: bool,

    /// DC bus voltage in volts
    pub bus_voltage: f64,

    /// Battery current in amps, positive = discharging
    pub current: f64,

    /// Discharge rate in watts, positive = discharging
    pub discharge_rate_watts: f64,
}

/// AC load readings for one poll iteration.
/// Only the first phase is read; L2/L3 are a known, intentional omission.
#[derive(Debug, Clone, Copy)]
pub struct LoadTelemetry {
    /// AC load on the first phase in watts
    pub ac_load_watts: f64,

    /// Live AC output voltage on the first phase in volts
    pub ac_voltage: f64,
}

/// Charger readings for one poll iteration
#[derive(Debug, Clone, Copy)]
pub struct ChargerTelemetry {
    /// Plug/charging state
    pub state: ChargerState,

    /// Current charging mode
    pub mode: ChargingMode,

    /// Charge current setpoint in amps
    pub charge_current_amps: u16,
}

/// All readings the decision engine needs for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct TelemetrySnapshot {
    pub battery: BatteryTelemetry,
    pub load: LoadTelemetry,
    pub charger: ChargerTelemetry,
}

/// Polls the gateways and assembles normalized snapshots
pub struct TelemetryReader {
    logger: crate::logging::StructuredLogger,
}

impl TelemetryReader {
    pub fn new() -> Self {
        Self {
            logger: get_logger("telemetry"),
        }
    }

    /// Fetch one fresh snapshot from all three devices. Any failed or empty
    /// read propagates as an error; no value is ever defaulted.
    pub async fn read_snapshot(
        &self,
        battery: &mut dyn BatteryGateway,
        charger: &mut dyn ChargerGateway,
        load: &mut dyn LoadGateway,
    ) -> Result<TelemetrySnapshot> {
        let state_of_charge = battery.state_of_charge().await?;
        let maintenance_active = battery.maintenance_active().await?;
        let discharge = battery.discharge().await?;

        let ac_load_watts = load.ac_load().await?;
        let ac_voltage = load.ac_voltage().await?;

        let state = charger.state().await?;
        let mode = charger.mode().await?;
        let charge_current_amps = charger.charge_current().await?;

        let snapshot = TelemetrySnapshot {
            battery: BatteryTelemetry {
                state_of_charge,
                maintenance_active,
                bus_voltage: discharge.bus_voltage,
                current: discharge.current,
                discharge_rate_watts: discharge.watts,
            },
            load: LoadTelemetry {
                ac_load_watts,
                ac_voltage,
            },
            charger: ChargerTelemetry {
                state,
                mode,
                charge_current_amps,
            },
        };

        self.logger.debug(&format!(
            "soc={:.1}% strip={} rate={:.0}W load={:.0}W vac={:.1}V charger={:?}/{:?}@{}A",
            snapshot.battery.state_of_charge,
            snapshot.battery.maintenance_active,
            snapshot.battery.discharge_rate_watts,
            snapshot.load.ac_load_watts,
            snapshot.load.ac_voltage,
            snapshot.charger.state,
            snapshot.charger.mode,
            snapshot.charger.charge_current_amps,
        ));

        Ok(snapshot)
    }
}

impl Default for TelemetryReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Bus voltage, current and derived discharge power from one battery read
#[derive(Debug, Clone, Copy)]
pub struct BatteryDischarge {
    /// DC bus voltage in volts
    pub bus_voltage: f64,

    /// Battery current in amps, positive = discharging
    pub current: f64,

    /// Discharge power in watts, positive = discharging
    pub watts: f64,
}
