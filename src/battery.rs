//! Battery unit gateway for the Redflow ZCell BMS
//!
//! State of charge comes from the bank SOC array (tenths of a percent per
//! unit); bus voltage and current come from the per-cell registers (deci
//! scaled, current signed). The strip flag can be read either from the
//! per-cell status-flag register or from the BMS REST status endpoint.

use crate::config::{BatteryConfig, ModbusTuningConfig, StatusSource};
use crate::error::{PhlegonError, Result};
use crate::gateway::BatteryGateway;
use crate::logging::get_logger;
use crate::modbus::{
    ModbusConnectionManager, ModbusEndpoint, first_word, scale_hundredths, scale_signed_tenths,
    scale_tenths, word_at,
};
use crate::telemetry::{BatteryDischarge, discharge_rate_watts, maintenance_flag_active};
use async_trait::async_trait;
use serde::Deserialize;

/// One unit's entry in the REST status payload
#[derive(Debug, Clone, Deserialize)]
pub struct ZbmUnitStatus {
    pub state_of_charge: f64,
    pub is_stripping: bool,
}

/// Payload of `GET /rest/1.0/status` on the battery gateway
#[derive(Debug, Clone, Deserialize)]
pub struct ZbmStatus {
    pub list: Vec<ZbmUnitStatus>,
}

/// REST client for the BMS status endpoint
pub struct ZbmStatusClient {
    url: String,
    client: reqwest::Client,
}

impl ZbmStatusClient {
    pub fn new(ip: &str, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: format!("http://{}:{}/rest/1.0/status", ip, port),
            client,
        })
    }

    /// Fetch the status record for all units
    pub async fn status(&self) -> Result<ZbmStatus> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(PhlegonError::network(format!(
                "battery status endpoint returned {}",
                resp.status()
            )));
        }
        let status: ZbmStatus = resp.json().await?;
        Ok(status)
    }
}

/// Modbus/REST-backed battery gateway
pub struct ZcellGateway {
    config: BatteryConfig,
    modbus: ModbusConnectionManager,
    rest: Option<ZbmStatusClient>,
    logger: crate::logging::StructuredLogger,
}

impl ZcellGateway {
    pub fn new(config: &BatteryConfig, tuning: &ModbusTuningConfig) -> Result<Self> {
        let endpoint = ModbusEndpoint::new(&config.ip, config.port);
        let rest = match config.status_source {
            StatusSource::Rest => Some(ZbmStatusClient::new(&config.ip, config.rest_port)?),
            StatusSource::Modbus => None,
        };
        Ok(Self {
            config: config.clone(),
            modbus: ModbusConnectionManager::new(endpoint, tuning),
            rest,
            logger: get_logger("battery"),
        })
    }

    /// Strip flag via the per-cell status-flag register
    async fn maintenance_active_modbus(&mut self) -> Result<bool> {
        let regs = self
            .modbus
            .read_holding_registers(
                self.config.cell_unit_id,
                self.config.registers.status_flags,
                1,
            )
            .await?;
        let status = first_word(&regs, "status flags")?;
        Ok(maintenance_flag_active(status))
    }

    /// Strip flag via the REST status endpoint
    async fn maintenance_active_rest(&mut self) -> Result<bool> {
        let rest = self
            .rest
            .as_ref()
            .ok_or_else(|| PhlegonError::config("REST status client not configured"))?;
        let status = rest.status().await?;
        let unit = status
            .list
            .get(usize::from(self.config.unit_index))
            .ok_or_else(|| {
                PhlegonError::telemetry(format!(
                    "status record has no unit at index {}",
                    self.config.unit_index
                ))
            })?;
        Ok(unit.is_stripping)
    }
}

#[async_trait]
impl BatteryGateway for ZcellGateway {
    async fn state_of_charge(&mut self) -> Result<f64> {
        // The bank register is an array over all units; read up to and
        // including the configured unit index
        let count = self.config.unit_index + 1;
        let regs = self
            .modbus
            .read_holding_registers(self.config.unit_id, self.config.registers.soc_bank, count)
            .await?;
        let raw = word_at(&regs, usize::from(self.config.unit_index), "state of charge")?;
        // Tenths of a percent
        Ok(f64::from(raw) / 10.0)
    }

    async fn maintenance_active(&mut self) -> Result<bool> {
        match self.config.status_source {
            StatusSource::Modbus => self.maintenance_active_modbus().await,
            StatusSource::Rest => self.maintenance_active_rest().await,
        }
    }

    async fn discharge(&mut self) -> Result<BatteryDischarge> {
        // One connection for the whole per-cell status read, like the
        // original diagnostic tooling
        let registers = self.config.registers.clone();
        let words = self
            .modbus
            .read_registers_each(
                self.config.cell_unit_id,
                &[
                    registers.bus_voltage,
                    registers.current,
                    registers.voltage,
                    registers.soc,
                    registers.state,
                ],
            )
            .await?;
        let bus_raw = word_at(&words, 0, "bus voltage")?;
        let current_raw = word_at(&words, 1, "current")?;
        let voltage_raw = word_at(&words, 2, "cell voltage")?;
        let soc_raw = word_at(&words, 3, "cell state of charge")?;
        let state_raw = word_at(&words, 4, "cell state")?;

        let watts = discharge_rate_watts(bus_raw, current_raw);
        let discharge = BatteryDischarge {
            bus_voltage: scale_tenths(bus_raw),
            current: scale_signed_tenths(current_raw),
            watts,
        };

        self.logger.trace(&format!(
            "{} ({}): bus={:.1}V current={:.1}A cell={:.1}V soc={:.2}% rate={:.0}W",
            cell_state_name(state_raw),
            state_raw,
            discharge.bus_voltage,
            discharge.current,
            scale_tenths(voltage_raw),
            scale_hundredths(soc_raw),
            discharge.watts
        ));
        Ok(discharge)
    }
}

/// Human-readable name for the 700-series cell operating state codes
pub fn cell_state_name(code: u16) -> &'static str {
    match code {
        700 => "Safe shutdown - reactions stopped",
        701 => "Bubble purge - precharge",
        702 => "Run mode (standard)",
        712 => "Maintenance discharge",
        713 => "Anode strip in progress",
        720 => "Standby for precharge",
        751 => "Precharge",
        753 => "Precharge failed",
        _ => "Unknown state",
    }
}
