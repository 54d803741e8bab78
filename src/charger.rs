//! EV charger controller gateway (Victron EV Charging Station)
//!
//! Mode, start/stop, state and charge-current registers are single holding
//! registers on one unit id.

use crate::config::{ChargerConfig, ModbusTuningConfig};
use crate::error::Result;
use crate::gateway::ChargerGateway;
use crate::modbus::{ModbusConnectionManager, ModbusEndpoint, first_word};
use crate::telemetry::{ChargerState, ChargingMode, StartStop};
use async_trait::async_trait;

/// Modbus-backed charger gateway
pub struct VictronChargerGateway {
    config: ChargerConfig,
    modbus: ModbusConnectionManager,
}

impl VictronChargerGateway {
    pub fn new(config: &ChargerConfig, tuning: &ModbusTuningConfig) -> Self {
        let endpoint = ModbusEndpoint::new(&config.ip, config.port);
        Self {
            config: config.clone(),
            modbus: ModbusConnectionManager::new(endpoint, tuning),
        }
    }

    async fn read_register(&mut self, address: u16, what: &str) -> Result<u16> {
        let regs = self
            .modbus
            .read_holding_registers(self.config.unit_id, address, 1)
            .await?;
        first_word(&regs, what)
    }
}

#[async_trait]
impl ChargerGateway for VictronChargerGateway {
    async fn state(&mut self) -> Result<ChargerState> {
        let raw = self
            .read_register(self.config.registers.state, "charger state")
            .await?;
        ChargerState::from_raw(raw)
    }

    async fn mode(&mut self) -> Result<ChargingMode> {
        let raw = self
            .read_register(self.config.registers.mode, "charging mode")
            .await?;
        ChargingMode::from_raw(raw)
    }

    async fn charge_current(&mut self) -> Result<u16> {
        self.read_register(self.config.registers.charge_current, "charge current")
            .await
    }

    async fn set_mode(&mut self, mode: ChargingMode) -> Result<()> {
        self.modbus
            .write_single_register(
                self.config.unit_id,
                self.config.registers.mode,
                mode.as_register(),
            )
            .await
    }

    async fn set_start_stop(&mut self, value: StartStop) -> Result<()> {
        self.modbus
            .write_single_register(
                self.config.unit_id,
                self.config.registers.start_stop,
                value.as_register(),
            )
            .await
    }

    async fn set_charge_current(&mut self, amps: u16) -> Result<()> {
        self.modbus
            .write_single_register(
                self.config.unit_id,
                self.config.registers.charge_current,
                amps,
            )
            .await
    }
}
