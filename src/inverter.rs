//! Inverter/load monitor gateway (Victron Cerbo GX)
//!
//! AC loads live on the system service unit id (watts per phase); the live
//! AC output voltage lives on the vebus unit id in deci-volts. Only L1 is
//! used for decisions; L2/L3 are observed but intentionally unsummed.

use crate::config::{InverterConfig, ModbusTuningConfig};
use crate::error::Result;
use crate::gateway::LoadGateway;
use crate::logging::get_logger;
use crate::modbus::{ModbusConnectionManager, ModbusEndpoint, first_word};
use async_trait::async_trait;

/// Modbus-backed load gateway
pub struct CerboGateway {
    config: InverterConfig,
    modbus: ModbusConnectionManager,
    logger: crate::logging::StructuredLogger,
}

impl CerboGateway {
    pub fn new(config: &InverterConfig, tuning: &ModbusTuningConfig) -> Self {
        let endpoint = ModbusEndpoint::new(&config.ip, config.port);
        Self {
            config: config.clone(),
            modbus: ModbusConnectionManager::new(endpoint, tuning),
            logger: get_logger("inverter"),
        }
    }
}

#[async_trait]
impl LoadGateway for CerboGateway {
    async fn ac_load(&mut self) -> Result<f64> {
        // L1..L3 are consecutive; read all three but decide on L1 only
        let regs = self
            .modbus
            .read_holding_registers(
                self.config.system_unit_id,
                self.config.registers.ac_load_l1,
                3,
            )
            .await?;
        let l1 = first_word(&regs, "AC load L1")?;
        if let (Some(l2), Some(l3)) = (regs.get(1), regs.get(2)) {
            self.logger
                .trace(&format!("ac load: L1={}W L2={}W L3={}W", l1, l2, l3));
        }
        Ok(f64::from(l1))
    }

    async fn ac_voltage(&mut self) -> Result<f64> {
        let regs = self
            .modbus
            .read_holding_registers(
                self.config.vebus_unit_id,
                self.config.registers.ac_out_voltage_l1,
                1,
            )
            .await?;
        let raw = first_word(&regs, "AC output voltage L1")?;
        // Deci-volts
        Ok(f64::from(raw) / 10.0)
    }
}
