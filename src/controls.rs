//! Charger control sequences
//!
//! The enable and disable sequences are ordered register writes against the
//! charger controller and must execute in exactly this order.

use crate::error::Result;
use crate::gateway::ChargerGateway;
use crate::logging::get_logger;
use crate::telemetry::{ChargingMode, StartStop};

/// Issues the ordered enable/disable write sequences
pub struct ChargerControls {
    charge_current_amps: u16,
    logger: crate::logging::StructuredLogger,
}

impl ChargerControls {
    /// Create new charger controls with the configured charge current
    pub fn new(charge_current_amps: u16) -> Self {
        Self {
            charge_current_amps,
            logger: get_logger("controls"),
        }
    }

    /// Enable charging: manual mode, configured current, start
    pub async fn enable_charging(&self, charger: &mut dyn ChargerGateway) -> Result<()> {
        self.logger.info(&format!(
            "Enabling charging at {} A (manual mode)",
            self.charge_current_amps
        ));
        charger.set_mode(ChargingMode::Manual).await?;
        charger.set_charge_current(self.charge_current_amps).await?;
        charger.set_start_stop(StartStop::Start).await?;
        Ok(())
    }

    /// Disable charging: stop, back to auto mode, start.
    /// Once in auto mode, "start" means "whenever there's excess solar,
    /// charge the car", which is the desired resting state.
    pub async fn disable_charging(&self, charger: &mut dyn ChargerGateway) -> Result<()> {
        self.logger
            .info("Disabling charging (returning to solar-opportunistic auto mode)");
        charger.set_start_stop(StartStop::Stop).await?;
        charger.set_mode(ChargingMode::Auto).await?;
        charger.set_start_stop(StartStop::Start).await?;
        Ok(())
    }
}
