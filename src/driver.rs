//! Control loop orchestration
//!
//! Wires the gateways, telemetry reader, decision engine, charger controls
//! and scheduler together: one snapshot per iteration, one decision, one
//! wait. A failed poll is logged at ERROR and the cycle is skipped; the loop
//! retries after the current interval rather than crashing.

use crate::config::Config;
use crate::controls::ChargerControls;
use crate::engine::{ControlDecision, DecisionEngine, EngineState};
use crate::error::Result;
use crate::gateway::{BatteryGateway, ChargerGateway, LoadGateway};
use crate::logging::get_logger;
use crate::scheduler::{Clock, PollInterval, PollScheduler};
use crate::telemetry::TelemetryReader;

/// Main driver for Phlegon
pub struct StripChargeDriver {
    /// Battery unit gateway
    battery: Box<dyn BatteryGateway>,

    /// Charger controller gateway
    charger: Box<dyn ChargerGateway>,

    /// Inverter/load monitor gateway
    load: Box<dyn LoadGateway>,

    /// Telemetry reader
    reader: TelemetryReader,

    /// The decision state machine
    engine: DecisionEngine,

    /// Charger enable/disable sequences
    controls: ChargerControls,

    /// Logger with context
    logger: crate::logging::StructuredLogger,
}

impl StripChargeDriver {
    /// Create a driver against the real Modbus-backed gateways
    pub fn new(config: &Config) -> Result<Self> {
        let battery = crate::battery::ZcellGateway::new(&config.battery, &config.modbus)?;
        let charger = crate::charger::VictronChargerGateway::new(&config.charger, &config.modbus);
        let load = crate::inverter::CerboGateway::new(&config.inverter, &config.modbus);
        Ok(Self::with_gateways(
            config,
            Box::new(battery),
            Box::new(charger),
            Box::new(load),
        ))
    }

    /// Create a driver with injected gateways (used by tests)
    pub fn with_gateways(
        config: &Config,
        battery: Box<dyn BatteryGateway>,
        charger: Box<dyn ChargerGateway>,
        load: Box<dyn LoadGateway>,
    ) -> Self {
        Self {
            battery,
            charger,
            load,
            reader: TelemetryReader::new(),
            engine: DecisionEngine::new(config.thresholds.clone()),
            controls: ChargerControls::new(config.thresholds.charge_current_amps),
            logger: get_logger("driver"),
        }
    }

    /// Current engine state
    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    /// Run the control loop until fail-safe termination
    pub async fn run<C: Clock>(&mut self, scheduler: &mut PollScheduler<C>) -> Result<()> {
        self.logger.info("Initiating poll for maintenance cycle");

        loop {
            let interval = self.poll_cycle().await?;

            if self.engine.state() == EngineState::Terminated {
                self.logger
                    .warn("Fail-safe termination; ending the control loop");
                return Ok(());
            }

            scheduler.wait(interval).await;
        }
    }

    /// One poll iteration: read, decide, act. Returns the interval to wait
    /// before the next iteration.
    pub async fn poll_cycle(&mut self) -> Result<PollInterval> {
        let snapshot = match self
            .reader
            .read_snapshot(
                self.battery.as_mut(),
                self.charger.as_mut(),
                self.load.as_mut(),
            )
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Never act on unknown data; retry after the current interval
                self.logger
                    .error(&format!("Telemetry poll failed, skipping cycle: {}", e));
                return Ok(self.retry_interval());
            }
        };

        let decision = self.engine.step(&snapshot);
        if let Err(e) = self.execute(decision).await {
            self.logger
                .error(&format!("Charger command failed, skipping cycle: {}", e));
            if decision == ControlDecision::StartCharging {
                // The device was rolled back; the engine must not believe
                // charging is on
                self.engine.abort_charging_start();
            }
            return Ok(self.retry_interval());
        }
        Ok(decision.interval())
    }

    /// Interval to wait before retrying a failed cycle. In the low-charge
    /// pause the slow cadence applies to failures too, so a gateway outage
    /// there does not resume five-minute polling.
    fn retry_interval(&self) -> PollInterval {
        if self.engine.state() == EngineState::MaintenancePausedLowCharge {
            PollInterval::Slow
        } else {
            PollInterval::Fast
        }
    }

    async fn execute(&mut self, decision: ControlDecision) -> Result<()> {
        match decision {
            ControlDecision::StartCharging => {
                if let Err(e) = self.controls.enable_charging(self.charger.as_mut()).await {
                    // A partially applied enable sequence must not be left
                    // running unattended
                    self.logger
                        .error(&format!("Enable sequence failed: {}; disabling", e));
                    let _ = self.controls.disable_charging(self.charger.as_mut()).await;
                    return Err(e);
                }
                Ok(())
            }
            ControlDecision::StopCharging => {
                match self.controls.disable_charging(self.charger.as_mut()).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        self.logger
                            .error(&format!("Disable sequence failed: {}", e));
                        Err(e)
                    }
                }
            }
            ControlDecision::ContinueWaiting | ControlDecision::Backoff => Ok(()),
        }
    }
}
