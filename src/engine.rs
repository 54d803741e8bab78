//! Charging decision engine
//!
//! The state machine that decides, from one telemetry snapshot per poll,
//! whether to enable, continue, or disable EV charging during the battery's
//! strip cycle. The engine holds explicit `charging_active` state so a
//! decision never depends on re-querying the charger to learn what the engine
//! itself last commanded. All device I/O happens outside; `step` is pure
//! apart from logging.

use crate::config::ThresholdsConfig;
use crate::logging::get_logger;
use crate::scheduler::PollInterval;
use crate::telemetry::{ChargerState, ChargingMode, TelemetrySnapshot};

/// Engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for the strip cycle to begin
    WaitingForMaintenance,

    /// Strip is active but the unit is too depleted to evaluate further;
    /// polled on the slow interval to avoid hammering the battery gateway
    MaintenancePausedLowCharge,

    /// Strip is active; checking plug state and load for a charge start
    EvaluatingChargeStart,

    /// Conditions were right except the AC load; waiting for it to drop
    WaitingForLoadDrop,

    /// EV charging is enabled
    Charging,

    /// Fail-safe halt: the battery could no longer supply the load
    Terminated,
}

/// Outcome of one engine evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlDecision {
    /// Issue the charger enable sequence
    StartCharging,

    /// Issue the charger disable sequence
    StopCharging,

    /// No device action; re-poll on the fast interval
    ContinueWaiting,

    /// No device action; re-poll on the slow interval
    Backoff,
}

impl ControlDecision {
    /// Poll interval to wait before the next evaluation
    pub fn interval(self) -> PollInterval {
        match self {
            Self::Backoff => PollInterval::Slow,
            _ => PollInterval::Fast,
        }
    }
}

/// The charging-control state machine
pub struct DecisionEngine {
    thresholds: ThresholdsConfig,
    state: EngineState,
    charging_active: bool,
    logger: crate::logging::StructuredLogger,
}

impl DecisionEngine {
    pub fn new(thresholds: ThresholdsConfig) -> Self {
        Self {
            thresholds,
            state: EngineState::WaitingForMaintenance,
            charging_active: false,
            logger: get_logger("engine"),
        }
    }

    /// Current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Whether the engine last commanded charging on
    pub fn charging_active(&self) -> bool {
        self.charging_active
    }

    /// Evaluate one telemetry snapshot and decide what to do next
    pub fn step(&mut self, snapshot: &TelemetrySnapshot) -> ControlDecision {
        match self.state {
            EngineState::WaitingForMaintenance => self.step_waiting(snapshot),
            EngineState::EvaluatingChargeStart | EngineState::WaitingForLoadDrop => {
                if !snapshot.battery.maintenance_active {
                    return self.on_maintenance_ended();
                }
                self.evaluate_start(snapshot)
            }
            EngineState::MaintenancePausedLowCharge => self.step_low_charge(snapshot),
            EngineState::Charging => self.step_charging(snapshot),
            // Terminal; the loop should already have exited
            EngineState::Terminated => ControlDecision::StopCharging,
        }
    }

    fn step_waiting(&mut self, snapshot: &TelemetrySnapshot) -> ControlDecision {
        if snapshot.battery.maintenance_active {
            self.logger
                .info("Maintenance time has arrived; checking for valid charging conditions");
            self.state = EngineState::EvaluatingChargeStart;
            return self.evaluate_start(snapshot);
        }

        // Sign flipped for readability: negative discharge is a charge rate
        self.logger.info(&format!(
            "Not stripping; charge rate {:.0} W at {:.1}% SOC, sleeping for five minutes",
            -snapshot.battery.discharge_rate_watts, snapshot.battery.state_of_charge
        ));
        ControlDecision::ContinueWaiting
    }

    fn step_low_charge(&mut self, snapshot: &TelemetrySnapshot) -> ControlDecision {
        if !snapshot.battery.maintenance_active {
            self.logger.info("Maintenance finished during low-charge wait");
            self.state = EngineState::WaitingForMaintenance;
            return ControlDecision::ContinueWaiting;
        }

        if snapshot.battery.state_of_charge >= self.thresholds.min_discharge_percent {
            self.logger.info(&format!(
                "Charge level recovered to {:.1}%; re-evaluating",
                snapshot.battery.state_of_charge
            ));
            self.state = EngineState::EvaluatingChargeStart;
            return self.evaluate_start(snapshot);
        }

        self.logger.debug(&format!(
            "Battery at {:.1}% is still below the {:.1}% floor; backing off for an hour",
            snapshot.battery.state_of_charge, self.thresholds.min_discharge_percent
        ));
        ControlDecision::Backoff
    }

    fn step_charging(&mut self, snapshot: &TelemetrySnapshot) -> ControlDecision {
        if !snapshot.battery.maintenance_active {
            return self.on_maintenance_ended();
        }

        let charge = snapshot.battery.state_of_charge;
        let load = snapshot.load.ac_load_watts;
        let rate = snapshot.battery.discharge_rate_watts;

        // The discharge shortfall is the hazardous case and wins over any
        // other failing condition: drawing more than the battery can supply
        // warrants a hard stop, not another evaluation round.
        if rate <= load {
            self.logger.warn(&format!(
                "Discharge rate {:.0} W no longer exceeds AC load {:.0} W; \
                 stopping charging and terminating",
                rate, load
            ));
            self.charging_active = false;
            self.state = EngineState::Terminated;
            return ControlDecision::StopCharging;
        }

        if charge < self.thresholds.min_discharge_percent {
            self.logger.info(&format!(
                "Charge level {:.1}% dropped below the {:.1}% floor; stopping charging",
                charge, self.thresholds.min_discharge_percent
            ));
            self.charging_active = false;
            self.state = EngineState::EvaluatingChargeStart;
            return ControlDecision::StopCharging;
        }

        if load > self.thresholds.ac_load_max_discharge_w {
            self.logger.info(&format!(
                "AC load {:.0} W exceeds the {:.0} W ceiling; stopping charging",
                load, self.thresholds.ac_load_max_discharge_w
            ));
            self.charging_active = false;
            self.state = EngineState::EvaluatingChargeStart;
            return ControlDecision::StopCharging;
        }

        self.logger.info(&format!(
            "Current charge level is {:.1}%, current load is {:.0} W",
            charge, load
        ));
        ControlDecision::ContinueWaiting
    }

    /// Roll back a commanded charge start that could not be applied to the
    /// device; the next tick re-runs the start evaluation from scratch
    pub fn abort_charging_start(&mut self) {
        self.charging_active = false;
        self.state = EngineState::EvaluatingChargeStart;
    }

    /// Maintenance ending always takes priority over charge/load state
    fn on_maintenance_ended(&mut self) -> ControlDecision {
        self.logger
            .info("Maintenance ended; returning to maintenance wait");
        self.state = EngineState::WaitingForMaintenance;
        if self.charging_active {
            self.charging_active = false;
            ControlDecision::StopCharging
        } else {
            ControlDecision::ContinueWaiting
        }
    }

    /// Charge-start evaluation; maintenance is known active here and charging
    /// is known off (a stop is always commanded before re-evaluation)
    fn evaluate_start(&mut self, snapshot: &TelemetrySnapshot) -> ControlDecision {
        if snapshot.battery.state_of_charge < self.thresholds.min_discharge_percent {
            self.logger.info(
                "Battery level has dropped below threshold; waiting for maintenance to finish",
            );
            self.state = EngineState::MaintenancePausedLowCharge;
            return ControlDecision::Backoff;
        }

        if !snapshot.charger.state.is_plugged_in() {
            self.logger.warn("EV is not plugged in");
            self.state = EngineState::EvaluatingChargeStart;
            return ControlDecision::ContinueWaiting;
        }

        let effective = self.effective_load(snapshot);
        if effective < self.thresholds.ac_load_min_discharge_w {
            self.logger.info(&format!(
                "Low AC load ({:.0} W effective); starting charging",
                effective
            ));
            self.charging_active = true;
            self.state = EngineState::Charging;
            return ControlDecision::StartCharging;
        }

        self.logger.info(&format!(
            "Load is too high ({:.0} W effective); waiting for load to drop",
            effective
        ));
        self.state = EngineState::WaitingForLoadDrop;
        ControlDecision::ContinueWaiting
    }

    /// Measured AC load minus the charger's own draw when it is mid-charge in
    /// manual mode. The draw uses the live AC voltage since voltage sags
    /// under load; the nominal voltage is only a fallback for an implausible
    /// reading.
    fn effective_load(&self, snapshot: &TelemetrySnapshot) -> f64 {
        let mut load = snapshot.load.ac_load_watts;
        if snapshot.charger.mode == ChargingMode::Manual
            && snapshot.charger.state == ChargerState::Charging
        {
            let voltage = if snapshot.load.ac_voltage > 0.0 {
                snapshot.load.ac_voltage
            } else {
                self.thresholds.nominal_ac_voltage
            };
            let draw = f64::from(snapshot.charger.charge_current_amps) * voltage;
            self.logger.debug(&format!(
                "Currently charging with current {} A; subtracting {:.0} W draw",
                snapshot.charger.charge_current_amps, draw
            ));
            load -= draw;
        }
        load
    }
}
