use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use phlegon::config::Config;
use phlegon::controls::ChargerControls;
use phlegon::driver::StripChargeDriver;
use phlegon::engine::EngineState;
use phlegon::error::{PhlegonError, Result};
use phlegon::gateway::{BatteryGateway, ChargerGateway, LoadGateway};
use phlegon::scheduler::{Clock, PollInterval, PollScheduler};
use std::time::Duration;
use phlegon::telemetry::{BatteryDischarge, ChargerState, ChargingMode, StartStop};

/// Site telemetry shared between the fakes and the test body
#[derive(Clone)]
struct Site(Arc<Mutex<SiteValues>>);

struct SiteValues {
    soc: f64,
    maintenance: bool,
    discharge_w: f64,
    ac_load_w: f64,
    ac_voltage: f64,
    charger_state: ChargerState,
    battery_down: bool,
}

impl Site {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(SiteValues {
            soc: 50.0,
            maintenance: false,
            discharge_w: 0.0,
            ac_load_w: 500.0,
            ac_voltage: 230.0,
            charger_state: ChargerState::Connected,
            battery_down: false,
        })))
    }

    fn set(&self, f: impl FnOnce(&mut SiteValues)) {
        f(&mut self.0.lock().unwrap());
    }
}

struct FakeBattery {
    site: Site,
}

#[async_trait]
impl BatteryGateway for FakeBattery {
    async fn state_of_charge(&mut self) -> Result<f64> {
        let values = self.site.0.lock().unwrap();
        if values.battery_down {
            return Err(PhlegonError::telemetry("empty register response for soc"));
        }
        Ok(values.soc)
    }

    async fn maintenance_active(&mut self) -> Result<bool> {
        Ok(self.site.0.lock().unwrap().maintenance)
    }

    async fn discharge(&mut self) -> Result<BatteryDischarge> {
        let watts = self.site.0.lock().unwrap().discharge_w;
        Ok(BatteryDischarge {
            bus_voltage: 57.0,
            current: watts / 57.0,
            watts,
        })
    }
}

/// Register writes observed by the fake charger, in order
#[derive(Debug, Clone, PartialEq, Eq)]
enum WriteOp {
    Mode(u16),
    StartStop(u16),
    Current(u16),
}

/// Device-side register state of the fake charger
#[derive(Clone)]
struct ChargerDevice(Arc<Mutex<ChargerDeviceState>>);

struct ChargerDeviceState {
    mode: u16,
    start_stop: u16,
    current: u16,
    writes: Vec<WriteOp>,
    writes_fail: bool,
}

impl ChargerDevice {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(ChargerDeviceState {
            mode: ChargingMode::Auto.as_register(),
            start_stop: 1,
            current: 0,
            writes: Vec::new(),
            writes_fail: false,
        })))
    }

    fn fail_writes(&self, fail: bool) {
        self.0.lock().unwrap().writes_fail = fail;
    }

    fn writes(&self) -> Vec<WriteOp> {
        self.0.lock().unwrap().writes.clone()
    }

    fn clear_writes(&self) {
        self.0.lock().unwrap().writes.clear();
    }

    fn registers(&self) -> (u16, u16, u16) {
        let state = self.0.lock().unwrap();
        (state.mode, state.start_stop, state.current)
    }
}

struct FakeCharger {
    site: Site,
    device: ChargerDevice,
}

#[async_trait]
impl ChargerGateway for FakeCharger {
    async fn state(&mut self) -> Result<ChargerState> {
        Ok(self.site.0.lock().unwrap().charger_state)
    }

    async fn mode(&mut self) -> Result<ChargingMode> {
        ChargingMode::from_raw(self.device.0.lock().unwrap().mode)
    }

    async fn charge_current(&mut self) -> Result<u16> {
        Ok(self.device.0.lock().unwrap().current)
    }

    async fn set_mode(&mut self, mode: ChargingMode) -> Result<()> {
        let mut state = self.device.0.lock().unwrap();
        if state.writes_fail {
            return Err(PhlegonError::modbus("write failed"));
        }
        state.mode = mode.as_register();
        state.writes.push(WriteOp::Mode(mode.as_register()));
        Ok(())
    }

    async fn set_start_stop(&mut self, value: StartStop) -> Result<()> {
        let mut state = self.device.0.lock().unwrap();
        if state.writes_fail {
            return Err(PhlegonError::modbus("write failed"));
        }
        state.start_stop = value.as_register();
        state.writes.push(WriteOp::StartStop(value.as_register()));
        Ok(())
    }

    async fn set_charge_current(&mut self, amps: u16) -> Result<()> {
        let mut state = self.device.0.lock().unwrap();
        if state.writes_fail {
            return Err(PhlegonError::modbus("write failed"));
        }
        state.current = amps;
        state.writes.push(WriteOp::Current(amps));
        Ok(())
    }
}

struct FakeLoad {
    site: Site,
}

#[async_trait]
impl LoadGateway for FakeLoad {
    async fn ac_load(&mut self) -> Result<f64> {
        Ok(self.site.0.lock().unwrap().ac_load_w)
    }

    async fn ac_voltage(&mut self) -> Result<f64> {
        Ok(self.site.0.lock().unwrap().ac_voltage)
    }
}

fn build_driver(site: &Site, device: &ChargerDevice) -> StripChargeDriver {
    let config = Config::default();
    StripChargeDriver::with_gateways(
        &config,
        Box::new(FakeBattery { site: site.clone() }),
        Box::new(FakeCharger {
            site: site.clone(),
            device: device.clone(),
        }),
        Box::new(FakeLoad { site: site.clone() }),
    )
}

#[tokio::test]
async fn start_scenario_issues_enable_sequence_in_order() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let mut driver = build_driver(&site, &device);

    // charge=15%, min=10%, load=900W, trigger=1000W, plugged in
    site.set(|v| {
        v.soc = 15.0;
        v.maintenance = true;
        v.discharge_w = 1500.0;
        v.ac_load_w = 900.0;
    });

    let interval = driver.poll_cycle().await.unwrap();
    assert_eq!(interval, PollInterval::Fast);
    assert_eq!(driver.engine_state(), EngineState::Charging);

    // mode=manual, current=configured amps, start - in exactly this order
    assert_eq!(
        device.writes(),
        vec![WriteOp::Mode(0), WriteOp::Current(6), WriteOp::StartStop(1)]
    );
}

#[tokio::test]
async fn failsafe_scenario_disables_and_terminates() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let mut driver = build_driver(&site, &device);

    site.set(|v| {
        v.soc = 15.0;
        v.maintenance = true;
        v.discharge_w = 1500.0;
        v.ac_load_w = 900.0;
    });
    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::Charging);
    device.clear_writes();

    // Discharge rate 500 W no longer exceeds the 800 W AC load
    site.set(|v| {
        v.soc = 14.0;
        v.discharge_w = 500.0;
        v.ac_load_w = 800.0;
        v.charger_state = ChargerState::Charging;
    });

    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::Terminated);

    // Disable sequence: stop, auto mode, start
    assert_eq!(
        device.writes(),
        vec![WriteOp::StartStop(0), WriteOp::Mode(1), WriteOp::StartStop(1)]
    );
    // Resting state: auto + start, solar-opportunistic
    assert_eq!(device.registers(), (1, 1, 6));
}

#[tokio::test]
async fn low_charge_scenario_backs_off_on_slow_interval() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let mut driver = build_driver(&site, &device);

    // charge=8%, min=10%: pause regardless of load or plug state
    site.set(|v| {
        v.soc = 8.0;
        v.maintenance = true;
        v.discharge_w = 400.0;
        v.ac_load_w = 200.0;
        v.charger_state = ChargerState::Disconnected;
    });

    let interval = driver.poll_cycle().await.unwrap();
    assert_eq!(interval, PollInterval::Slow);
    assert_eq!(driver.engine_state(), EngineState::MaintenancePausedLowCharge);
    assert!(device.writes().is_empty());
}

#[tokio::test]
async fn telemetry_failure_skips_cycle_without_action() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let mut driver = build_driver(&site, &device);

    site.set(|v| {
        v.maintenance = true;
        v.battery_down = true;
    });

    // Absent readings must never be treated as zero or acted upon
    let interval = driver.poll_cycle().await.unwrap();
    assert_eq!(interval, PollInterval::Fast);
    assert_eq!(driver.engine_state(), EngineState::WaitingForMaintenance);
    assert!(device.writes().is_empty());

    // Once the battery gateway recovers the cycle proceeds normally
    site.set(|v| {
        v.battery_down = false;
        v.soc = 15.0;
        v.discharge_w = 1500.0;
        v.ac_load_w = 900.0;
    });
    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::Charging);
}

#[tokio::test]
async fn maintenance_end_returns_charger_to_auto() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let mut driver = build_driver(&site, &device);

    site.set(|v| {
        v.soc = 40.0;
        v.maintenance = true;
        v.discharge_w = 2000.0;
        v.ac_load_w = 300.0;
    });
    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::Charging);
    device.clear_writes();

    site.set(|v| {
        v.maintenance = false;
        v.charger_state = ChargerState::Charging;
    });
    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::WaitingForMaintenance);
    assert_eq!(
        device.writes(),
        vec![WriteOp::StartStop(0), WriteOp::Mode(1), WriteOp::StartStop(1)]
    );
}

struct InstantClock;

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&mut self, _duration: Duration) {}
}

#[tokio::test]
async fn charger_write_failure_rolls_back_and_retries_next_cycle() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let mut driver = build_driver(&site, &device);

    site.set(|v| {
        v.soc = 15.0;
        v.maintenance = true;
        v.discharge_w = 1500.0;
        v.ac_load_w = 900.0;
    });
    device.fail_writes(true);

    // Enable sequence fails on the device; the cycle is skipped, the loop
    // goes on, and the engine does not believe charging is on
    let interval = driver.poll_cycle().await.unwrap();
    assert_eq!(interval, PollInterval::Fast);
    assert_eq!(driver.engine_state(), EngineState::EvaluatingChargeStart);
    assert!(device.writes().is_empty());

    // The device recovers; the next cycle issues the full enable sequence
    device.fail_writes(false);
    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::Charging);
    assert_eq!(
        device.writes(),
        vec![WriteOp::Mode(0), WriteOp::Current(6), WriteOp::StartStop(1)]
    );
}

#[tokio::test]
async fn failsafe_exit_is_clean_even_when_disable_write_fails() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let mut driver = build_driver(&site, &device);

    site.set(|v| {
        v.soc = 15.0;
        v.maintenance = true;
        v.discharge_w = 1500.0;
        v.ac_load_w = 900.0;
    });
    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::Charging);

    // Discharge shortfall with the charger refusing writes
    site.set(|v| {
        v.discharge_w = 500.0;
        v.ac_load_w = 800.0;
        v.charger_state = ChargerState::Charging;
    });
    device.fail_writes(true);

    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::Terminated);

    // The run loop still ends without an error so the process exits 0
    let mut scheduler = PollScheduler::new(InstantClock);
    assert!(driver.run(&mut scheduler).await.is_ok());
}

#[tokio::test]
async fn outage_during_low_charge_pause_keeps_the_slow_cadence() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let mut driver = build_driver(&site, &device);

    site.set(|v| {
        v.soc = 8.0;
        v.maintenance = true;
    });
    driver.poll_cycle().await.unwrap();
    assert_eq!(driver.engine_state(), EngineState::MaintenancePausedLowCharge);

    // Battery gateway outage while paused: retry after an hour, not five
    // minutes
    site.set(|v| v.battery_down = true);
    let interval = driver.poll_cycle().await.unwrap();
    assert_eq!(interval, PollInterval::Slow);
    assert!(device.writes().is_empty());
}

#[tokio::test]
async fn disable_sequence_is_idempotent() {
    let site = Site::new();
    let device = ChargerDevice::new();
    let controls = ChargerControls::new(6);
    let mut charger = FakeCharger {
        site: site.clone(),
        device: device.clone(),
    };

    controls.disable_charging(&mut charger).await.unwrap();
    let after_once = device.registers();

    controls.disable_charging(&mut charger).await.unwrap();
    let after_twice = device.registers();

    assert_eq!(after_once, after_twice);
    assert_eq!(after_twice.0, ChargingMode::Auto.as_register());
    assert_eq!(after_twice.1, StartStop::Start.as_register());
}
