//! Configuration management for Phlegon
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The register maps default to the documented
//! addresses for the Redflow ZCell BMS, the Victron EV Charging Station and
//! the Cerbo GX, but remain overridable for firmware variations.

use crate::error::{PhlegonError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Battery unit gateway (ZCell BMS) connection and registers
    pub battery: BatteryConfig,

    /// EV charger controller connection and registers
    pub charger: ChargerConfig,

    /// Inverter/load monitor (Cerbo GX) connection and registers
    pub inverter: InverterConfig,

    /// Charging decision thresholds
    pub thresholds: ThresholdsConfig,

    /// Modbus transport tuning shared by all three gateways
    pub modbus: ModbusTuningConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Where the maintenance (strip) flag is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    /// Status-flag register on the BMS (bits 64/128)
    Modbus,
    /// REST status endpoint on the battery gateway
    Rest,
}

/// Battery unit gateway parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// IP address of the Redflow BMS
    pub ip: String,

    /// Modbus TCP port
    pub port: u16,

    /// Modbus unit id of the BMS bank endpoint
    pub unit_id: u8,

    /// Modbus unit id of the individual cell (battery id number)
    pub cell_unit_id: u8,

    /// Index of the unit within the bank SOC array
    pub unit_index: u16,

    /// Source for the maintenance-active flag
    pub status_source: StatusSource,

    /// TCP port of the REST status endpoint
    pub rest_port: u16,

    /// Register addresses
    pub registers: BatteryRegisters,
}

/// Battery register address map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryRegisters {
    /// Bank state-of-charge array, tenths of a percent per unit
    pub soc_bank: u16,

    /// Per-cell status flags (strip bits 64/128)
    pub status_flags: u16,

    /// Per-cell state of charge, hundredths of a percent
    pub soc: u16,

    /// Per-cell current, signed, deci-amps
    pub current: u16,

    /// Per-cell voltage, deci-volts
    pub voltage: u16,

    /// Bus voltage, deci-volts
    pub bus_voltage: u16,

    /// Operating state code (700-series)
    pub state: u16,
}

/// EV charger controller parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargerConfig {
    /// IP address of the EV charger
    pub ip: String,

    /// Modbus TCP port
    pub port: u16,

    /// Modbus unit id
    pub unit_id: u8,

    /// Register addresses
    pub registers: ChargerRegisters,
}

/// Charger register address map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargerRegisters {
    /// Charging mode (0=manual, 1=auto, 2=scheduled)
    pub mode: u16,

    /// Start/stop charging (0=stop, 1=start)
    pub start_stop: u16,

    /// Charger connection state (0-6 enumeration)
    pub state: u16,

    /// Charge current setpoint in amps
    pub charge_current: u16,
}

/// Inverter/load monitor parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterConfig {
    /// IP address of the Cerbo GX
    pub ip: String,

    /// Modbus TCP port
    pub port: u16,

    /// Modbus unit id of the system service (AC loads)
    pub system_unit_id: u8,

    /// Modbus unit id of the vebus service (output voltages)
    pub vebus_unit_id: u8,

    /// Register addresses
    pub registers: InverterRegisters,
}

/// Inverter register address map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterRegisters {
    /// AC load on the first phase, watts
    pub ac_load_l1: u16,

    /// AC load on the second phase, watts (observed, not summed)
    pub ac_load_l2: u16,

    /// AC load on the third phase, watts (observed, not summed)
    pub ac_load_l3: u16,

    /// AC output voltage on the first phase, deci-volts
    pub ac_out_voltage_l1: u16,
}

/// Charging decision thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Minimum battery percentage for EV charging; below this the charger
    /// is turned off
    pub min_discharge_percent: f64,

    /// Maximum AC load in watts before the charger is turned off
    pub ac_load_max_discharge_w: f64,

    /// Minimum AC load in watts; below this mark the charger is turned on
    pub ac_load_min_discharge_w: f64,

    /// Charge current setpoint in amps
    pub charge_current_amps: u16,

    /// Nominal AC voltage, used when the live voltage reading is implausible
    pub nominal_ac_voltage: f64,
}

/// Modbus transport tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusTuningConfig {
    /// Connection timeout in seconds
    pub connect_timeout_secs: f64,

    /// Per-operation timeout in seconds
    pub operation_timeout_secs: f64,

    /// Max attempts before a read/write is treated as failed
    pub max_retries: u32,

    /// Delay between retries in seconds
    pub retry_delay_secs: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.50.109".to_string(),
            port: 502,
            unit_id: 201,
            cell_unit_id: 1,
            unit_index: 0,
            status_source: StatusSource::Modbus,
            rest_port: 3000,
            registers: BatteryRegisters::default(),
        }
    }
}

impl Default for BatteryRegisters {
    fn default() -> Self {
        Self {
            soc_bank: 0x0200,
            status_flags: 0x2051,
            soc: 0x9011,
            current: 0x9014,
            voltage: 0x9013,
            bus_voltage: 0x9018,
            state: 0x9019,
        }
    }
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.50.229".to_string(),
            port: 502,
            unit_id: 1,
            registers: ChargerRegisters::default(),
        }
    }
}

impl Default for ChargerRegisters {
    fn default() -> Self {
        Self {
            mode: 5009,
            start_stop: 5010,
            state: 5015,
            charge_current: 5016,
        }
    }
}

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.50.206".to_string(),
            port: 502,
            system_unit_id: 100,
            vebus_unit_id: 227,
            registers: InverterRegisters::default(),
        }
    }
}

impl Default for InverterRegisters {
    fn default() -> Self {
        Self {
            ac_load_l1: 817,
            ac_load_l2: 818,
            ac_load_l3: 819,
            ac_out_voltage_l1: 15,
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            min_discharge_percent: 10.0,
            ac_load_max_discharge_w: 2500.0,
            ac_load_min_discharge_w: 1000.0,
            charge_current_amps: 6,
            nominal_ac_voltage: 230.0,
        }
    }
}

impl Default for ModbusTuningConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5.0,
            operation_timeout_secs: 2.0,
            max_retries: 3,
            retry_delay_secs: 0.5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/phlegon.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            battery: BatteryConfig::default(),
            charger: ChargerConfig::default(),
            inverter: InverterConfig::default(),
            thresholds: ThresholdsConfig::default(),
            modbus: ModbusTuningConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("PHLEGON_CONFIG") {
            return Self::from_file(path);
        }

        let default_paths = [
            "phlegon_config.yaml",
            "/data/phlegon_config.yaml",
            "/etc/phlegon/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (field, ip) in [
            ("battery.ip", &self.battery.ip),
            ("charger.ip", &self.charger.ip),
            ("inverter.ip", &self.inverter.ip),
        ] {
            if ip.is_empty() {
                return Err(PhlegonError::validation(
                    field,
                    "IP address cannot be empty",
                ));
            }
        }

        for (field, port) in [
            ("battery.port", self.battery.port),
            ("charger.port", self.charger.port),
            ("inverter.port", self.inverter.port),
        ] {
            if port == 0 {
                return Err(PhlegonError::validation(
                    field,
                    "Port must be greater than 0",
                ));
            }
        }

        if !(0.0..=100.0).contains(&self.thresholds.min_discharge_percent) {
            return Err(PhlegonError::validation(
                "thresholds.min_discharge_percent",
                "Must be within 0-100",
            ));
        }

        if self.thresholds.ac_load_min_discharge_w > self.thresholds.ac_load_max_discharge_w {
            return Err(PhlegonError::validation(
                "thresholds.ac_load_min_discharge_w",
                "Must not exceed ac_load_max_discharge_w",
            ));
        }

        if self.thresholds.charge_current_amps == 0 {
            return Err(PhlegonError::validation(
                "thresholds.charge_current_amps",
                "Must be positive",
            ));
        }

        if self.thresholds.nominal_ac_voltage <= 0.0 {
            return Err(PhlegonError::validation(
                "thresholds.nominal_ac_voltage",
                "Must be positive",
            ));
        }

        if self.modbus.max_retries == 0 {
            return Err(PhlegonError::validation(
                "modbus.max_retries",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.battery.port, 502);
        assert_eq!(config.battery.unit_id, 201);
        assert_eq!(config.battery.registers.soc_bank, 0x0200);
        assert_eq!(config.charger.registers.mode, 5009);
        assert_eq!(config.inverter.registers.ac_load_l1, 817);
        assert_eq!(config.thresholds.charge_current_amps, 6);
        assert_eq!(config.battery.status_source, StatusSource::Modbus);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        // Test invalid IP
        config.battery.ip = String::new();
        assert!(config.validate().is_err());

        // Reset and test invalid port
        config = Config::default();
        config.charger.port = 0;
        assert!(config.validate().is_err());

        // Inverted load thresholds
        config = Config::default();
        config.thresholds.ac_load_min_discharge_w = 3000.0;
        assert!(config.validate().is_err());

        // Out-of-range discharge floor
        config = Config::default();
        config.thresholds.min_discharge_percent = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.battery.port, deserialized.battery.port);
        assert_eq!(
            config.thresholds.min_discharge_percent,
            deserialized.thresholds.min_discharge_percent
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "battery:\n  ip: 10.0.0.9\nthresholds:\n  charge_current_amps: 10\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.battery.ip, "10.0.0.9");
        assert_eq!(config.battery.port, 502);
        assert_eq!(config.thresholds.charge_current_amps, 10);
        assert_eq!(config.thresholds.min_discharge_percent, 10.0);
    }
}
