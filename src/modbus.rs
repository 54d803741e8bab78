//! Modbus TCP client shared by the three device gateways
//!
//! This module provides async Modbus TCP communication with the battery BMS,
//! the EV charger and the Cerbo GX, with proper error handling and a
//! connect/use/disconnect lifecycle per exchange. Raw register words are
//! decoded here (signed reinterpretation, fixed-point scaling) so gateways
//! only deal in engineering units.

use crate::config::ModbusTuningConfig;
use crate::error::{PhlegonError, Result};
use crate::logging::get_logger;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;

/// TCP endpoint of one physical device
#[derive(Debug, Clone)]
pub struct ModbusEndpoint {
    /// IP address of the device
    pub ip: String,

    /// TCP port (typically 502)
    pub port: u16,
}

impl ModbusEndpoint {
    pub fn new(ip: &str, port: u16) -> Self {
        Self {
            ip: ip.to_string(),
            port,
        }
    }
}

/// Modbus TCP client for one device
pub struct ModbusClient {
    /// Modbus TCP client connection
    client: Option<tokio_modbus::client::Context>,

    /// Device endpoint
    endpoint: ModbusEndpoint,

    /// Connection timeout
    connection_timeout: Duration,

    /// Operation timeout
    operation_timeout: Duration,

    /// Logger
    logger: crate::logging::StructuredLogger,
}

impl ModbusClient {
    /// Create a new Modbus client
    pub fn new(endpoint: ModbusEndpoint, tuning: &ModbusTuningConfig) -> Self {
        let logger = get_logger("modbus");
        Self {
            client: None,
            endpoint,
            connection_timeout: Duration::from_secs_f64(tuning.connect_timeout_secs),
            operation_timeout: Duration::from_secs_f64(tuning.operation_timeout_secs),
            logger,
        }
    }

    /// Connect to the Modbus server
    pub async fn connect(&mut self) -> Result<()> {
        let address = format!("{}:{}", self.endpoint.ip, self.endpoint.port);

        self.logger
            .debug(&format!("Connecting to Modbus server at {}", address));

        let socket_addr: std::net::SocketAddr = address
            .parse()
            .map_err(|e| PhlegonError::modbus(format!("Invalid socket address: {}", e)))?;

        match timeout(self.connection_timeout, tcp::connect(socket_addr)).await {
            Ok(Ok(client)) => {
                self.client = Some(client);
                Ok(())
            }
            Ok(Err(e)) => {
                let error_msg = format!("Failed to connect to {}: {}", address, e);
                self.logger.error(&error_msg);
                Err(PhlegonError::modbus(error_msg))
            }
            Err(_) => {
                let error_msg = format!("Connection timeout for {}", address);
                self.logger.error(&error_msg);
                Err(PhlegonError::timeout(error_msg))
            }
        }
    }

    /// Disconnect from the Modbus server
    pub async fn disconnect(&mut self) {
        // The client is dropped, which closes the TCP connection
        self.client.take();
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Read holding registers from the given unit
    pub async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        let timeout_duration = self.operation_timeout;

        // Log before borrowing client
        self.logger.trace(&format!(
            "Reading {} registers from address {} on unit {}",
            count, address, unit_id
        ));

        let client = self.get_client()?;
        client.set_slave(Slave(unit_id));
        let request = client.read_holding_registers(address, count);

        match timeout(timeout_duration, request).await {
            Ok(Ok(Ok(response))) => {
                self.logger.trace(&format!(
                    "Read {} registers: {:?}",
                    response.len(),
                    response
                ));
                Ok(response)
            }
            Ok(Ok(Err(exception))) => {
                let error_msg = format!("Modbus exception response on read: {}", exception);
                self.logger.error(&error_msg);
                Err(PhlegonError::modbus(error_msg))
            }
            Ok(Err(e)) => {
                let error_msg = format!("Failed to read holding registers: {}", e);
                self.logger.error(&error_msg);
                Err(PhlegonError::modbus(error_msg))
            }
            Err(_) => {
                let error_msg = "Read operation timeout".to_string();
                self.logger.error(&error_msg);
                Err(PhlegonError::timeout(error_msg))
            }
        }
    }

    /// Write a single register on the given unit
    pub async fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<()> {
        let timeout_duration = self.operation_timeout;

        // Log before borrowing client
        self.logger.debug(&format!(
            "Writing value {} to register {} on unit {}",
            value, address, unit_id
        ));

        let client = self.get_client()?;
        client.set_slave(Slave(unit_id));
        let request = client.write_single_register(address, value);

        match timeout(timeout_duration, request).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(exception))) => {
                let error_msg = format!("Modbus exception response on write: {}", exception);
                self.logger.error(&error_msg);
                Err(PhlegonError::modbus(error_msg))
            }
            Ok(Err(e)) => {
                let error_msg = format!("Failed to write single register: {}", e);
                self.logger.error(&error_msg);
                Err(PhlegonError::modbus(error_msg))
            }
            Err(_) => {
                let error_msg = "Write operation timeout".to_string();
                self.logger.error(&error_msg);
                Err(PhlegonError::timeout(error_msg))
            }
        }
    }

    /// Get client reference or error if not connected
    fn get_client(&mut self) -> Result<&mut tokio_modbus::client::Context> {
        self.client
            .as_mut()
            .ok_or_else(|| PhlegonError::modbus("Not connected to Modbus server"))
    }
}

/// Connection manager enforcing the open/use/close lifecycle per exchange,
/// with bounded retry before a read or write is treated as failed
pub struct ModbusConnectionManager {
    client: ModbusClient,
    max_retry_attempts: u32,
    retry_delay: Duration,
    logger: crate::logging::StructuredLogger,
}

impl ModbusConnectionManager {
    /// Create a new connection manager
    pub fn new(endpoint: ModbusEndpoint, tuning: &ModbusTuningConfig) -> Self {
        let logger = get_logger("modbus_manager");
        Self {
            client: ModbusClient::new(endpoint, tuning),
            max_retry_attempts: tuning.max_retries,
            retry_delay: Duration::from_secs_f64(tuning.retry_delay_secs),
            logger,
        }
    }

    /// Read holding registers within a fresh connection, retrying transient
    /// failures up to the configured attempt limit
    pub async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        let mut attempts = 0u32;
        loop {
            let result = self.one_read_exchange(unit_id, address, count).await;
            match result {
                Ok(regs) => return Ok(regs),
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.max_retry_attempts {
                        return Err(e);
                    }
                    self.logger
                        .warn(&format!("Read attempt {} failed: {}", attempts, e));
                    sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Write a single register within a fresh connection, retrying transient
    /// failures up to the configured attempt limit
    pub async fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            let result = self.one_write_exchange(unit_id, address, value).await;
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.max_retry_attempts {
                        return Err(e);
                    }
                    self.logger
                        .warn(&format!("Write attempt {} failed: {}", attempts, e));
                    sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Read one word from each of several registers within a single fresh
    /// connection, retrying the whole exchange on failure. Returns the words
    /// in the order of `addresses`.
    pub async fn read_registers_each(
        &mut self,
        unit_id: u8,
        addresses: &[u16],
    ) -> Result<Vec<u16>> {
        let mut attempts = 0u32;
        loop {
            let result = self.one_multi_read_exchange(unit_id, addresses).await;
            match result {
                Ok(words) => return Ok(words),
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.max_retry_attempts {
                        return Err(e);
                    }
                    self.logger
                        .warn(&format!("Read attempt {} failed: {}", attempts, e));
                    sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn one_read_exchange(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.client.connect().await?;
        let result = self
            .client
            .read_holding_registers(unit_id, address, count)
            .await;
        self.client.disconnect().await;
        result
    }

    async fn one_multi_read_exchange(
        &mut self,
        unit_id: u8,
        addresses: &[u16],
    ) -> Result<Vec<u16>> {
        self.client.connect().await?;
        let mut words = Vec::with_capacity(addresses.len());
        let mut result = Ok(());
        for &address in addresses {
            match self.client.read_holding_registers(unit_id, address, 1).await {
                Ok(regs) => match first_word(&regs, "register") {
                    Ok(word) => words.push(word),
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                },
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.client.disconnect().await;
        result.map(|()| words)
    }

    async fn one_write_exchange(&mut self, unit_id: u8, address: u16, value: u16) -> Result<()> {
        self.client.connect().await?;
        let result = self
            .client
            .write_single_register(unit_id, address, value)
            .await;
        self.client.disconnect().await;
        result
    }
}

/// Utility functions for data conversion

/// Reinterpret an unsigned 16-bit register word as a signed two's-complement
/// value
pub fn decode_signed_word(value: u16) -> i32 {
    let value = i32::from(value);
    if value > 32767 { value - 65536 } else { value }
}

/// First word of a register response, or a telemetry-unavailable error for a
/// zero-length response. An absent reading must never become a numeric zero.
pub fn first_word(registers: &[u16], what: &str) -> Result<u16> {
    registers
        .first()
        .copied()
        .ok_or_else(|| PhlegonError::telemetry(format!("empty register response for {}", what)))
}

/// Word at `index` of a register response, with the same empty-read policy
pub fn word_at(registers: &[u16], index: usize, what: &str) -> Result<u16> {
    registers.get(index).copied().ok_or_else(|| {
        PhlegonError::telemetry(format!(
            "register response for {} has no element {}",
            what, index
        ))
    })
}

/// Scale a raw register word reported in tenths
pub fn scale_tenths(raw: u16) -> f64 {
    f64::from(raw) / 10.0
}

/// Scale a raw register word reported in hundredths
pub fn scale_hundredths(raw: u16) -> f64 {
    f64::from(raw) / 100.0
}

/// Scale a signed raw register word reported in tenths
pub fn scale_signed_tenths(raw: u16) -> f64 {
    f64::from(decode_signed_word(raw)) / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_signed_word() {
        assert_eq!(decode_signed_word(0), 0);
        assert_eq!(decode_signed_word(1), 1);
        assert_eq!(decode_signed_word(32767), 32767);
        assert_eq!(decode_signed_word(32768), -32768);
        assert_eq!(decode_signed_word(65535), -1);
        assert_eq!(decode_signed_word(65386), -150);
    }

    #[test]
    fn test_decode_signed_word_exhaustive_rule() {
        // For all v: v > 32767 decodes to v - 65536, otherwise v
        for v in (0u32..=65535).step_by(17) {
            let v = v as u16;
            let decoded = decode_signed_word(v);
            if v > 32767 {
                assert_eq!(decoded, i32::from(v) - 65536);
            } else {
                assert_eq!(decoded, i32::from(v));
            }
        }
    }

    #[tokio::test]
    async fn test_read_requires_connection() {
        let tuning = ModbusTuningConfig::default();
        let mut client = ModbusClient::new(ModbusEndpoint::new("127.0.0.1", 502), &tuning);
        let err = client.read_holding_registers(1, 0x9018, 1).await.unwrap_err();
        assert!(matches!(err, PhlegonError::Modbus { .. }));
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let tuning = ModbusTuningConfig::default();
        let mut client = ModbusClient::new(ModbusEndpoint::new("127.0.0.1", 502), &tuning);
        let err = client.write_single_register(1, 5010, 1).await.unwrap_err();
        assert!(matches!(err, PhlegonError::Modbus { .. }));
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error() {
        // Nothing listens on the discard port locally
        let tuning = ModbusTuningConfig {
            connect_timeout_secs: 1.0,
            ..ModbusTuningConfig::default()
        };
        let mut client = ModbusClient::new(ModbusEndpoint::new("127.0.0.1", 9), &tuning);
        assert!(client.connect().await.is_err());
        assert!(!client.is_connected());
    }

    #[test]
    fn test_first_word_rejects_empty() {
        let err = first_word(&[], "soc").unwrap_err();
        assert!(matches!(err, PhlegonError::Telemetry { .. }));
        assert_eq!(first_word(&[42], "soc").unwrap(), 42);
    }

    #[test]
    fn test_word_at_rejects_missing_index() {
        assert_eq!(word_at(&[1, 2, 3], 2, "soc").unwrap(), 3);
        let err = word_at(&[1, 2, 3], 3, "soc").unwrap_err();
        assert!(matches!(err, PhlegonError::Telemetry { .. }));
    }

    #[test]
    fn test_scaling() {
        // Raw SOC 150 from the tenths-scaled bank register is 15.0 percent
        assert!((scale_tenths(150) - 15.0).abs() < f64::EPSILON);
        assert!((scale_hundredths(1500) - 15.0).abs() < f64::EPSILON);
        // Negative current in deci-amps
        assert!((scale_signed_tenths(65413) - (-12.3)).abs() < 1e-9);
    }
}
