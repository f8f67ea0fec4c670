//! Modbus-RTU serial transport
//!
//! Frames FC03 (read holding registers) and FC06 (write single register)
//! requests over the drive's RS-232 service port, with the standard
//! little-endian CRC16 trailer. One request is in flight at a time; the
//! response timeout is the only timeout in the system.

use std::time::Duration;

use async_trait::async_trait;
use errors::{DriveError, DriveResult};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace, warn};

use crate::link::RegisterLink;

const FC_READ_HOLDING: u8 = 0x03;
const FC_WRITE_SINGLE: u8 = 0x06;

/// Serial port settings for the drive's service port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity: "none", "even" or "odd"
    pub parity: String,
    /// Response timeout in milliseconds
    pub timeout_ms: u64,
    /// Modbus slave address of the drive
    pub slave_id: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 57600,
            data_bits: 8,
            stop_bits: 1,
            parity: "none".to_string(),
            timeout_ms: 500,
            slave_id: 1,
        }
    }
}

/// Calculate CRC16 for Modbus RTU (polynomial 0xA001)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Frame a PDU for transmission: slave address + PDU + little-endian CRC.
fn frame(slave_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pdu.len() + 3);
    bytes.push(slave_id);
    bytes.extend_from_slice(pdu);
    let crc = crc16(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes
}

/// Verify the CRC trailer of a received frame.
fn check_crc(frame: &[u8]) -> DriveResult<()> {
    let split = frame.len() - 2;
    let received = u16::from_le_bytes([frame[split], frame[split + 1]]);
    let computed = crc16(&frame[..split]);
    if received != computed {
        return Err(DriveError::device(format!(
            "CRC mismatch: got 0x{received:04X}, computed 0x{computed:04X}"
        )));
    }
    Ok(())
}

/// Modbus-RTU register link over a serial port.
pub struct RtuLink {
    config: SerialConfig,
    port: Mutex<SerialStream>,
}

impl RtuLink {
    /// Open the configured serial port.
    pub fn open(config: SerialConfig) -> DriveResult<Self> {
        let data_bits = match config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let stop_bits = match config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };
        let parity = match config.parity.as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let builder = tokio_serial::new(config.device.as_str(), config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(Duration::from_millis(config.timeout_ms));

        let port = builder.open_native_async().map_err(|e| {
            DriveError::device(format!("failed to open {}: {e}", config.device))
        })?;
        debug!("serial port opened: {} @ {}", config.device, config.baud_rate);

        Ok(Self {
            port: Mutex::new(port),
            config,
        })
    }

    /// Probe the drive with a single register read to confirm it responds.
    pub async fn probe(&self, address: u16) -> DriveResult<()> {
        self.read_register(address).await.map(|_| ())
    }

    /// Send one request frame and collect the complete response frame.
    async fn transact(&self, pdu: &[u8]) -> DriveResult<Vec<u8>> {
        let request = frame(self.config.slave_id, pdu);
        let mut port = self.port.lock().await;

        trace!("TX {:02X?}", request);
        port.write_all(&request)
            .await
            .map_err(|e| DriveError::device(format!("serial write failed: {e}")))?;

        let response = timeout(
            Duration::from_millis(self.config.timeout_ms),
            read_response(&mut port),
        )
        .await
        .map_err(|_| DriveError::Timeout(self.config.device.clone()))??;
        trace!("RX {:02X?}", response);

        check_crc(&response)?;
        if response[0] != self.config.slave_id {
            return Err(DriveError::device(format!(
                "unexpected slave address {} in response",
                response[0]
            )));
        }
        let function_code = response[1];
        if function_code & 0x80 != 0 {
            return Err(DriveError::device(format!(
                "exception response: function 0x{:02X}, code {}",
                function_code & 0x7F,
                response[2]
            )));
        }
        Ok(response)
    }
}

/// Read one response frame, sized by its function code.
async fn read_response(port: &mut SerialStream) -> DriveResult<Vec<u8>> {
    let mut header = [0u8; 2];
    port.read_exact(&mut header)
        .await
        .map_err(|e| DriveError::device(format!("serial read failed: {e}")))?;

    let function_code = header[1];
    let remaining = if function_code & 0x80 != 0 {
        3 // exception code + CRC
    } else {
        match function_code {
            FC_READ_HOLDING => {
                let mut count = [0u8; 1];
                port.read_exact(&mut count)
                    .await
                    .map_err(|e| DriveError::device(format!("serial read failed: {e}")))?;
                let mut body = vec![0u8; count[0] as usize + 2];
                port.read_exact(&mut body)
                    .await
                    .map_err(|e| DriveError::device(format!("serial read failed: {e}")))?;
                let mut response = header.to_vec();
                response.push(count[0]);
                response.extend_from_slice(&body);
                return Ok(response);
            },
            FC_WRITE_SINGLE => 6, // address + value + CRC
            other => {
                return Err(DriveError::device(format!(
                    "unexpected function code 0x{other:02X} in response"
                )))
            },
        }
    };

    let mut body = vec![0u8; remaining];
    port.read_exact(&mut body)
        .await
        .map_err(|e| DriveError::device(format!("serial read failed: {e}")))?;
    let mut response = header.to_vec();
    response.extend_from_slice(&body);
    Ok(response)
}

#[async_trait]
impl RegisterLink for RtuLink {
    async fn read_register(&self, address: u16) -> DriveResult<u16> {
        let values = self.read_registers(address, 1).await?;
        values
            .first()
            .copied()
            .ok_or_else(|| DriveError::device("empty read response".to_string()))
    }

    async fn read_registers(&self, address: u16, count: u16) -> DriveResult<Vec<u16>> {
        let mut pdu = vec![FC_READ_HOLDING];
        pdu.extend_from_slice(&address.to_be_bytes());
        pdu.extend_from_slice(&count.to_be_bytes());

        let response = self.transact(&pdu).await?;
        let byte_count = response[2] as usize;
        let data = &response[3..response.len() - 2];
        if byte_count != 2 * count as usize {
            warn!(
                "byte count mismatch: expected {} bytes for {} registers, got {}",
                2 * count,
                count,
                byte_count
            );
        }

        // Parse the complete register pairs that actually arrived
        let mut values = Vec::with_capacity(count as usize);
        for pair in data.chunks_exact(2) {
            values.push(u16::from_be_bytes([pair[0], pair[1]]));
        }
        Ok(values)
    }

    async fn write_register(&self, address: u16, value: u16) -> DriveResult<()> {
        let mut pdu = vec![FC_WRITE_SINGLE];
        pdu.extend_from_slice(&address.to_be_bytes());
        pdu.extend_from_slice(&value.to_be_bytes());

        let response = self.transact(&pdu).await?;
        let echo_address = u16::from_be_bytes([response[2], response[3]]);
        let echo_value = u16::from_be_bytes([response[4], response[5]]);
        if echo_address != address || echo_value != value {
            return Err(DriveError::device(format!(
                "write echo mismatch: sent 0x{address:04X}=0x{value:04X}, \
                 got 0x{echo_address:04X}=0x{echo_value:04X}"
            )));
        }
        Ok(())
    }
}
