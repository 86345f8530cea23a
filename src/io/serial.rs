//! Serial transport over the `serialport` crate.
//!
//! Covers native COM ports, USB-to-UART bridges and RFCOMM ttys. Discovery
//! filters USB devices to the known UART bridge vendors so unrelated ports
//! are not probed.

use std::io::Read;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::io::{ByteTransport, DataSubscriber, Subscribers, TransportHandle, TransportSystem};
use crate::types::SensorDesc;
use crate::util::ThreadFence;

pub const KEY: &str = "serial";

pub const DEFAULT_BAUD_RATE: u32 = 921_600;

const SUPPORTED_BAUD_RATES: [u32; 8] = [
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600,
];

/// USB vendor ids of the UART bridges the sensors ship with
/// (Silicon Labs CP210x, FTDI).
const KNOWN_UART_VENDORS: [u16; 2] = [0x10C4, 0x0403];

/// Cap on a single blocking read; bounds reader shutdown latency.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

const READ_BUFFER_SIZE: usize = 4096;

pub struct SerialSystem;

impl SerialSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SerialSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportSystem for SerialSystem {
    fn key(&self) -> &'static str {
        KEY
    }

    fn discover(&self) -> Result<Vec<SensorDesc>> {
        let ports = serialport::available_ports().map_err(|e| TransportError::OpenFailed {
            target: "serial enumeration".to_string(),
            source: e.into(),
        })?;

        let mut found = Vec::new();
        for port in ports {
            match port.port_type {
                SerialPortType::UsbPort(usb) if KNOWN_UART_VENDORS.contains(&usb.vid) => {
                    debug!(port = %port.port_name, vid = usb.vid, "discovered usb uart");
                    found.push(SensorDesc {
                        name: usb.product.unwrap_or_else(|| port.port_name.clone()),
                        serial_number: usb.serial_number.unwrap_or_default(),
                        io_type: KEY.to_string(),
                        identifier: port.port_name,
                        baud_rate: DEFAULT_BAUD_RATE,
                    });
                }
                // RFCOMM-bound classic Bluetooth devices show up as plain
                // ttys with a recognizable name.
                _ if port.port_name.contains("rfcomm") => {
                    found.push(SensorDesc {
                        name: port.port_name.clone(),
                        serial_number: String::new(),
                        io_type: KEY.to_string(),
                        identifier: port.port_name,
                        baud_rate: 115_200,
                    });
                }
                _ => {}
            }
        }
        Ok(found)
    }

    fn obtain(&self, desc: &SensorDesc, subscribers: &Subscribers) -> Result<TransportHandle> {
        let transport = SerialTransport::open(desc, subscribers.data.clone())?;
        Ok(TransportHandle::Bytes(Box::new(transport)))
    }
}

pub struct SerialTransport {
    identifier: String,
    /// Writer half; the reader thread owns its own clone of the handle.
    port: Box<dyn SerialPort>,
    baud_rate: u32,
    fence: Arc<ThreadFence>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    pub fn open(desc: &SensorDesc, subscriber: Arc<dyn DataSubscriber>) -> Result<Self> {
        let baud_rate = if desc.baud_rate > 0 {
            desc.baud_rate
        } else {
            DEFAULT_BAUD_RATE
        };

        let port = serialport::new(&desc.identifier, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                target: desc.identifier.clone(),
                source: e.into(),
            })?;

        let reader_port = port.try_clone().map_err(|e| TransportError::OpenFailed {
            target: desc.identifier.clone(),
            source: e.into(),
        })?;

        let fence = Arc::new(ThreadFence::new());
        let reader = {
            let fence = fence.clone();
            let identifier = desc.identifier.clone();
            std::thread::spawn(move || read_loop(reader_port, subscriber, fence, identifier))
        };

        info!(port = %desc.identifier, baud_rate, "opened serial transport");
        Ok(Self {
            identifier: desc.identifier.clone(),
            port,
            baud_rate,
            fence,
            reader: Some(reader),
        })
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    subscriber: Arc<dyn DataSubscriber>,
    fence: Arc<ThreadFence>,
    identifier: String,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        if fence.terminated() {
            break;
        }
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => subscriber.process_data(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if !fence.terminated() {
                    error!(port = %identifier, error = %e, "serial read failed");
                    subscriber.link_down(TransportError::ReadFailed(e));
                }
                break;
            }
        }
    }
    debug!(port = %identifier, "serial reader stopped");
}

impl ByteTransport for SerialTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        use std::io::Write;
        self.port
            .write_all(data)
            .map_err(TransportError::WriteFailed)?;
        Ok(())
    }

    fn baud_rate(&self) -> Result<u32> {
        Ok(self.baud_rate)
    }

    fn set_baud_rate(&mut self, rate: u32) -> Result<()> {
        if !SUPPORTED_BAUD_RATES.contains(&rate) {
            return Err(TransportError::BaudrateUnsupported(rate).into());
        }
        self.port
            .set_baud_rate(rate)
            .map_err(|e| TransportError::WriteFailed(e.into()))?;
        self.baud_rate = rate;
        Ok(())
    }

    fn supported_baud_rates(&self) -> Vec<u32> {
        SUPPORTED_BAUD_RATES.to_vec()
    }

    fn io_type(&self) -> &'static str {
        KEY
    }

    fn matches(&self, desc: &SensorDesc) -> bool {
        desc.io_type == KEY && desc.identifier == self.identifier
    }

    fn close(&mut self) -> Result<()> {
        self.fence.terminate();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
