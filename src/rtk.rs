//! RTCM3 correction sources.
//!
//! A source reads a raw RTCM3 byte stream from a network or serial
//! endpoint, frames complete messages (0xD3 preamble, 10-bit length,
//! CRC-24Q) and hands each whole frame to a callback. The GNSS component
//! wires the callback to an ack-expected correction write.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crc::{Crc, CRC_24_LTE_A};
use tracing::{debug, error};

use crate::error::{Result, TransportError};
use crate::util::ThreadFence;

pub(crate) const RTCM3_PREAMBLE: u8 = 0xD3;

/// CRC-24Q as used by RTCM3 (poly 0x864CFB, zero init).
const RTCM3_CRC: Crc<u32> = Crc::<u32>::new(&CRC_24_LTE_A);

const READ_TIMEOUT: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where to pull corrections from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtkSourceConfig {
    /// NTRIP-style raw TCP stream.
    Network { host: String, port: u16 },
    /// Local receiver on a serial port.
    Serial { port: String, baud_rate: u32 },
}

/// Called with `(message_type, frame_bytes)` for every framed message.
/// The frame includes header and CRC, ready to forward verbatim.
pub type FrameCallback = Box<dyn Fn(u16, &[u8]) + Send>;

enum ParseError {
    IncompleteData,
    InvalidFrame,
}

fn parse_rtcm3(input: &[u8]) -> std::result::Result<(u16, usize), ParseError> {
    if input.len() < 3 {
        return Err(ParseError::IncompleteData);
    }
    if input[0] != RTCM3_PREAMBLE {
        return Err(ParseError::InvalidFrame);
    }

    let payload_len = (((input[1] & 0x03) as usize) << 8) | input[2] as usize;
    let total = 3 + payload_len + 3;
    if input.len() < total {
        return Err(ParseError::IncompleteData);
    }

    let crc_offset = total - 3;
    let received = ((input[crc_offset] as u32) << 16)
        | ((input[crc_offset + 1] as u32) << 8)
        | input[crc_offset + 2] as u32;
    if RTCM3_CRC.checksum(&input[..crc_offset]) != received {
        return Err(ParseError::InvalidFrame);
    }

    if payload_len < 2 {
        return Err(ParseError::InvalidFrame);
    }
    let message_type = ((input[3] as u16) << 4) | ((input[4] as u16) >> 4);
    Ok((message_type, total))
}

/// Streaming framer; feed arbitrary chunks, resynchronizes on garbage.
pub(crate) struct Rtcm3Parser {
    buf: Vec<u8>,
}

impl Rtcm3Parser {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn consume(&mut self, input: &[u8]) -> Option<(u16, Vec<u8>)> {
        self.buf.extend_from_slice(input);
        loop {
            match parse_rtcm3(&self.buf) {
                Ok((message_type, total)) => {
                    let frame: Vec<u8> = self.buf.drain(0..total).collect();
                    return Some((message_type, frame));
                }
                Err(ParseError::IncompleteData) => return None,
                Err(ParseError::InvalidFrame) => {
                    debug!("skipping byte while searching for rtcm3 preamble");
                    if self.buf.is_empty() {
                        return None;
                    }
                    self.buf.drain(0..1);
                }
            }
        }
    }
}

/// A running correction reader. Stopping joins the reader thread.
pub(crate) struct RtcmSource {
    fence: Arc<ThreadFence>,
    reader: Option<JoinHandle<()>>,
}

impl RtcmSource {
    pub fn start_network(host: &str, port: u16, callback: FrameCallback) -> Result<Self> {
        let target = format!("{host}:{port}");
        let open_failed = |source: std::io::Error| TransportError::OpenFailed {
            target: target.clone(),
            source,
        };

        let addr = target
            .to_socket_addrs()
            .map_err(open_failed)?
            .next()
            .ok_or_else(|| {
                open_failed(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "endpoint did not resolve",
                ))
            })?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(open_failed)?;
        stream.set_read_timeout(Some(READ_TIMEOUT)).map_err(open_failed)?;

        Ok(Self::spawn(move |buf| stream_read(&stream, buf), callback))
    }

    pub fn start_serial(port: &str, baud_rate: u32, callback: FrameCallback) -> Result<Self> {
        let mut serial = serialport::new(port, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                target: port.to_string(),
                source: e.into(),
            })?;

        Ok(Self::spawn(move |buf| serial.read(buf), callback))
    }

    fn spawn(
        mut read: impl FnMut(&mut [u8]) -> std::io::Result<usize> + Send + 'static,
        callback: FrameCallback,
    ) -> Self {
        let fence = Arc::new(ThreadFence::new());
        let reader = {
            let fence = fence.clone();
            std::thread::spawn(move || {
                let mut parser = Rtcm3Parser::new();
                let mut buf = [0u8; 2048];
                loop {
                    if fence.terminated() {
                        break;
                    }
                    match read(&mut buf) {
                        Ok(0) => continue,
                        Ok(n) => {
                            let mut chunk: &[u8] = &buf[..n];
                            while let Some((message_type, frame)) = parser.consume(chunk) {
                                callback(message_type, &frame);
                                chunk = &[];
                            }
                        }
                        Err(e)
                            if e.kind() == std::io::ErrorKind::TimedOut
                                || e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::Interrupted =>
                        {
                            continue
                        }
                        Err(e) => {
                            if !fence.terminated() {
                                error!(error = %e, "rtk correction source failed");
                            }
                            break;
                        }
                    }
                }
                debug!("rtk correction reader stopped");
            })
        };
        Self {
            fence,
            reader: Some(reader),
        }
    }

    pub fn stop(mut self) {
        self.fence.terminate();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RtcmSource {
    fn drop(&mut self) {
        self.fence.terminate();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

fn stream_read(mut stream: &TcpStream, buf: &mut [u8]) -> std::io::Result<usize> {
    match stream.read(buf) {
        // a closed publisher ends the reader
        Ok(0) => Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "correction stream closed",
        )),
        other => other,
    }
}

/// Builds a complete RTCM3 frame around `payload`.
#[cfg(test)]
pub(crate) fn build_rtcm3_frame(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= 1023);
    let mut frame = Vec::with_capacity(payload.len() + 6);
    frame.push(RTCM3_PREAMBLE);
    frame.push(((payload.len() >> 8) & 0x03) as u8);
    frame.push((payload.len() & 0xFF) as u8);
    frame.extend_from_slice(payload);
    let crc = RTCM3_CRC.checksum(&frame);
    frame.push((crc >> 16) as u8);
    frame.push((crc >> 8) as u8);
    frame.push(crc as u8);
    frame
}
