//! Frame model and the v0/v1 codecs.
//!
//! v0 on the wire: `[SYNC][ADDR][FN:u8][LEN:u8][payload][CKSUM:u16]`
//! v1 on the wire: `[SYNC][ADDR][COMPONENT][FN:u16][LEN:u16][payload][CKSUM:u16]`
//!
//! The checksum is the wrapping unsigned 16-bit sum of every byte from ADDR
//! through the last payload byte. All multi-byte fields are little-endian.

use binrw::{binrw, BinRead, BinWrite};
use std::io::Cursor;

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{ProtocolVersion, DEFAULT_ADDRESS};

/// A decoded wire frame, version agnostic.
///
/// For v0 frames the component is always 0 and the function fits in a byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub component: u8,
    pub function: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(component: u8, function: u16, payload: Vec<u8>) -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            component,
            function,
            payload,
        }
    }

    /// Serializes for the given protocol version.
    pub fn encode(&self, version: ProtocolVersion) -> Result<Vec<u8>> {
        match version {
            ProtocolVersion::V0 => {
                if self.function > u8::MAX as u16 {
                    return Err(ProtocolError::UnsupportedFunction(self.function).into());
                }
                if self.payload.len() > u8::MAX as usize {
                    return Err(Error::InvalidArgument("payload exceeds the v0 length field"));
                }
                let raw = RawFrameV0 {
                    address: self.address,
                    function: self.function as u8,
                    payload: self.payload.clone(),
                    checksum: checksum_v0(self.address, self.function as u8, &self.payload),
                };
                let mut cursor = Cursor::new(Vec::new());
                raw.write_le(&mut cursor)
                    .map_err(|_| ProtocolError::MessageCorrupt("frame serialization failed"))?;
                Ok(cursor.into_inner())
            }
            ProtocolVersion::V1 => {
                if self.payload.len() > u16::MAX as usize {
                    return Err(Error::InvalidArgument("payload exceeds the v1 length field"));
                }
                let raw = RawFrameV1 {
                    address: self.address,
                    component: self.component,
                    function: self.function,
                    payload: self.payload.clone(),
                    checksum: checksum_v1(
                        self.address,
                        self.component,
                        self.function,
                        &self.payload,
                    ),
                };
                let mut cursor = Cursor::new(Vec::new());
                raw.write_le(&mut cursor)
                    .map_err(|_| ProtocolError::MessageCorrupt("frame serialization failed"))?;
                Ok(cursor.into_inner())
            }
        }
    }
}

#[binrw]
#[brw(little, magic = 0x3Au8)]
#[derive(Debug)]
pub(crate) struct RawFrameV0 {
    pub address: u8,
    pub function: u8,
    #[br(temp)]
    #[bw(try_calc(u8::try_from(payload.len())))]
    length: u8,
    #[br(count = length)]
    pub payload: Vec<u8>,
    pub checksum: u16,
}

#[binrw]
#[brw(little, magic = 0x3Au8)]
#[derive(Debug)]
pub(crate) struct RawFrameV1 {
    pub address: u8,
    pub component: u8,
    pub function: u16,
    #[br(temp)]
    #[bw(try_calc(u16::try_from(payload.len())))]
    length: u16,
    #[br(count = length)]
    pub payload: Vec<u8>,
    pub checksum: u16,
}

pub(crate) fn checksum_v0(address: u8, function: u8, payload: &[u8]) -> u16 {
    let mut sum = (address as u16)
        .wrapping_add(function as u16)
        .wrapping_add(payload.len() as u16);
    for &b in payload {
        sum = sum.wrapping_add(b as u16);
    }
    sum
}

pub(crate) fn checksum_v1(address: u8, component: u8, function: u16, payload: &[u8]) -> u16 {
    let length = payload.len() as u16;
    let mut sum = (address as u16)
        .wrapping_add(component as u16)
        .wrapping_add(function & 0x00FF)
        .wrapping_add(function >> 8)
        .wrapping_add(length & 0x00FF)
        .wrapping_add(length >> 8);
    for &b in payload {
        sum = sum.wrapping_add(b as u16);
    }
    sum
}

/// Byte count of the fixed header (sync through length), per version.
pub(crate) fn header_len(version: ProtocolVersion) -> usize {
    match version {
        ProtocolVersion::V0 => 4,
        ProtocolVersion::V1 => 7,
    }
}

pub(crate) const CHECKSUM_LEN: usize = 2;

/// Reads the payload length field out of a buffer that holds at least the
/// fixed header.
pub(crate) fn payload_len(version: ProtocolVersion, buf: &[u8]) -> usize {
    match version {
        ProtocolVersion::V0 => buf[3] as usize,
        ProtocolVersion::V1 => u16::from_le_bytes([buf[5], buf[6]]) as usize,
    }
}

/// Decodes one complete frame from `buf`, which must hold exactly
/// `header_len + payload_len + CHECKSUM_LEN` bytes starting at the sync byte.
pub(crate) fn decode(version: ProtocolVersion, buf: &[u8]) -> Result<Frame> {
    match version {
        ProtocolVersion::V0 => {
            let raw = RawFrameV0::read_le(&mut Cursor::new(buf))
                .map_err(|_| ProtocolError::MessageCorrupt("malformed v0 frame"))?;
            if raw.checksum != checksum_v0(raw.address, raw.function, &raw.payload) {
                return Err(ProtocolError::MessageCorrupt("v0 checksum mismatch").into());
            }
            Ok(Frame {
                address: raw.address,
                component: 0,
                function: raw.function as u16,
                payload: raw.payload,
            })
        }
        ProtocolVersion::V1 => {
            let raw = RawFrameV1::read_le(&mut Cursor::new(buf))
                .map_err(|_| ProtocolError::MessageCorrupt("malformed v1 frame"))?;
            if raw.checksum != checksum_v1(raw.address, raw.component, raw.function, &raw.payload)
            {
                return Err(ProtocolError::MessageCorrupt("v1 checksum mismatch").into());
            }
            Ok(Frame {
                address: raw.address,
                component: raw.component,
                function: raw.function,
                payload: raw.payload,
            })
        }
    }
}
