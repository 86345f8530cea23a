//! # imulink - IMU/GNSS sensor client library
//!
//! A Rust library for discovering, opening and streaming from a family of
//! inertial and GNSS sensors that speak two generations of a binary wire
//! protocol (v0 and v1) over serial and network transports.
//!
//! ## Features
//!
//! - Pluggable transport layer with a process-wide registry (serial over
//!   USB-UART bridges, network event subscription, in-process test sensor)
//! - Synchronous request/response channel with acknowledge pairing,
//!   running concurrently with the sample stream on one link
//! - Output-enable driven IMU and GNSS sample parsers with calibration
//!   applied from a thread-safely shared cache
//! - RTK correction forwarding from RTCM3 network or serial sources
//! - Typed error handling end to end
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use imulink::{EventData, Sensor};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let descriptors = Sensor::discover();
//!     let sensor = Sensor::open(&descriptors[0])?;
//!
//!     for event in sensor.events().iter().take(100) {
//!         match event.data {
//!             EventData::Imu(sample) => println!("quat {:?}", sample.quat),
//!             EventData::Gnss(sample) => {
//!                 println!("{:.7} {:.7}", sample.latitude, sample.longitude)
//!             }
//!         }
//!     }
//!
//!     sensor.close()?;
//!     Ok(())
//! }
//! ```

pub mod calibration;
mod communicator;
pub mod components;
pub mod error;
pub mod io;
pub mod math;
pub mod properties;
pub mod protocol;
pub mod rtk;
pub mod sensor;
pub mod types;
pub mod util;

pub use components::gnss::GnssComponent;
pub use components::imu::ImuComponent;
pub use components::SensorComponent;
pub use error::{Error, ProtocolError, Result, SessionError, TransportError};
pub use math::{Matrix3x3, Vector3};
pub use properties::{ImuCommand, ImuProperty, PropertyValue};
pub use protocol::ProtocolVersion;
pub use rtk::RtkSourceConfig;
pub use sensor::{FirmwareInfo, OpenOptions, Sensor, SensorState};
pub use types::{
    CarrierPhaseSolution, ComponentHandle, ComponentKind, EventData, GnssFixType, GnssSample,
    ImuSample, SensorDesc, SensorEvent,
};
