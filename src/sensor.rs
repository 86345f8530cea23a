//! Session lifecycle: discovery, open/negotiate, event dispatch, close.
//!
//! An open sensor owns one transport (byte- or event-oriented), the framing
//! channel where applicable, and its components. Streamed frames are parsed
//! on the transport reader thread and delivered to the application through
//! a bounded channel, in wire order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::communicator::{Communicator, FrameSink};
use crate::components::gnss::GnssComponent;
use crate::components::imu::ImuComponent;
use crate::components::SensorComponent;
use crate::error::{Error, ProtocolError, Result, SessionError, TransportError};
use crate::io::registry::registry;
use crate::io::{EventTransport, EventSubscriber, Subscribers, TransportHandle, TransportSystem};
use crate::protocol::{event_kind, CommandV0, Frame, ProtocolVersion};
use crate::types::{ComponentHandle, SensorDesc, SensorEvent};

/// Capacity of the application event queue. A full queue back-pressures
/// the transport reader briefly, then drops the sample.
const EVENT_QUEUE_DEPTH: usize = 256;
const EVENT_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Component handle of the sole component on a v0 sensor.
const V0_COMPONENT: u8 = 0;
/// Component handles v1 firmware routes by.
const V1_IMU_COMPONENT: u8 = 1;
const V1_GNSS_COMPONENT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    Disconnected,
    Connecting,
    Negotiating,
    Running,
    Closing,
    Closed,
}

/// Firmware identity read during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Single-gyroscope hardware variants stream their only gyroscope in
    /// the second v1 wire slot; this routes it to the primary fields.
    pub second_gyro_is_primary: bool,
}

enum Link {
    Framed(Arc<Communicator>),
    Direct(Box<dyn EventTransport>),
}

pub struct Sensor {
    desc: SensorDesc,
    dispatcher: Arc<Dispatcher>,
    link: Option<Link>,
    events_rx: Receiver<SensorEvent>,
    imu: Option<Arc<ImuComponent>>,
    gnss: Option<Arc<GnssComponent>>,
    firmware: Option<FirmwareInfo>,
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor").field("desc", &self.desc).finish()
    }
}

impl Sensor {
    /// Enumerates attached sensors across every registered transport.
    pub fn discover() -> Vec<SensorDesc> {
        let mut found = Vec::new();
        for system in registry().systems() {
            match system.discover() {
                Ok(mut descs) => found.append(&mut descs),
                Err(e) => warn!(key = system.key(), error = %e, "discovery failed"),
            }
        }
        found
    }

    pub fn open(desc: &SensorDesc) -> Result<Sensor> {
        Self::open_with_options(desc, OpenOptions::default())
    }

    pub fn open_with_options(desc: &SensorDesc, options: OpenOptions) -> Result<Sensor> {
        let system = registry()
            .get(&desc.io_type)
            .ok_or_else(|| Error::NotFound(desc.io_type.clone()))?;
        Self::open_on(system.as_ref(), desc, options)
    }

    pub(crate) fn open_on(
        system: &dyn TransportSystem,
        desc: &SensorDesc,
        options: OpenOptions,
    ) -> Result<Sensor> {
        let (events_tx, events_rx) = bounded(EVENT_QUEUE_DEPTH);
        let dispatcher = Arc::new(Dispatcher::new(events_tx));
        let comm = Arc::new(Communicator::new());
        comm.set_sink(dispatcher.clone());

        dispatcher.set_state(SensorState::Connecting);
        let subscribers = Subscribers {
            data: comm.subscriber(),
            events: dispatcher.clone(),
        };
        let handle = system.obtain(desc, &subscribers)?;

        match handle {
            TransportHandle::Events(transport) => {
                info!(io_type = %desc.io_type, id = %desc.identifier, "opened event sensor");
                dispatcher.set_state(SensorState::Running);
                Ok(Sensor {
                    desc: desc.clone(),
                    dispatcher,
                    link: Some(Link::Direct(transport)),
                    events_rx,
                    imu: None,
                    gnss: None,
                    firmware: None,
                })
            }
            TransportHandle::Bytes(transport) => {
                comm.attach_transport(transport);
                *dispatcher.comm.lock().unwrap() = Some(Arc::downgrade(&comm));
                dispatcher.set_state(SensorState::Negotiating);

                let (version, firmware) = match negotiate(&comm) {
                    Ok(negotiated) => negotiated,
                    Err(e) => {
                        let _ = comm.close();
                        return Err(e);
                    }
                };
                info!(
                    ?version,
                    major = firmware.major,
                    minor = firmware.minor,
                    patch = firmware.patch,
                    "negotiated session"
                );
                comm.set_version(version);
                dispatcher.set_version(version);

                let mut imu = None;
                let mut gnss = None;
                match version {
                    ProtocolVersion::V0 => {
                        let component = Arc::new(ImuComponent::new(
                            ComponentHandle(V0_COMPONENT),
                            version,
                            comm.clone(),
                            options.second_gyro_is_primary,
                        ));
                        dispatcher.register(component.clone());
                        imu = Some(component);
                    }
                    ProtocolVersion::V1 => {
                        let component = Arc::new(ImuComponent::new(
                            ComponentHandle(V1_IMU_COMPONENT),
                            version,
                            comm.clone(),
                            options.second_gyro_is_primary,
                        ));
                        dispatcher.register(component.clone());
                        imu = Some(component);

                        let component =
                            Arc::new(GnssComponent::new(ComponentHandle(V1_GNSS_COMPONENT), comm.clone()));
                        dispatcher.register(component.clone());
                        gnss = Some(component);
                    }
                }

                for component in dispatcher.components() {
                    if let Err(e) = component.init() {
                        error!(error = %e, "component init failed, closing transport");
                        let _ = comm.close();
                        return Err(e);
                    }
                }

                dispatcher.set_state(SensorState::Running);
                Ok(Sensor {
                    desc: desc.clone(),
                    dispatcher,
                    link: Some(Link::Framed(comm)),
                    events_rx,
                    imu,
                    gnss,
                    firmware: Some(firmware),
                })
            }
        }
    }

    pub fn desc(&self) -> &SensorDesc {
        &self.desc
    }

    pub fn state(&self) -> SensorState {
        self.dispatcher.state()
    }

    pub fn firmware(&self) -> Option<FirmwareInfo> {
        self.firmware
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        match &self.link {
            Some(Link::Framed(comm)) => Some(comm.version()),
            _ => None,
        }
    }

    /// The application-facing sample stream. Clone the receiver to keep
    /// draining after [`Sensor::close`].
    pub fn events(&self) -> &Receiver<SensorEvent> {
        &self.events_rx
    }

    pub fn imu(&self) -> Option<Arc<ImuComponent>> {
        self.imu.clone()
    }

    pub fn gnss(&self) -> Option<Arc<GnssComponent>> {
        self.gnss.clone()
    }

    pub fn baud_rate(&self) -> Result<u32> {
        match &self.link {
            Some(Link::Framed(comm)) => comm.with_transport(|t| t.baud_rate()),
            Some(Link::Direct(_)) => Err(Error::UnknownProperty),
            None => Err(SessionError::AlreadyClosed.into()),
        }
    }

    pub fn set_baud_rate(&self, rate: u32) -> Result<()> {
        match &self.link {
            Some(Link::Framed(comm)) => comm.with_transport(|t| t.set_baud_rate(rate)),
            Some(Link::Direct(_)) => Err(Error::UnknownProperty),
            None => Err(SessionError::AlreadyClosed.into()),
        }
    }

    pub fn supported_baud_rates(&self) -> Result<Vec<u32>> {
        match &self.link {
            Some(Link::Framed(comm)) => comm.with_transport(|t| Ok(t.supported_baud_rates())),
            Some(Link::Direct(_)) => Err(Error::UnknownProperty),
            None => Err(SessionError::AlreadyClosed.into()),
        }
    }

    /// Closes the session: component teardown (RTK stop, navigation-state
    /// persist) while the channel is alive, then transport shutdown. Any
    /// pending request completes with `Transport::Cancelled`; no event is
    /// delivered after this returns.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        self.dispatcher.set_state(SensorState::Closing);
        info!(id = %self.desc.identifier, "closing sensor");

        if let Some(gnss) = &self.gnss {
            let _ = SensorComponent::close(gnss.as_ref());
        }
        if let Some(imu) = &self.imu {
            let _ = SensorComponent::close(imu.as_ref());
        }

        let result = match link {
            Link::Framed(comm) => comm.close(),
            Link::Direct(mut transport) => transport.close(),
        };
        self.dispatcher.set_state(SensorState::Closed);
        result
    }
}

impl Drop for Sensor {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn negotiate(comm: &Communicator) -> Result<(ProtocolVersion, FirmwareInfo)> {
    // Identity is always requested with legacy framing; every firmware
    // generation answers it.
    comm.send_and_wait_for_ack(V0_COMPONENT, CommandV0::GotoCommandMode.code(), &[])?;
    let payload = comm.send_and_wait_for_result(V0_COMPONENT, CommandV0::GetFirmwareInfo.code())?;
    if payload.len() != 12 {
        return Err(ProtocolError::MessageCorrupt("firmware info must carry three u32").into());
    }

    let word = |i: usize| u32::from_le_bytes(payload[i..i + 4].try_into().unwrap());
    let firmware = FirmwareInfo {
        major: word(0),
        minor: word(4),
        patch: word(8),
    };

    let version = match firmware.major {
        0 | 1 => ProtocolVersion::V0,
        2 | 3 => ProtocolVersion::V1,
        other => return Err(SessionError::VersionUnsupported(other).into()),
    };
    Ok((version, firmware))
}

/// Fans streamed frames into component parsers and the application queue.
struct Dispatcher {
    state: Mutex<SensorState>,
    version: Mutex<ProtocolVersion>,
    components: Mutex<HashMap<u8, Arc<dyn SensorComponent>>>,
    events_tx: Sender<SensorEvent>,
    comm: Mutex<Option<Weak<Communicator>>>,
}

impl Dispatcher {
    fn new(events_tx: Sender<SensorEvent>) -> Self {
        Self {
            state: Mutex::new(SensorState::Disconnected),
            version: Mutex::new(ProtocolVersion::V0),
            components: Mutex::new(HashMap::new()),
            events_tx,
            comm: Mutex::new(None),
        }
    }

    fn state(&self) -> SensorState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: SensorState) {
        *self.state.lock().unwrap() = state;
    }

    fn set_version(&self, version: ProtocolVersion) {
        *self.version.lock().unwrap() = version;
    }

    fn register(&self, component: Arc<dyn SensorComponent>) {
        self.components
            .lock()
            .unwrap()
            .insert(component.handle().0, component);
    }

    fn components(&self) -> Vec<Arc<dyn SensorComponent>> {
        let mut components: Vec<_> = self.components.lock().unwrap().values().cloned().collect();
        components.sort_by_key(|c| c.handle().0);
        components
    }

    fn deliver(&self, event: SensorEvent) {
        if matches!(self.state(), SensorState::Closing | SensorState::Closed) {
            return;
        }
        match self
            .events_tx
            .send_timeout(event, EVENT_ENQUEUE_TIMEOUT)
        {
            Ok(()) => {}
            Err(crossbeam_channel::SendTimeoutError::Timeout(_)) => {
                warn!("event queue full, dropping sample");
            }
            Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => {}
        }
    }
}

impl FrameSink for Dispatcher {
    fn handle_event_frame(&self, frame: Frame) {
        if matches!(self.state(), SensorState::Closing | SensorState::Closed) {
            return;
        }

        let version = *self.version.lock().unwrap();
        let Some(kind) = event_kind(version, frame.function) else {
            debug!(function = frame.function, "ignoring unknown async frame");
            return;
        };

        let component = self.components.lock().unwrap().get(&frame.component).cloned();
        let Some(component) = component else {
            warn!(component = frame.component, "event for unknown component");
            return;
        };

        match component.process_event(kind, &frame.payload) {
            Ok(data) => self.deliver(SensorEvent {
                component: ComponentHandle(frame.component),
                data,
            }),
            Err(e) => {
                // A parse failure poisons the stream position; abort the
                // session rather than deliver drifted samples.
                error!(error = %e, "sample parse failed, aborting session");
                self.set_state(SensorState::Closing);
                let comm = self.comm.lock().unwrap().clone();
                if let Some(comm) = comm.and_then(|weak| weak.upgrade()) {
                    comm.fail_pending(e);
                }
            }
        }
    }

    fn handle_link_down(&self) {
        info!("transport lost, session closing");
        self.set_state(SensorState::Closing);
    }
}

impl EventSubscriber for Dispatcher {
    fn process_event(&self, event: SensorEvent) {
        self.deliver(event);
    }

    fn link_down(&self, error: TransportError) {
        error!(error = %error, "event transport lost");
        self.set_state(SensorState::Closing);
    }
}

#[cfg(test)]
#[path = "sensor_tests.rs"]
mod tests;
