//! The framing channel: a synchronous request/response protocol layered
//! over a byte-oriented transport, running concurrently with the sample
//! stream on the same link.
//!
//! At most one RPC is in flight per channel. A caller arms the single
//! request slot, writes its frame and parks on the condition variable; the
//! transport reader thread decodes incoming bytes and either completes the
//! slot (matching response, ack, nack) or forwards the frame to the
//! component event sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::{Error, ProtocolError, Result, SessionError, TransportError};
use crate::io::{ByteTransport, DataSubscriber};
use crate::protocol::{event_kind, Frame, FrameParser, ProtocolVersion, FN_ACK, FN_NACK};

/// Default deadline for a response from the device.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Receives frames that are not responses to the pending request:
/// streamed samples and async notifications.
pub(crate) trait FrameSink: Send + Sync {
    fn handle_event_frame(&self, frame: Frame);

    /// The transport reader died; the session should begin closing.
    fn handle_link_down(&self);
}

enum RequestSlot {
    Empty,
    Armed {
        function: u16,
        component: u8,
        expect_payload: bool,
    },
    Done(Result<Vec<u8>>),
}

pub(crate) struct Communicator {
    inner: Arc<Shared>,
}

struct Shared {
    version: Mutex<ProtocolVersion>,
    transport: Mutex<Option<Box<dyn ByteTransport>>>,
    parser: Mutex<FrameParser>,
    slot: Mutex<RequestSlot>,
    slot_cv: Condvar,
    /// Serializes callers; held across one full request/response exchange.
    gate: Mutex<()>,
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    closed: AtomicBool,
}

impl Communicator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                version: Mutex::new(ProtocolVersion::V0),
                transport: Mutex::new(None),
                parser: Mutex::new(FrameParser::new(ProtocolVersion::V0)),
                slot: Mutex::new(RequestSlot::Empty),
                slot_cv: Condvar::new(),
                gate: Mutex::new(()),
                sink: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The byte sink to hand to the transport at obtain time.
    pub fn subscriber(&self) -> Arc<dyn DataSubscriber> {
        self.inner.clone()
    }

    pub fn attach_transport(&self, transport: Box<dyn ByteTransport>) {
        *self.inner.transport.lock().unwrap() = Some(transport);
    }

    pub fn set_sink(&self, sink: Arc<dyn FrameSink>) {
        *self.inner.sink.lock().unwrap() = Some(sink);
    }

    pub fn version(&self) -> ProtocolVersion {
        *self.inner.version.lock().unwrap()
    }

    /// Switches the wire format after negotiation. Must not run while a
    /// request is in flight.
    pub fn set_version(&self, version: ProtocolVersion) {
        *self.inner.version.lock().unwrap() = version;
        self.inner.parser.lock().unwrap().set_version(version);
    }

    /// Runs `f` against the open transport, e.g. for baud rate changes.
    pub fn with_transport<R>(
        &self,
        f: impl FnOnce(&mut dyn ByteTransport) -> Result<R>,
    ) -> Result<R> {
        let mut guard = self.inner.transport.lock().unwrap();
        match guard.as_mut() {
            Some(transport) => f(transport.as_mut()),
            None => Err(SessionError::NotInitialized.into()),
        }
    }

    /// Sends a write/command frame and waits for the device acknowledge.
    pub fn send_and_wait_for_ack(&self, component: u8, function: u16, payload: &[u8]) -> Result<()> {
        self.send_and_wait_for_ack_timeout(component, function, payload, DEFAULT_RESPONSE_TIMEOUT)
    }

    pub fn send_and_wait_for_ack_timeout(
        &self,
        component: u8,
        function: u16,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        self.request(component, function, payload, false, timeout)
            .map(|_| ())
    }

    /// Sends a read frame and waits for the typed response payload.
    pub fn send_and_wait_for_result(&self, component: u8, function: u16) -> Result<Vec<u8>> {
        self.send_and_wait_for_result_timeout(component, function, DEFAULT_RESPONSE_TIMEOUT)
    }

    pub fn send_and_wait_for_result_timeout(
        &self,
        component: u8,
        function: u16,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.request(component, function, &[], true, timeout)
    }

    fn request(
        &self,
        component: u8,
        function: u16,
        payload: &[u8],
        expect_payload: bool,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SessionError::AlreadyClosed.into());
        }

        let _gate = self.inner.gate.lock().unwrap();
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(SessionError::AlreadyClosed.into());
        }

        let version = self.version();
        let bytes = Frame::new(component, function, payload.to_vec()).encode(version)?;

        {
            let mut slot = self.inner.slot.lock().unwrap();
            *slot = RequestSlot::Armed {
                function,
                component,
                expect_payload,
            };
        }

        if let Err(e) = self.with_transport(|t| t.send(&bytes)) {
            *self.inner.slot.lock().unwrap() = RequestSlot::Empty;
            return Err(e);
        }

        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.slot.lock().unwrap();
        loop {
            if matches!(&*slot, RequestSlot::Done(_)) {
                let RequestSlot::Done(result) = std::mem::replace(&mut *slot, RequestSlot::Empty)
                else {
                    unreachable!()
                };
                return result;
            }
            if matches!(&*slot, RequestSlot::Empty) {
                return Err(TransportError::Cancelled.into());
            }

            let now = Instant::now();
            if now >= deadline {
                *slot = RequestSlot::Empty;
                debug!(function, "response deadline expired");
                return Err(ProtocolError::ResponseTimeout.into());
            }
            let (guard, _) = self
                .inner
                .slot_cv
                .wait_timeout(slot, deadline - now)
                .unwrap();
            slot = guard;
        }
    }

    /// Completes a pending request with `error` without touching the
    /// transport. Used when the session aborts from the dispatch path.
    pub fn fail_pending(&self, error: Error) {
        let mut slot = self.inner.slot.lock().unwrap();
        if matches!(&*slot, RequestSlot::Armed { .. }) {
            *slot = RequestSlot::Done(Err(error));
            self.inner.slot_cv.notify_all();
        }
    }

    /// Cancels the pending request, closes the transport and joins its
    /// reader. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut slot = self.inner.slot.lock().unwrap();
            if matches!(&*slot, RequestSlot::Armed { .. }) {
                *slot = RequestSlot::Done(Err(TransportError::Cancelled.into()));
                self.inner.slot_cv.notify_all();
            }
        }

        let transport = self.inner.transport.lock().unwrap().take();
        if let Some(mut transport) = transport {
            transport.close()?;
        }
        Ok(())
    }
}

impl Shared {
    fn handle_frame(&self, frame: Frame) {
        let version = *self.version.lock().unwrap();

        // Streamed samples never touch the request slot.
        if event_kind(version, frame.function).is_some() {
            self.forward_event(frame);
            return;
        }

        {
            let mut slot = self.slot.lock().unwrap();
            if let RequestSlot::Armed {
                function,
                component,
                expect_payload,
            } = *slot
            {
                let routed = version != ProtocolVersion::V1 || frame.component == component;
                let completed = if !routed {
                    None
                } else if frame.function == FN_NACK && echo_matches(version, &frame.payload, function)
                {
                    Some(Err(ProtocolError::NegativeAck(function).into()))
                } else if !expect_payload
                    && frame.function == FN_ACK
                    && echo_matches(version, &frame.payload, function)
                {
                    Some(Ok(Vec::new()))
                } else if expect_payload && frame.function == function {
                    Some(Ok(frame.payload.clone()))
                } else {
                    None
                };

                if let Some(result) = completed {
                    *slot = RequestSlot::Done(result);
                    self.slot_cv.notify_all();
                    return;
                }
            }
        }

        // Not a response to the pending request: async notification.
        self.forward_event(frame);
    }

    fn forward_event(&self, frame: Frame) {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => sink.handle_event_frame(frame),
            None => debug!(function = frame.function, "dropping frame, no sink attached"),
        }
    }
}

/// An acknowledge may echo the request function code in its payload; an
/// empty payload acknowledges whatever is pending (only one request can be
/// in flight).
fn echo_matches(version: ProtocolVersion, payload: &[u8], function: u16) -> bool {
    match version {
        _ if payload.is_empty() => true,
        ProtocolVersion::V0 => payload[0] as u16 == function,
        ProtocolVersion::V1 => {
            payload.len() >= 2 && u16::from_le_bytes([payload[0], payload[1]]) == function
        }
    }
}

impl DataSubscriber for Shared {
    fn process_data(&self, data: &[u8]) {
        let mut frames = Vec::new();
        {
            let mut parser = self.parser.lock().unwrap();
            if let Some(frame) = parser.consume(data) {
                frames.push(frame);
                while let Some(frame) = parser.consume(&[]) {
                    frames.push(frame);
                }
            }
        }
        for frame in frames {
            self.handle_frame(frame);
        }
    }

    fn link_down(&self, error: TransportError) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        error!(error = %error, "transport reader failed, failing pending request");

        {
            let mut slot = self.slot.lock().unwrap();
            if matches!(&*slot, RequestSlot::Armed { .. }) {
                *slot = RequestSlot::Done(Err(Error::Transport(error)));
                self.slot_cv.notify_all();
            }
        }

        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink.handle_link_down();
        } else {
            warn!("transport reader failed before a sink was attached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mock::MockByteTransport;
    use crate::protocol::CommandV0;
    use std::sync::atomic::AtomicUsize;

    struct NullSink;
    impl FrameSink for NullSink {
        fn handle_event_frame(&self, _frame: Frame) {}
        fn handle_link_down(&self) {}
    }

    struct CountingSink {
        events: AtomicUsize,
        link_downs: AtomicUsize,
    }
    impl CountingSink {
        fn new() -> Self {
            Self {
                events: AtomicUsize::new(0),
                link_downs: AtomicUsize::new(0),
            }
        }
    }
    impl FrameSink for CountingSink {
        fn handle_event_frame(&self, _frame: Frame) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
        fn handle_link_down(&self) {
            self.link_downs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ack_frame(function: u16) -> Vec<u8> {
        Frame::new(0, FN_ACK, vec![function as u8])
            .encode(ProtocolVersion::V0)
            .unwrap()
    }

    fn nack_frame(function: u16) -> Vec<u8> {
        Frame::new(0, FN_NACK, vec![function as u8])
            .encode(ProtocolVersion::V0)
            .unwrap()
    }

    fn result_frame(function: u16, payload: Vec<u8>) -> Vec<u8> {
        Frame::new(0, function, payload)
            .encode(ProtocolVersion::V0)
            .unwrap()
    }

    fn communicator_with_responder(
        responder: impl Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) -> Communicator {
        let comm = Communicator::new();
        comm.set_sink(Arc::new(NullSink));
        let subscriber = comm.subscriber();
        let transport = MockByteTransport::new("mock0").with_on_send(move |sent| {
            if let Some(reply) = responder(sent) {
                subscriber.process_data(&reply);
            }
        });
        comm.attach_transport(Box::new(transport));
        comm
    }

    #[test]
    fn ack_completes_a_write_request() {
        let comm = communicator_with_responder(|sent| {
            // function code sits after sync and address
            Some(ack_frame(sent[2] as u16))
        });
        comm.send_and_wait_for_ack(0, CommandV0::SetTransmitData.code(), &[0; 4])
            .unwrap();
    }

    #[test]
    fn nack_surfaces_as_negative_ack() {
        let comm = communicator_with_responder(|sent| Some(nack_frame(sent[2] as u16)));
        let err = comm
            .send_and_wait_for_ack(0, CommandV0::SetSamplingRate.code(), &[0; 4])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::NegativeAck(code))
                if code == CommandV0::SetSamplingRate.code()
        ));
    }

    #[test]
    fn result_request_returns_response_payload() {
        let comm = communicator_with_responder(|sent| {
            Some(result_frame(sent[2] as u16, vec![0xD2, 0x02, 0x96, 0x49]))
        });
        let payload = comm
            .send_and_wait_for_result(0, CommandV0::GetConfig.code())
            .unwrap();
        assert_eq!(payload, vec![0xD2, 0x02, 0x96, 0x49]);
    }

    #[test]
    fn timeout_expires_near_the_deadline_and_frees_the_slot() {
        // Only command-mode requests get a reply; reads starve.
        let comm = communicator_with_responder(|sent| {
            (sent[2] as u16 == CommandV0::GotoCommandMode.code())
                .then(|| ack_frame(sent[2] as u16))
        });

        let start = Instant::now();
        let err = comm
            .send_and_wait_for_result_timeout(
                0,
                CommandV0::GetConfig.code(),
                Duration::from_millis(50),
            )
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, Error::Protocol(ProtocolError::ResponseTimeout)));
        assert!(elapsed >= Duration::from_millis(45), "returned too early: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(200), "returned too late: {elapsed:?}");

        // The slot is empty again: a later request completes normally.
        comm.send_and_wait_for_ack(0, CommandV0::GotoCommandMode.code(), &[])
            .unwrap();
    }

    #[test]
    fn concurrent_requests_serialize_and_keep_their_own_responses() {
        let comm = Arc::new(communicator_with_responder(|sent| {
            let function = sent[2] as u16;
            // reply with a payload derived from the function code
            Some(result_frame(function, vec![function as u8; 4]))
        }));

        let mut handles = Vec::new();
        for function in [
            CommandV0::GetAccBias.code(),
            CommandV0::GetGyrBias.code(),
            CommandV0::GetConfig.code(),
        ] {
            let comm = comm.clone();
            handles.push(std::thread::spawn(move || {
                let payload = comm.send_and_wait_for_result(0, function).unwrap();
                assert_eq!(payload, vec![function as u8; 4]);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn close_cancels_a_pending_request_promptly() {
        let comm = Arc::new(communicator_with_responder(|_| None));

        let waiter = {
            let comm = comm.clone();
            std::thread::spawn(move || {
                comm.send_and_wait_for_ack_timeout(
                    0,
                    CommandV0::SetTransmitData.code(),
                    &[0; 4],
                    Duration::from_secs(10),
                )
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        let close_start = Instant::now();
        comm.close().unwrap();
        assert!(close_start.elapsed() < Duration::from_millis(100));

        let result = waiter.join().unwrap();
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::Cancelled))
        ));
    }

    #[test]
    fn requests_after_close_fail_fast() {
        let comm = communicator_with_responder(|_| None);
        comm.close().unwrap();
        assert!(matches!(
            comm.send_and_wait_for_ack(0, CommandV0::GotoStreamMode.code(), &[]),
            Err(Error::Session(SessionError::AlreadyClosed))
        ));
    }

    #[test]
    fn event_frames_bypass_an_armed_slot() {
        let comm = Communicator::new();
        let sink = Arc::new(CountingSink::new());
        comm.set_sink(sink.clone());
        let subscriber = comm.subscriber();
        comm.attach_transport(Box::new(MockByteTransport::new("mock0")));

        // An IMU sample arrives while nothing is armed.
        let sample = Frame::new(0, CommandV0::GetSensorData.code(), vec![1, 0, 0, 0])
            .encode(ProtocolVersion::V0)
            .unwrap();
        subscriber.process_data(&sample);
        assert_eq!(sink.events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn link_down_fails_pending_request_and_notifies_sink() {
        let comm = Arc::new(Communicator::new());
        let sink = Arc::new(CountingSink::new());
        comm.set_sink(sink.clone());
        let subscriber = comm.subscriber();
        comm.attach_transport(Box::new(MockByteTransport::new("mock0")));

        let waiter = {
            let comm = comm.clone();
            std::thread::spawn(move || {
                comm.send_and_wait_for_ack_timeout(
                    0,
                    CommandV0::SetTransmitData.code(),
                    &[],
                    Duration::from_secs(10),
                )
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        subscriber.link_down(TransportError::ReadFailed(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "gone",
        )));

        let result = waiter.join().unwrap();
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::ReadFailed(_)))
        ));
        assert_eq!(sink.link_downs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chunked_bytes_reassemble_into_one_response() {
        let comm = Communicator::new();
        comm.set_sink(Arc::new(NullSink));
        let subscriber = comm.subscriber();
        comm.attach_transport(Box::new(MockByteTransport::new("mock0")));

        let comm = Arc::new(comm);
        let waiter = {
            let comm = comm.clone();
            std::thread::spawn(move || comm.send_and_wait_for_result(0, CommandV0::GetConfig.code()))
        };

        std::thread::sleep(Duration::from_millis(20));
        let response = result_frame(CommandV0::GetConfig.code(), vec![9, 9, 9, 9]);
        let (a, b) = response.split_at(3);
        subscriber.process_data(a);
        std::thread::sleep(Duration::from_millis(5));
        subscriber.process_data(b);

        assert_eq!(waiter.join().unwrap().unwrap(), vec![9, 9, 9, 9]);
    }
}
