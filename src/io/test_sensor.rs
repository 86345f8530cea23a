//! In-process synthetic sensor.
//!
//! An event-oriented transport that emits a fixed IMU stream at 100 Hz,
//! useful for exercising the event pipeline without hardware.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::info;

use crate::error::Result;
use crate::io::{EventSubscriber, EventTransport, Subscribers, TransportHandle, TransportSystem};
use crate::math::Vector3;
use crate::types::{ComponentHandle, EventData, ImuSample, SensorDesc, SensorEvent};
use crate::util::ThreadFence;

pub const KEY: &str = "test";

const EMIT_PERIOD: Duration = Duration::from_millis(10);

pub struct TestSensorSystem;

impl TestSensorSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TestSensorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportSystem for TestSensorSystem {
    fn key(&self) -> &'static str {
        KEY
    }

    fn discover(&self) -> Result<Vec<SensorDesc>> {
        Ok(vec![SensorDesc {
            name: "synthetic imu".to_string(),
            serial_number: "TEST0001".to_string(),
            io_type: KEY.to_string(),
            identifier: "test0".to_string(),
            baud_rate: 0,
        }])
    }

    fn obtain(&self, desc: &SensorDesc, subscribers: &Subscribers) -> Result<TransportHandle> {
        let transport = TestSensorTransport::start(desc, subscribers.events.clone());
        Ok(TransportHandle::Events(Box::new(transport)))
    }
}

pub struct TestSensorTransport {
    identifier: String,
    fence: Arc<ThreadFence>,
    emitter: Option<JoinHandle<()>>,
}

impl TestSensorTransport {
    fn start(desc: &SensorDesc, subscriber: Arc<dyn EventSubscriber>) -> Self {
        let fence = Arc::new(ThreadFence::new());
        let emitter = {
            let fence = fence.clone();
            std::thread::spawn(move || emit_loop(subscriber, fence))
        };
        info!("started synthetic sensor stream");
        Self {
            identifier: desc.identifier.clone(),
            fence,
            emitter: Some(emitter),
        }
    }
}

/// The fixed sample every tick carries: a constant orientation, gravity on
/// -z and an easily recognizable gyroscope triple.
fn synthetic_sample(frame_count: u32) -> ImuSample {
    ImuSample {
        frame_count,
        timestamp: frame_count as f64 * EMIT_PERIOD.as_secs_f64(),
        quat: [0.5, -0.5, -0.5, 0.5],
        acc: Vector3::new(0.0, 0.0, -1.0),
        gyr: Vector3::new(23.0, 24.0, 25.0),
        ..ImuSample::default()
    }
}

fn emit_loop(subscriber: Arc<dyn EventSubscriber>, fence: Arc<ThreadFence>) {
    let mut frame_count = 0u32;
    loop {
        if fence.wait_timeout(EMIT_PERIOD) {
            break;
        }
        frame_count += 1;
        subscriber.process_event(SensorEvent {
            component: ComponentHandle(1),
            data: EventData::Imu(synthetic_sample(frame_count)),
        });
    }
}

impl EventTransport for TestSensorTransport {
    fn io_type(&self) -> &'static str {
        KEY
    }

    fn matches(&self, desc: &SensorDesc) -> bool {
        desc.io_type == KEY && desc.identifier == self.identifier
    }

    fn close(&mut self) -> Result<()> {
        self.fence.terminate();
        if let Some(handle) = self.emitter.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl Drop for TestSensorTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
