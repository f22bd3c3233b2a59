//! Shared helpers for engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use framestream::capture::command::CommandPolicy;
use framestream::capture::sim::{SimSettings, SimulatedCamera};
use framestream::{Config, Frame, StreamingEngine};

pub const WAIT: Duration = Duration::from_secs(2);

pub type Engine = StreamingEngine<SimulatedCamera>;

/// Millisecond command polling so tests do not sleep 100ms per command
pub fn fast_policy() -> CommandPolicy {
    CommandPolicy {
        poll_interval: Duration::from_millis(1),
        timeout: Some(Duration::from_millis(200)),
    }
}

pub fn engine_with(settings: SimSettings) -> (Arc<SimulatedCamera>, Engine) {
    let camera = Arc::new(SimulatedCamera::new(settings));
    let engine = StreamingEngine::new(camera.clone(), &Config::default()).with_policy(fast_policy());
    (camera, engine)
}

pub fn engine() -> (Arc<SimulatedCamera>, Engine) {
    engine_with(SimSettings::default())
}

/// Consumer that forwards every frame into a channel
pub fn collector() -> (impl Fn(Frame) + Send + Sync + 'static, flume::Receiver<Frame>) {
    let (tx, rx) = flume::unbounded();
    let consumer = move |frame: Frame| {
        let _ = tx.send(frame);
    };
    (consumer, rx)
}

/// Calls made to the camera, without per-buffer queue calls
pub fn protocol_calls(camera: &SimulatedCamera) -> Vec<String> {
    camera
        .calls()
        .into_iter()
        .filter(|c| c != "CaptureFrameQueue")
        .collect()
}
