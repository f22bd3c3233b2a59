//! In-process capture subsystem for tests and the demo binary
//!
//! Behaves like a vendor transport layer: buffers must be announced before
//! they are queued, revoking fails while buffers are still queued, and
//! completions are reported through the [`CompletionSink`] given at queue
//! time. Every call is logged and any call can be made to fail.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::debug;

use crate::capture::device::{
    features, Announcement, BufferToken, CameraDevice, CaptureApi, Completion, CompletionSink,
    FeatureAccess, FeatureInfo, FrameStatus,
};
use crate::capture::frame::PixelFormat;
use crate::capture::transform;
use crate::error::{ErrorCode, Result, StreamError};

/// Static description of the simulated sensor
#[derive(Debug, Clone)]
pub struct SimSettings {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub format_name: String,
    /// Extra payload bytes; non-zero forces transport-layer allocation
    pub padding: u32,
    /// SFNC namespace reported for the PixelFormat feature
    pub namespace: Option<String>,
    /// Device clock ticks between frames
    pub ticks_per_frame: u64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            format: PixelFormat::MONO12,
            format_name: "Mono12".into(),
            padding: 0,
            namespace: Some("Standard".into()),
            ticks_per_frame: 33_000_000,
        }
    }
}

impl SimSettings {
    pub fn image_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bits_per_pixel() as usize / 8
    }
}

struct SimState {
    settings: SimSettings,
    announced: Vec<Announcement>,
    queued: VecDeque<(BufferToken, CompletionSink)>,
    capturing: bool,
    acquiring: bool,
    frame_id: u64,
    ticks: u64,
    calls: Vec<String>,
    failures: HashMap<String, ErrorCode>,
    fail_announce_at: Option<(usize, ErrorCode)>,
    commands_hang: bool,
}

impl SimState {
    /// Log a call and apply any injected failure
    fn call(&mut self, call: &'static str, detail: Option<&str>) -> Result<()> {
        let key = match detail {
            Some(detail) => format!("{call}({detail})"),
            None => call.to_string(),
        };
        let failure = self.failures.get(&key).copied();
        self.calls.push(key);
        match failure {
            Some(code) => Err(StreamError::device(call, code)),
            None => Ok(()),
        }
    }
}

/// Local device module; only knows the timestamp clock
struct SimClock {
    frequency: Mutex<Option<i64>>,
}

impl FeatureAccess for SimClock {
    fn get_integer(&self, name: &str) -> Result<i64> {
        let frequency = *self.frequency.lock().unwrap_or_else(PoisonError::into_inner);
        match (name, frequency) {
            (features::DEVICE_TIMESTAMP_FREQUENCY, Some(freq)) => Ok(freq),
            _ => Err(StreamError::device("FeatureIntGet", ErrorCode::NOT_FOUND)),
        }
    }

    fn get_enum(&self, _: &str) -> Result<String> {
        Err(StreamError::device("FeatureEnumGet", ErrorCode::NOT_FOUND))
    }

    fn enum_as_int(&self, _: &str, _: &str) -> Result<i64> {
        Err(StreamError::device("FeatureEnumAsInt", ErrorCode::NOT_FOUND))
    }

    fn feature_info(&self, _: &str) -> Result<FeatureInfo> {
        Err(StreamError::device("FeatureInfoQuery", ErrorCode::NOT_FOUND))
    }

    fn run_command(&self, _: &str) -> Result<()> {
        Err(StreamError::device("FeatureCommandRun", ErrorCode::NOT_FOUND))
    }

    fn is_command_done(&self, _: &str) -> bool {
        true
    }
}

/// Scriptable camera implementing the full device boundary
pub struct SimulatedCamera {
    state: Mutex<SimState>,
    clock: SimClock,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(SimSettings::default())
    }
}

impl SimulatedCamera {
    pub fn new(settings: SimSettings) -> Self {
        Self {
            state: Mutex::new(SimState {
                settings,
                announced: Vec::new(),
                queued: VecDeque::new(),
                capturing: false,
                acquiring: false,
                frame_id: 0,
                ticks: 0,
                calls: Vec::new(),
                failures: HashMap::new(),
                fail_announce_at: None,
                commands_hang: false,
            }),
            clock: SimClock {
                frequency: Mutex::new(Some(1_000_000_000)),
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `call` fail with `code`, e.g. `"CaptureStart"` or
    /// `"FeatureCommandRun(AcquisitionStop)"`
    pub fn fail(&self, call: &str, code: ErrorCode) {
        self.lock().failures.insert(call.to_string(), code);
    }

    pub fn clear_failure(&self, call: &str) {
        self.lock().failures.remove(call);
    }

    /// Fail the announce of the buffer at `index` (0-based)
    pub fn fail_announce_at(&self, index: usize, code: ErrorCode) {
        self.lock().fail_announce_at = Some((index, code));
    }

    /// Commands are issued but never report done
    pub fn set_commands_hang(&self, hang: bool) {
        self.lock().commands_hang = hang;
    }

    pub fn set_timestamp_frequency(&self, frequency: Option<i64>) {
        *self
            .clock
            .frequency
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = frequency;
    }

    pub fn settings(&self) -> SimSettings {
        self.lock().settings.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn announced_count(&self) -> usize {
        self.lock().announced.len()
    }

    pub fn queued_count(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().capturing
    }

    pub fn is_acquiring(&self) -> bool {
        self.lock().acquiring
    }

    /// Complete the oldest queued buffer with `status`.
    ///
    /// Returns the token that was completed, `None` if nothing was queued.
    pub fn fire(&self, status: FrameStatus) -> Option<BufferToken> {
        let (sink, completion) = {
            let mut state = self.lock();
            let (token, sink) = state.queued.pop_front()?;

            state.frame_id += 1;
            let step = state.settings.ticks_per_frame;
            state.ticks += step;
            let frame_id = state.frame_id;
            let settings = state.settings.clone();

            let image = if status == FrameStatus::Complete {
                let pixels = test_pattern(&settings, frame_id);
                let memory = state
                    .announced
                    .iter()
                    .find(|a| a.token == token)
                    .and_then(|a| a.memory.clone());
                match memory {
                    Some(memory) => {
                        let mut dst = memory.lock().unwrap_or_else(PoisonError::into_inner);
                        let len = dst.len().min(pixels.len());
                        dst[..len].copy_from_slice(&pixels[..len]);
                        None
                    }
                    None => Some(Bytes::from(pixels)),
                }
            } else {
                None
            };

            let completion = Completion {
                token,
                status,
                pixel_format: settings.format,
                width: settings.width,
                height: settings.height,
                frame_id,
                timestamp: state.ticks,
                image,
            };
            (sink, completion)
        };

        let token = completion.token;
        sink.notify(completion);
        Some(token)
    }

    /// Poll until `count` buffers are queued again
    pub fn wait_for_queued(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.queued_count() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        self.queued_count() >= count
    }

    /// Complete a buffer every `period` while acquisition runs.
    ///
    /// The thread exits once the camera is dropped.
    pub fn spawn_generator(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let camera: Weak<Self> = Arc::downgrade(self);
        thread::spawn(move || loop {
            thread::sleep(period);
            let Some(camera) = camera.upgrade() else {
                break;
            };
            if camera.is_acquiring() {
                camera.fire(FrameStatus::Complete);
            }
        })
    }
}

/// Deterministic pixels whose samples fit the format's bit depth
fn test_pattern(settings: &SimSettings, frame_id: u64) -> Vec<u8> {
    let len = settings.image_size();
    match settings.format.bits_per_pixel() {
        16 => {
            let depth = 16 - transform::shift_for(settings.format).unwrap_or(0);
            let mask = ((1u32 << depth) - 1) as u16;
            (0..len / 2)
                .flat_map(|i| ((frame_id as usize + i) as u16 & mask).to_le_bytes())
                .collect()
        }
        _ => (0..len).map(|i| (frame_id as usize + i) as u8).collect(),
    }
}

impl FeatureAccess for SimulatedCamera {
    fn get_integer(&self, name: &str) -> Result<i64> {
        let state = self.lock();
        match name {
            features::WIDTH => Ok(state.settings.width as i64),
            features::HEIGHT => Ok(state.settings.height as i64),
            _ => Err(StreamError::device("FeatureIntGet", ErrorCode::NOT_FOUND)),
        }
    }

    fn get_enum(&self, name: &str) -> Result<String> {
        let state = self.lock();
        match name {
            features::PIXEL_FORMAT => Ok(state.settings.format_name.clone()),
            _ => Err(StreamError::device("FeatureEnumGet", ErrorCode::NOT_FOUND)),
        }
    }

    fn enum_as_int(&self, name: &str, option: &str) -> Result<i64> {
        let state = self.lock();
        if name == features::PIXEL_FORMAT && option == state.settings.format_name {
            Ok(state.settings.format.0 as i64)
        } else {
            Err(StreamError::device("FeatureEnumAsInt", ErrorCode::NOT_FOUND))
        }
    }

    fn feature_info(&self, name: &str) -> Result<FeatureInfo> {
        let state = self.lock();
        let namespace = if name == features::PIXEL_FORMAT {
            state.settings.namespace.clone()
        } else {
            Some("Standard".into())
        };
        Ok(FeatureInfo {
            name: name.to_string(),
            namespace,
        })
    }

    fn run_command(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.call("FeatureCommandRun", Some(name))?;
        match name {
            features::ACQUISITION_START => state.acquiring = true,
            features::ACQUISITION_STOP => state.acquiring = false,
            _ => {}
        }
        Ok(())
    }

    fn is_command_done(&self, _: &str) -> bool {
        !self.lock().commands_hang
    }
}

impl CaptureApi for SimulatedCamera {
    fn query_payload_size(&self) -> Result<u32> {
        let mut state = self.lock();
        state.call("PayloadSizeGet", None)?;
        Ok(state.settings.image_size() as u32 + state.settings.padding)
    }

    fn announce(&self, announcement: &Announcement) -> std::result::Result<(), ErrorCode> {
        let mut state = self.lock();
        state
            .call("FrameAnnounce", None)
            .map_err(|e| e.code().unwrap_or(ErrorCode::UNKNOWN))?;
        if let Some((index, code)) = state.fail_announce_at {
            if index == state.announced.len() {
                return Err(code);
            }
        }
        debug!(token = ?announcement.token, "Buffer announced");
        state.announced.push(announcement.clone());
        Ok(())
    }

    fn revoke_all(&self) -> Result<()> {
        let mut state = self.lock();
        state.call("FrameRevokeAll", None)?;
        if !state.queued.is_empty() {
            return Err(StreamError::device("FrameRevokeAll", ErrorCode::BUSY));
        }
        state.announced.clear();
        Ok(())
    }

    fn capture_start(&self) -> Result<()> {
        let mut state = self.lock();
        state.call("CaptureStart", None)?;
        state.capturing = true;
        Ok(())
    }

    fn capture_end(&self) -> Result<()> {
        let mut state = self.lock();
        state.call("CaptureEnd", None)?;
        state.capturing = false;
        Ok(())
    }

    fn queue_flush(&self) -> Result<()> {
        let mut state = self.lock();
        state.call("CaptureQueueFlush", None)?;
        state.queued.clear();
        Ok(())
    }

    fn enqueue(&self, token: BufferToken, sink: CompletionSink) -> Result<()> {
        let mut state = self.lock();
        state.call("CaptureFrameQueue", None)?;
        if !state.announced.iter().any(|a| a.token == token) {
            return Err(StreamError::device("CaptureFrameQueue", ErrorCode::INVALID_CALL));
        }
        state.queued.push_back((token, sink));
        Ok(())
    }
}

impl CameraDevice for SimulatedCamera {
    fn local_device(&self) -> &dyn FeatureAccess {
        &self.clock
    }
}
