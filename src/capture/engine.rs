//! Capture session state machine and buffer pool
//!
//! Start: announce -> capture start -> queue -> AcquisitionStart.
//! Stop: AcquisitionStop -> capture end -> flush -> revoke -> release.
//!
//! Completions are pushed by the subsystem into a bounded channel and
//! handled on one dispatcher thread per streaming episode, so vendor
//! threads never run consumer code.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::buffer::FrameBuffer;
use crate::capture::command::{self, CommandPolicy};
use crate::capture::device::{
    features, BufferToken, CameraDevice, Completion, CompletionSink, Dispatch, FrameStatus,
};
use crate::capture::frame::Frame;
use crate::capture::timestamp::TimestampNormalizer;
use crate::error::{Result, StreamError};
use crate::pipeline::{StatsSnapshot, StreamStats};
use crate::{Config, StreamConfig};

/// Consumer of normalized frames. Runs on the dispatcher thread.
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Buffers of one streaming episode, indexed by token
struct BufferPool {
    generation: u64,
    buffers: Vec<Arc<FrameBuffer>>,
}

impl BufferPool {
    fn empty() -> Self {
        Self {
            generation: 0,
            buffers: Vec::new(),
        }
    }

    fn get(&self, token: BufferToken) -> Option<&Arc<FrameBuffer>> {
        if token.generation != self.generation {
            return None;
        }
        self.buffers.get(token.index)
    }
}

/// Dispatcher thread of one streaming episode
struct Dispatcher {
    tx: flume::Sender<Dispatch>,
    gate: Arc<RequeueGate>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Ask the thread to exit and wait for it, unless we are that thread
    fn shutdown(self) {
        self.gate.close();

        if self.handle.thread().id() == thread::current().id() {
            if self.tx.try_send(Dispatch::Shutdown).is_err() {
                warn!("Could not signal frame dispatcher from its own thread");
            }
            return;
        }

        let _ = self.tx.send(Dispatch::Shutdown);
        if self.handle.join().is_err() {
            error!("Frame dispatcher panicked");
        }
    }
}

struct Session {
    state: StreamState,
    payload_size: u32,
    generation: u64,
    dispatcher: Option<Dispatcher>,
}

/// Everything the dispatcher thread needs, detached from the engine borrow.
///
/// Holds only a weak sender: the channel disconnects once the engine and
/// the device have let go of theirs.
struct DispatchContext<D: CameraDevice> {
    device: Arc<D>,
    pool: Arc<ArcSwap<BufferPool>>,
    gate: Arc<RequeueGate>,
    stats: Arc<StreamStats>,
    tx: flume::WeakSender<Dispatch>,
    on_frame: FrameCallback,
}

impl<D: CameraDevice> DispatchContext<D> {
    fn run(self, rx: flume::Receiver<Dispatch>) {
        debug!("Frame dispatcher running");
        while let Ok(msg) = rx.recv() {
            match msg {
                Dispatch::Completion(completion) => self.handle(completion),
                Dispatch::Shutdown => break,
            }
        }
        debug!("Frame dispatcher exiting");
    }

    fn handle(&self, completion: Completion) {
        let pool = self.pool.load_full();
        let Some(buffer) = pool.get(completion.token) else {
            debug!(token = ?completion.token, "Dropping completion for released buffer");
            self.stats.record_stale();
            return;
        };

        if completion.status != FrameStatus::Complete {
            warn!("Frame with status {:?} received", completion.status);
            self.stats.record_incomplete();
            self.requeue(buffer);
            return;
        }

        let clock = TimestampNormalizer::new(self.device.local_device());
        let frame = buffer.complete(&completion, &clock);
        self.stats.record_delivered();

        let on_frame = &self.on_frame;
        if panic::catch_unwind(AssertUnwindSafe(|| on_frame(frame))).is_err() {
            error!(frame_id = completion.frame_id, "Frame consumer panicked");
        }

        self.requeue(buffer);
    }

    fn requeue(&self, buffer: &FrameBuffer) {
        let open = self.gate.lock();
        if !*open {
            return;
        }
        let Some(tx) = self.tx.upgrade() else {
            debug!("Completion channel closed, not requeueing");
            return;
        };
        let sink = CompletionSink::new(tx, self.stats.clone());
        if let Err(e) = buffer.queue(&*self.device, &sink) {
            warn!(index = buffer.token().index, "Requeue failed: {}", e);
            self.stats.record_requeue_failure();
        }
    }
}

/// Whether completed buffers of one episode go back to the device.
///
/// Held across the enqueue call so stop() cannot flush the queue while a
/// requeue is in flight. Once closed it stays closed; the next episode
/// gets a fresh gate.
#[derive(Default)]
struct RequeueGate(Mutex<bool>);

impl RequeueGate {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) {
        *self.lock() = true;
    }

    fn close(&self) {
        *self.lock() = false;
    }
}

/// How far a failed start got, so unwinding undoes only what was done
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Progress {
    Announced,
    CaptureStarted,
}

/// Drives one camera session through the start/stop protocol
pub struct StreamingEngine<D: CameraDevice + 'static> {
    device: Arc<D>,
    config: StreamConfig,
    policy: CommandPolicy,
    session: Mutex<Session>,
    pool: Arc<ArcSwap<BufferPool>>,
    streaming: AtomicBool,
    stats: Arc<StreamStats>,
}

impl<D: CameraDevice + 'static> StreamingEngine<D> {
    pub fn new(device: Arc<D>, config: &Config) -> Self {
        Self {
            device,
            config: config.stream.clone(),
            policy: CommandPolicy::from(&config.command),
            session: Mutex::new(Session {
                state: StreamState::Idle,
                payload_size: 0,
                generation: 0,
                dispatcher: None,
            }),
            pool: Arc::new(ArcSwap::from_pointee(BufferPool::empty())),
            streaming: AtomicBool::new(false),
            stats: Arc::new(StreamStats::default()),
        }
    }

    pub fn with_policy(mut self, policy: CommandPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn state(&self) -> StreamState {
        self.lock_session().state
    }

    /// Number of buffers currently owned by the pool
    pub fn buffer_count(&self) -> usize {
        self.pool.load().buffers.len()
    }

    /// Payload size reported when streaming last started
    pub fn payload_size(&self) -> u32 {
        self.lock_session().payload_size
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Start with the buffer count and acquisition flag from the configuration
    pub fn start_configured<F>(&self, on_frame: F) -> Result<()>
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        self.start(self.config.buffer_count, on_frame, self.config.start_acquisition)
    }

    /// Idle -> Streaming. A no-op when already streaming.
    ///
    /// On failure everything done so far is undone (best effort) and the
    /// first error is returned.
    #[instrument(skip(self, on_frame))]
    pub fn start<F>(&self, buffer_count: usize, on_frame: F, start_acquisition: bool) -> Result<()>
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        let mut session = self.lock_session();
        if session.state == StreamState::Streaming {
            debug!("Already streaming");
            return Ok(());
        }
        if buffer_count == 0 {
            return Err(StreamError::InvalidArgument(
                "buffer count must be at least 1".into(),
            ));
        }

        let payload_size = self.device.query_payload_size().inspect_err(|e| {
            error!("Payload size query failed: {}", e);
        })?;

        session.generation += 1;
        let generation = session.generation;

        let mut buffers = Vec::with_capacity(buffer_count);
        for index in 0..buffer_count {
            let token = BufferToken { generation, index };
            let buffer = FrameBuffer::create(
                &*self.device,
                token,
                payload_size as usize,
                self.config.buffer_alignment,
            )
            .inspect_err(|e| error!("Failed to create frame {}: {}", index, e))?;
            buffers.push(Arc::new(buffer));
        }

        for (index, buffer) in buffers.iter().enumerate() {
            if let Err(code) = self.device.announce(&buffer.announcement()) {
                error!("Announcing frame {} failed with {}", index, code);
                if index > 0 {
                    self.unwind(Progress::Announced);
                }
                return Err(StreamError::ResourceExhausted { index, code });
            }
        }

        self.pool.store(Arc::new(BufferPool {
            generation,
            buffers: buffers.clone(),
        }));

        // One slot per buffer plus the shutdown message
        let (tx, rx) = flume::bounded(buffer_count + 1);
        let sink = CompletionSink::new(tx.clone(), self.stats.clone());
        let gate = Arc::new(RequeueGate::default());
        let context = DispatchContext {
            device: self.device.clone(),
            pool: self.pool.clone(),
            gate: gate.clone(),
            stats: self.stats.clone(),
            tx: tx.downgrade(),
            on_frame: Arc::new(on_frame),
        };
        let handle = match thread::Builder::new()
            .name("frame-dispatch".into())
            .spawn(move || context.run(rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn frame dispatcher: {}", e);
                self.unwind(Progress::Announced);
                return Err(StreamError::Dispatcher(e));
            }
        };
        let dispatcher = Dispatcher { tx, gate, handle };

        if let Err(e) = self.device.capture_start() {
            error!("Capture start failed with {}", e);
            self.unwind(Progress::Announced);
            dispatcher.shutdown();
            return Err(e);
        }

        dispatcher.gate.open();
        for buffer in &buffers {
            if let Err(e) = buffer.queue(&*self.device, &sink) {
                error!("Queue frame failed with {}", e);
                dispatcher.gate.close();
                self.unwind(Progress::CaptureStarted);
                dispatcher.shutdown();
                return Err(e);
            }
        }

        if start_acquisition {
            if let Err(e) =
                command::run_command(&*self.device, features::ACQUISITION_START, &self.policy)
            {
                error!("Acquisition start failed with {}", e);
                dispatcher.gate.close();
                self.unwind(Progress::CaptureStarted);
                dispatcher.shutdown();
                return Err(e);
            }
        }

        session.payload_size = payload_size;
        session.dispatcher = Some(dispatcher);
        session.state = StreamState::Streaming;
        self.streaming.store(true, Ordering::Release);

        info!(
            buffers = buffer_count,
            payload_size, start_acquisition, "Streaming started"
        );
        Ok(())
    }

    /// Streaming -> Idle. A no-op when idle. Safe to call from any thread,
    /// including from inside the frame consumer.
    ///
    /// A failing AcquisitionStop or capture end is returned before anything
    /// else is touched and leaves the session streaming. Past capture end the
    /// session always ends up idle; a failing flush or revoke is returned
    /// after the remaining steps ran.
    #[instrument(skip(self))]
    pub fn stop(&self) -> Result<()> {
        let (dispatcher, result) = {
            let mut session = self.lock_session();
            if session.state == StreamState::Idle {
                return Ok(());
            }

            if let Err(e) =
                command::run_command(&*self.device, features::ACQUISITION_STOP, &self.policy)
            {
                error!("Acquisition stop failed with {}", e);
                return Err(e);
            }

            if let Err(e) = self.device.capture_end() {
                error!("Capture stop failed with {}", e);
                return Err(e);
            }

            if let Some(dispatcher) = &session.dispatcher {
                dispatcher.gate.close();
            }

            let mut result = self
                .device
                .queue_flush()
                .inspect_err(|e| error!("Flush capture queue failed with {}", e));
            if let Err(e) = self.device.revoke_all() {
                error!("Revoking frames failed with {}", e);
                result = result.and(Err(e));
            }

            (self.release(&mut session), result)
        };

        // Joined outside the lock so a consumer calling stop() cannot deadlock us
        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown();
        }

        if result.is_ok() {
            info!("Streaming stopped");
        }
        result
    }

    /// Undo capture regardless of errors, used when stop() failed on drop
    fn teardown(&self) {
        let dispatcher = {
            let mut session = self.lock_session();
            if session.state == StreamState::Idle {
                return;
            }
            if let Some(dispatcher) = &session.dispatcher {
                dispatcher.gate.close();
            }
            self.unwind(Progress::CaptureStarted);
            self.release(&mut session)
        };

        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown();
        }
        warn!("Streaming torn down after failed stop");
    }

    /// Best-effort device cleanup after a failed start. Errors are logged only.
    fn unwind(&self, progress: Progress) {
        if progress >= Progress::CaptureStarted {
            if let Err(e) = self.device.capture_end() {
                warn!("Capture end during unwind failed: {}", e);
            }
            if let Err(e) = self.device.queue_flush() {
                warn!("Queue flush during unwind failed: {}", e);
            }
        }
        if let Err(e) = self.device.revoke_all() {
            warn!("Revoke during unwind failed: {}", e);
        }

        self.pool.store(Arc::new(BufferPool::empty()));
    }

    /// Drop the pool and go idle, handing back the dispatcher to shut down
    fn release(&self, session: &mut Session) -> Option<Dispatcher> {
        self.pool.store(Arc::new(BufferPool::empty()));
        session.state = StreamState::Idle;
        self.streaming.store(false, Ordering::Release);
        session.dispatcher.take()
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: CameraDevice + 'static> Drop for StreamingEngine<D> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop streaming on drop: {}", e);
            self.teardown();
        }
    }
}
