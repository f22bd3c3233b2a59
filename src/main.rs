//! Framestream demo: streams from the simulated camera and reports throughput

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use color_eyre::Result;
use tracing::{info, warn};

use framestream::capture::sim::{SimSettings, SimulatedCamera};
use framestream::pipeline::FrameRingBuffer;
use framestream::{Config, StreamingEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "framestream=info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Framestream launching...");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    framestream::CONFIG.store(Arc::new(config.clone()));

    let camera = Arc::new(SimulatedCamera::new(SimSettings::default()));
    let _generator = camera.spawn_generator(Duration::from_millis(33));

    // Consumer only hands frames off; the drain loop below does the work
    let ring = Arc::new(Mutex::new(FrameRingBuffer::new(
        config.pipeline.ring_buffer_size,
    )));
    let producer = ring.clone();

    let engine = StreamingEngine::new(camera, &config);
    engine.start_configured(move |frame| {
        let mut ring = producer.lock().unwrap_or_else(PoisonError::into_inner);
        ring.push(frame);
    })?;

    let deadline = (config.pipeline.run_seconds > 0)
        .then(|| Instant::now() + Duration::from_secs(config.pipeline.run_seconds));
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_frame_id = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                let mut drained = 0usize;
                {
                    let mut ring = ring.lock().unwrap_or_else(PoisonError::into_inner);
                    while let Some(frame) = ring.pop() {
                        drained += 1;
                        last_frame_id = Some(frame.meta.frame_id);
                        if config.pipeline.enable_profiling {
                            info!(
                                frame_id = frame.meta.frame_id,
                                encoding = %frame.meta.encoding,
                                sec = frame.meta.stamp.sec,
                                nanosec = frame.meta.stamp.nanosec,
                                latency_us = frame.timestamp.elapsed().as_micros() as u64,
                                "Frame"
                            );
                        }
                    }
                    let (written, _, dropped) = ring.stats();
                    if dropped > 0 {
                        warn!(written, dropped, "Consumer falling behind");
                    }
                }
                let stats = engine.stats();
                info!(
                    drained,
                    delivered = stats.delivered,
                    incomplete = stats.incomplete,
                    last_frame_id = ?last_frame_id,
                    "Streaming"
                );
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
            }
        }
    }

    engine.stop()?;
    info!("Framestream shutting down");
    Ok(())
}
