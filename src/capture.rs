//! Background capture loop.
//!
//! Pulls frames from a [`FrameSource`], runs them through the
//! [`FramePipeline`] and publishes the annotated result into a
//! [`SharedFrame`]. End of stream rewinds the source. The loop checks its
//! running flag once per iteration and releases the source on every exit path.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::SharedFrame;
use crate::ingest::FrameSource;
use crate::pipeline::{FramePipeline, PipelineControl, PipelineStats};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub rewinds: u64,
    pub read_failures: u64,
}

/// Releases the wrapped source when dropped.
struct SourceGuard(Box<dyn FrameSource>);

impl Deref for SourceGuard {
    type Target = dyn FrameSource;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for SourceGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        log::info!("releasing {}", self.0.describe());
        self.0.release();
    }
}

pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    pipeline: FramePipeline,
    shared_frame: SharedFrame,
    interval: Duration,
    stats: Arc<Mutex<CaptureStats>>,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        pipeline: FramePipeline,
        shared_frame: SharedFrame,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            pipeline,
            shared_frame,
            interval,
            stats: Arc::new(Mutex::new(CaptureStats::default())),
        }
    }

    /// Run on a dedicated thread until [`CaptureHandle::stop`].
    pub fn spawn(self) -> Result<CaptureHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();
        let stats = self.stats.clone();
        let control = self.pipeline.control();
        let shared_frame = self.shared_frame.clone();
        let join = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || self.run_until(&running_thread))
            .map_err(|e| anyhow!("failed to spawn capture thread: {}", e))?;

        Ok(CaptureHandle {
            running,
            join: Some(join),
            stats,
            control,
            shared_frame,
        })
    }

    /// Run on the current thread while `running` is set.
    pub fn run_until(self, running: &AtomicBool) {
        let CaptureLoop {
            source,
            mut pipeline,
            shared_frame,
            interval,
            stats,
        } = self;
        let mut source = SourceGuard(source);
        log::info!("capture loop started on {}", source.describe());

        while running.load(Ordering::SeqCst) {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    bump(&stats, |s| s.frames_captured += 1);
                    let outcome = pipeline.process_frame(&frame);
                    if !outcome.plate.is_empty() {
                        log::debug!("frame read {} {}", outcome.plate, outcome.province);
                    }
                    if let Err(e) = shared_frame.write(outcome.frame) {
                        log::error!("failed to publish frame: {}", e);
                    }
                }
                Ok(None) => {
                    bump(&stats, |s| s.rewinds += 1);
                    if let Err(e) = source.rewind() {
                        log::warn!("rewind of {} failed: {:#}", source.describe(), e);
                    }
                }
                Err(e) => {
                    bump(&stats, |s| s.read_failures += 1);
                    log::warn!("frame read failed: {:#}", e);
                }
            }
            std::thread::sleep(interval);
        }

        log::info!("capture loop stopped");
    }
}

fn bump(stats: &Mutex<CaptureStats>, update: impl FnOnce(&mut CaptureStats)) {
    if let Ok(mut stats) = stats.lock() {
        update(&mut stats);
    }
}

/// Handle to a running capture thread.
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<CaptureStats>>,
    control: PipelineControl,
    shared_frame: SharedFrame,
}

impl CaptureHandle {
    /// Clear the running flag and wait for the thread to exit.
    pub fn stop(mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("capture thread panicked"))?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .join
                .as_ref()
                .map(|join| !join.is_finished())
                .unwrap_or(false)
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.control.stats()
    }

    pub fn control(&self) -> PipelineControl {
        self.control.clone()
    }

    pub fn shared_frame(&self) -> SharedFrame {
        self.shared_frame.clone()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
