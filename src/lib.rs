//! plate-watch
//!
//! License-plate sighting aggregation for a single camera stream.
//!
//! # Architecture
//!
//! A background capture loop pulls frames from a source and hands each one to
//! the frame pipeline, which:
//!
//! 1. Draws the detection band (ROI) on the output frame.
//! 2. Skips detection while the global cooldown is active.
//! 3. Finds vehicles whose vertical center falls inside the band, then reads
//!    character tokens from each vehicle crop.
//! 4. Orders tokens left to right, moves province tokens last and normalizes
//!    them into a plate and a province.
//! 5. Merges the reading into a small rolling window of recent sightings and
//!    appends one row per reading to the detection log.
//!
//! The annotated frame is published to a single-slot shared buffer that any
//! number of consumers can copy from.
//!
//! # Module Structure
//!
//! - `matcher`: plate comparison and merge policy
//! - `window`: rolling window of recent sightings
//! - `detect`: detector backends (stub, ONNX via tract) and geometry
//! - `normalize`: token labels to plate/province text
//! - `storage`: vehicle registry and detection log (SQLite, in-memory)
//! - `frame`: shared frame slot, snapshots, overlay
//! - `pipeline`: per-frame processing and the operator control surface
//! - `ingest`: frame sources
//! - `capture`: background capture loop
//! - `config`: daemon configuration

pub mod capture;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod matcher;
pub mod normalize;
pub mod pipeline;
pub mod storage;
pub mod window;

pub use capture::{CaptureHandle, CaptureLoop, CaptureStats};
pub use detect::{BackendRegistry, BoundingBox, Detection, DetectionCapability, DetectorBackend};
pub use frame::SharedFrame;
pub use ingest::{open_source, FrameSource};
pub use matcher::{better_plate, is_same_plate, time_diff_seconds};
pub use normalize::{ThaiPlateNormalizer, TokenNormalizer};
pub use pipeline::{FrameOutcome, FramePipeline, PipelineConfig, PipelineControl, PipelineStats};
pub use storage::{DetectionRecord, InMemoryStore, PlateStore, SqliteStore};
pub use window::{DetectionEvent, DetectionWindow};
