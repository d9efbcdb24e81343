use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::Detection;

/// One scripted answer of a [`StubBackend`].
#[derive(Clone, Debug)]
pub enum StubResponse {
    Detections(Vec<Detection>),
    Fail(String),
}

/// Stub backend for testing and `stub://` runs.
///
/// Replays a script of responses, one per `detect` call, wrapping around at
/// the end. An empty script detects nothing.
pub struct StubBackend {
    capability: DetectionCapability,
    script: Vec<StubResponse>,
    cursor: usize,
    calls: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new(capability: DetectionCapability) -> Self {
        Self {
            capability,
            script: Vec::new(),
            cursor: 0,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_script(self, script: Vec<Vec<Detection>>) -> Self {
        self.with_responses(script.into_iter().map(StubResponse::Detections).collect())
    }

    pub fn with_responses(mut self, responses: Vec<StubResponse>) -> Self {
        self.script = responses;
        self.cursor = 0;
        self
    }

    /// Backend that fails every call.
    pub fn failing(capability: DetectionCapability, message: &str) -> Self {
        Self::new(capability).with_responses(vec![StubResponse::Fail(message.to_string())])
    }

    /// Shared counter of `detect` invocations.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        match self.capability {
            DetectionCapability::Vehicle => "stub-vehicle",
            DetectionCapability::Character => "stub-character",
        }
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        capability == self.capability
    }

    fn detect(&mut self, _image: &RgbImage, min_confidence: f32) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let response = &self.script[self.cursor % self.script.len()];
        self.cursor = self.cursor.wrapping_add(1);
        match response {
            StubResponse::Detections(detections) => Ok(detections
                .iter()
                .filter(|d| d.confidence >= min_confidence)
                .cloned()
                .collect()),
            StubResponse::Fail(message) => Err(anyhow!("{}", message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn stub_replays_script_and_wraps() {
        let mut backend = StubBackend::new(DetectionCapability::Character).with_script(vec![
            vec![Detection::new("1", 0.9, BoundingBox::new(0, 0, 2, 2))],
            vec![],
        ]);
        let counter = backend.call_counter();
        let image = RgbImage::new(4, 4);

        assert_eq!(backend.detect(&image, 0.3).unwrap().len(), 1);
        assert!(backend.detect(&image, 0.3).unwrap().is_empty());
        assert_eq!(backend.detect(&image, 0.3).unwrap().len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stub_applies_confidence_threshold() {
        let mut backend = StubBackend::new(DetectionCapability::Vehicle).with_script(vec![vec![
            Detection::new("car", 0.35, BoundingBox::new(0, 0, 2, 2)),
            Detection::new("car", 0.55, BoundingBox::new(2, 2, 4, 4)),
        ]]);
        let found = backend.detect(&RgbImage::new(4, 4), 0.4).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].confidence, 0.55);
    }

    #[test]
    fn failing_stub_errors() {
        let mut backend = StubBackend::failing(DetectionCapability::Vehicle, "model crashed");
        let err = backend.detect(&RgbImage::new(4, 4), 0.4).unwrap_err();
        assert_eq!(err.to_string(), "model crashed");
        assert!(backend.supports(DetectionCapability::Vehicle));
        assert!(!backend.supports(DetectionCapability::Character));
    }
}
