//! Rolling window of recent plate sightings.
//!
//! The window merges repeated readings of the same physical plate into one
//! logical event. Eviction is FIFO by slot, but a merged event is moved to the
//! tail, so a vehicle that keeps being seen stays in the window.

use serde::{Serialize, Serializer};
use std::collections::VecDeque;

use crate::matcher::{better_plate, is_same_plate, time_diff_seconds};

/// Default number of sightings kept in the window.
pub const DEFAULT_WINDOW_CAPACITY: usize = 10;

/// Readings closer together than this are treated as the same sighting.
pub const DEFAULT_MERGE_SECONDS: f64 = 5.0;

/// One logical sighting of a plate.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub plate: String,
    pub province: Option<String>,
    /// Time of day of the latest reading, `HH:MM:SS`.
    #[serde(rename = "time")]
    pub timestamp: String,
    pub registered: bool,
    /// JPEG crop of the vehicle, hex-encoded when serialized.
    #[serde(serialize_with = "serialize_snapshot")]
    pub snapshot: Option<Vec<u8>>,
}

fn serialize_snapshot<S: Serializer>(
    snapshot: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match snapshot {
        Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
        None => serializer.serialize_none(),
    }
}

/// Bounded, insertion-ordered collection of recent sightings.
#[derive(Clone, Debug)]
pub struct DetectionWindow {
    events: VecDeque<DetectionEvent>,
    capacity: usize,
    merge_seconds: f64,
}

impl DetectionWindow {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_WINDOW_CAPACITY, DEFAULT_MERGE_SECONDS)
    }

    pub fn with_limits(capacity: usize, merge_seconds: f64) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            merge_seconds,
        }
    }

    /// Record a reading taken at `now` (`HH:MM:SS`).
    ///
    /// The first event, in window order, that matches the candidate and was
    /// last seen less than the merge interval ago absorbs the reading and is
    /// promoted to the tail. Otherwise a new event is appended and the oldest
    /// slot is dropped on overflow.
    ///
    /// Returns the finalized event and whether it is a new vehicle, or `None`
    /// for an empty candidate, which is never stored.
    pub fn record_detection(
        &mut self,
        candidate_plate: &str,
        province: Option<String>,
        now: &str,
        snapshot: Option<Vec<u8>>,
    ) -> Option<(DetectionEvent, bool)> {
        if candidate_plate.is_empty() {
            return None;
        }

        let matched = self.events.iter().position(|event| {
            is_same_plate(&event.plate, candidate_plate)
                && time_diff_seconds(&event.timestamp, now)
                    .is_ok_and(|diff| diff < self.merge_seconds)
        });

        if let Some(index) = matched {
            let mut event = self.events.remove(index)?;
            event.plate = better_plate(&event.plate, candidate_plate).to_string();
            event.timestamp = now.to_string();
            if snapshot.is_some() {
                event.snapshot = snapshot;
            }
            self.events.push_back(event.clone());
            return Some((event, false));
        }

        let event = DetectionEvent {
            plate: candidate_plate.to_string(),
            province,
            timestamp: now.to_string(),
            registered: false,
            snapshot,
        };
        self.events.push_back(event.clone());
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        Some((event, true))
    }

    /// Most recently recorded or merged event.
    pub fn latest_mut(&mut self) -> Option<&mut DetectionEvent> {
        self.events.back_mut()
    }

    /// Ordered copy of the window, oldest first.
    pub fn to_vec(&self) -> Vec<DetectionEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetectionEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DetectionWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plates(window: &DetectionWindow) -> Vec<&str> {
        window.iter().map(|e| e.plate.as_str()).collect()
    }

    #[test]
    fn new_plate_is_appended() {
        let mut window = DetectionWindow::new();
        let (event, is_new) = window
            .record_detection("กข1234", Some("กรุงเทพมหานคร".into()), "10:00:00", None)
            .unwrap();
        assert!(is_new);
        assert_eq!(event.plate, "กข1234");
        assert_eq!(event.province.as_deref(), Some("กรุงเทพมหานคร"));
        assert_eq!(event.timestamp, "10:00:00");
        assert!(!event.registered);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn empty_candidate_is_not_stored() {
        let mut window = DetectionWindow::new();
        assert!(window
            .record_detection("", Some("ภูเก็ต".into()), "10:00:00", None)
            .is_none());
        assert!(window.is_empty());
    }

    #[test]
    fn capacity_keeps_most_recent_insertions() {
        let mut window = DetectionWindow::new();
        for i in 0..15 {
            let plate = format!("{}", 1000 + i * 111);
            let stamp = format!("10:{:02}:00", i);
            window.record_detection(&plate, None, &stamp, None);
            assert!(window.len() <= DEFAULT_WINDOW_CAPACITY);
        }
        let expected: Vec<String> = (5..15).map(|i| format!("{}", 1000 + i * 111)).collect();
        assert_eq!(plates(&window), expected);
    }

    #[test]
    fn merge_promotes_matched_event_to_tail() {
        let mut window = DetectionWindow::new();
        window.record_detection("1234", None, "10:00:00", None);
        window.record_detection("5678", None, "10:00:01", None);
        let (event, is_new) = window
            .record_detection("กข1234", None, "10:00:03", Some(vec![1, 2, 3]))
            .unwrap();

        assert!(!is_new);
        assert_eq!(event.plate, "กข1234");
        assert_eq!(event.timestamp, "10:00:03");
        assert_eq!(event.snapshot, Some(vec![1, 2, 3]));
        assert_eq!(plates(&window), vec!["5678", "กข1234"]);
    }

    #[test]
    fn merge_keeps_snapshot_when_none_given() {
        let mut window = DetectionWindow::new();
        window.record_detection("1234", None, "10:00:00", Some(vec![9]));
        let (event, _) = window
            .record_detection("1234", None, "10:00:02", None)
            .unwrap();
        assert_eq!(event.snapshot, Some(vec![9]));
    }

    #[test]
    fn merge_keeps_original_province() {
        let mut window = DetectionWindow::new();
        window.record_detection("1234", Some("ชลบุรี".into()), "10:00:00", None);
        let (event, is_new) = window
            .record_detection("1234", Some("ภูเก็ต".into()), "10:00:01", None)
            .unwrap();
        assert!(!is_new);
        assert_eq!(event.province.as_deref(), Some("ชลบุรี"));
    }

    #[test]
    fn stale_match_creates_new_event() {
        let mut window = DetectionWindow::new();
        window.record_detection("1234", None, "10:00:00", None);
        let (_, is_new) = window
            .record_detection("1234", None, "10:00:05", None)
            .unwrap();
        assert!(is_new);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn first_match_in_window_order_wins() {
        let mut window = DetectionWindow::new();
        window.record_detection("12", None, "10:00:00", None);
        window.record_detection("5678", None, "10:00:00", None);
        window.record_detection("1234", None, "10:00:01", None);
        // "12" was merged into by "1234", so the window holds two entries.
        assert_eq!(plates(&window), vec!["5678", "1234"]);
    }

    #[test]
    fn midnight_straddle_does_not_merge() {
        let mut window = DetectionWindow::new();
        window.record_detection("1234", None, "23:59:59", None);
        let (_, is_new) = window
            .record_detection("1234", None, "00:00:01", None)
            .unwrap();
        assert!(is_new);
    }

    #[test]
    fn unparseable_timestamp_never_merges() {
        let mut window = DetectionWindow::new();
        window.record_detection("1234", None, "garbage", None);
        let (_, is_new) = window
            .record_detection("1234", None, "10:00:00", None)
            .unwrap();
        assert!(is_new);
    }

    #[test]
    fn serializes_snapshot_as_hex() {
        let mut window = DetectionWindow::new();
        window.record_detection("1234", None, "10:00:00", Some(vec![0xab, 0x01]));
        let json = serde_json::to_value(window.to_vec()).unwrap();
        assert_eq!(json[0]["plate"], "1234");
        assert_eq!(json[0]["time"], "10:00:00");
        assert_eq!(json[0]["snapshot"], "ab01");
        assert_eq!(json[0]["province"], serde_json::Value::Null);
    }
}
