//! C4 `Dedup`: remove near-duplicate rectified captures using a
//! sensitivity-derived Hamming distance threshold.

use sheetcap_models::{PerceptualHash, RectifiedCapture, Sensitivity};

use crate::roi_tracker::TrackerEvent;

pub struct Dedup {
    sensitivity: Sensitivity,
    last_emitted_hash: Option<PerceptualHash>,
}

impl Dedup {
    pub fn new(sensitivity: Sensitivity) -> Self {
        Self {
            sensitivity,
            last_emitted_hash: None,
        }
    }

    /// Decide whether `capture` should be emitted, given the tracker event
    /// observed for its source frame. Always emits on `page_transition` so a
    /// real page turn is never collapsed (§4.4).
    pub fn should_emit(&mut self, capture: &RectifiedCapture, event: TrackerEvent) -> bool {
        let emit = event == TrackerEvent::PageTransition
            || match self.last_emitted_hash {
                None => true,
                Some(last) => capture.hash.hamming_distance(&last) > self.sensitivity.dedupe_threshold(),
            };
        if emit {
            self.last_emitted_hash = Some(capture.hash);
        }
        emit
    }

    /// Filter a sequence of `(capture, tracker_event)` pairs, preserving
    /// input order (§4.4 contract, §8 invariant 3).
    pub fn filter(
        &mut self,
        captures: impl IntoIterator<Item = (RectifiedCapture, TrackerEvent)>,
    ) -> Vec<RectifiedCapture> {
        captures
            .into_iter()
            .filter_map(|(capture, event)| {
                if self.should_emit(&capture, event) {
                    Some(capture)
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcap_models::BoundingBox;

    fn capture(hash: u64) -> RectifiedCapture {
        RectifiedCapture::new(0, PerceptualHash(hash), BoundingBox { x: 0, y: 0, width: 10, height: 10 }, 100, 100, vec![0; 100 * 100 * 3])
    }

    #[test]
    fn suppresses_near_identical_hashes() {
        let mut dedup = Dedup::new(Sensitivity::Normal);
        assert!(dedup.should_emit(&capture(0b0000), TrackerEvent::None));
        assert!(!dedup.should_emit(&capture(0b0001), TrackerEvent::None));
    }

    #[test]
    fn emits_beyond_threshold() {
        let mut dedup = Dedup::new(Sensitivity::Sensitive);
        assert!(dedup.should_emit(&capture(0), TrackerEvent::None));
        assert!(dedup.should_emit(&capture(0xFF), TrackerEvent::None));
    }

    #[test]
    fn page_transition_always_emits() {
        let mut dedup = Dedup::new(Sensitivity::Aggressive);
        assert!(dedup.should_emit(&capture(0), TrackerEvent::None));
        assert!(dedup.should_emit(&capture(0), TrackerEvent::PageTransition));
    }

    #[test]
    fn output_length_never_exceeds_input() {
        let mut dedup = Dedup::new(Sensitivity::Normal);
        let input: Vec<_> = (0..5u64).map(|i| (capture(i), TrackerEvent::None)).collect();
        let output = dedup.filter(input.clone());
        assert!(output.len() <= input.len());
    }
}
