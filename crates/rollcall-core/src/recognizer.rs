//! Best-match recognition of face regions against the face store.
//!
//! Every record is scored on every call (O(records) per region); there is
//! no index, since histogram correlation has no incremental form.

use crate::histogram::Histogram;
use crate::store::FaceStore;
use crate::types::{FaceRecord, Recognition, Template};
use image::GrayImage;

/// Minimum score a best match must exceed to count as known.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Similarity between two normalized templates. Higher = more similar.
pub trait Similarity {
    fn score(&self, a: &Template, b: &Template) -> f64;
}

/// Correlation of 256-bin intensity histograms, in [-1, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramCorrelation;

impl Similarity for HistogramCorrelation {
    fn score(&self, a: &Template, b: &Template) -> f64 {
        Histogram::of(a.image()).correlation(&Histogram::of(b.image()))
    }
}

/// Stateless known/unknown classifier over a gallery of face records.
#[derive(Debug, Clone)]
pub struct Recognizer<S = HistogramCorrelation> {
    similarity: S,
    threshold: f64,
}

impl Recognizer {
    pub fn new(threshold: f64) -> Self {
        Self::with_similarity(HistogramCorrelation, threshold)
    }
}

impl Default for Recognizer {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl<S: Similarity> Recognizer<S> {
    pub fn with_similarity(similarity: S, threshold: f64) -> Self {
        Self { similarity, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Normalize a face region and match it against the store.
    pub fn recognize(&self, face: &GrayImage, store: &FaceStore) -> Recognition {
        self.best_match(&Template::from_image(face), store.records())
    }

    /// Pick the highest-scoring record; the earliest record wins ties.
    ///
    /// The best score must be strictly greater than the threshold.
    pub fn best_match(&self, probe: &Template, gallery: &[FaceRecord]) -> Recognition {
        let mut best: Option<(f64, &FaceRecord)> = None;

        for record in gallery {
            let score = self.similarity.score(probe, &record.template);
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, record));
            }
        }

        match best {
            Some((score, record)) if score > self.threshold => Recognition::Known {
                id: record.id,
                name: record.name.clone(),
                score,
            },
            _ => Recognition::Unknown {
                best_score: best.map(|(score, _)| score),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Scores by the absolute difference of the top-left pixel.
    struct PixelDistance;

    impl Similarity for PixelDistance {
        fn score(&self, a: &Template, b: &Template) -> f64 {
            let pa = a.image().get_pixel(0, 0)[0] as f64;
            let pb = b.image().get_pixel(0, 0)[0] as f64;
            1.0 - (pa - pb).abs() / 255.0
        }
    }

    fn record(id: u32, name: &str, level: u8) -> FaceRecord {
        FaceRecord {
            id,
            name: name.into(),
            template: Template::from_image(&GrayImage::from_pixel(100, 100, Luma([level]))),
        }
    }

    fn probe(level: u8) -> Template {
        Template::from_image(&GrayImage::from_pixel(100, 100, Luma([level])))
    }

    #[test]
    fn test_histogram_correlation_self_is_max() {
        let face = GrayImage::from_fn(100, 100, |x, y| Luma([((x * 3 + y * 5) % 256) as u8]));
        let t = Template::from_image(&face);
        assert!((HistogramCorrelation.score(&t, &t) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_best_match_picks_highest_score() {
        let recognizer = Recognizer::with_similarity(PixelDistance, 0.7);
        let gallery = vec![record(1, "bob", 10), record(2, "alice", 200), record(3, "carol", 100)];

        let result = recognizer.best_match(&probe(198), &gallery);
        match result {
            Recognition::Known { id, name, score } => {
                assert_eq!(id, 2);
                assert_eq!(name, "alice");
                assert!(score > 0.99);
            }
            other => panic!("expected a known match, got {other:?}"),
        }
    }

    #[test]
    fn test_best_match_tie_goes_to_first() {
        let recognizer = Recognizer::with_similarity(PixelDistance, 0.7);
        let gallery = vec![record(1, "first", 50), record(2, "second", 50)];

        let result = recognizer.best_match(&probe(50), &gallery);
        assert!(matches!(result, Recognition::Known { id: 1, .. }));
    }

    #[test]
    fn test_best_match_below_threshold_is_unknown() {
        let recognizer = Recognizer::with_similarity(PixelDistance, 0.7);
        let gallery = vec![record(1, "dark", 0)];

        let result = recognizer.best_match(&probe(255), &gallery);
        assert_eq!(result, Recognition::Unknown { best_score: Some(0.0) });
    }

    #[test]
    fn test_best_match_at_threshold_is_unknown() {
        // Score must strictly exceed the threshold
        let recognizer = Recognizer::with_similarity(PixelDistance, 1.0);
        let gallery = vec![record(1, "exact", 80)];

        let result = recognizer.best_match(&probe(80), &gallery);
        assert!(!result.is_known());
    }

    #[test]
    fn test_best_match_empty_gallery() {
        let recognizer = Recognizer::default();
        let result = recognizer.best_match(&probe(128), &[]);
        assert_eq!(result, Recognition::Unknown { best_score: None });
    }

    #[test]
    fn test_recognize_empty_store_is_unknown() {
        let store = FaceStore::new("unused");
        let face = GrayImage::from_fn(37, 53, |x, y| Luma([(x + y) as u8]));
        assert_eq!(
            Recognizer::default().recognize(&face, &store),
            Recognition::Unknown { best_score: None }
        );
    }

    #[test]
    fn test_recognize_is_deterministic() {
        let mut store = FaceStore::new("unused");
        let alice = GrayImage::from_fn(120, 90, |x, y| Luma([((x * y) % 256) as u8]));
        let bob = GrayImage::from_fn(120, 90, |x, _| Luma([(x * 2) as u8]));
        store.push("alice", Template::from_image(&alice));
        store.push("bob", Template::from_image(&bob));

        let recognizer = Recognizer::default();
        let first = recognizer.recognize(&alice, &store);
        for _ in 0..5 {
            assert_eq!(recognizer.recognize(&alice, &store), first);
        }
        assert!(matches!(first, Recognition::Known { id: 1, .. }));
    }
}
