//! Token-to-plate normalization.
//!
//! A normalizer turns the ordered class labels found on a plate into a plate
//! string and a province string. The pipeline only relies on the
//! [`TokenNormalizer`] trait; [`ThaiPlateNormalizer`] is the stock
//! implementation for Thai plates.

mod thai;

pub use thai::{split_plate_and_province, ThaiPlateNormalizer, PROVINCES, THAI_CONSONANTS};

/// Converts ordered token labels into `(plate, province)`.
///
/// Either part may be empty when it could not be read.
pub trait TokenNormalizer: Send {
    /// Returns true when `label` names a province glyph group.
    ///
    /// Province tokens are moved after all other tokens before `normalize` is
    /// called.
    fn is_province(&self, label: &str) -> bool;

    fn normalize(&self, labels: &[String]) -> (String, String);
}
