//! Image scorer collaborators
//!
//! Image models are black boxes: given one lesion image they return the
//! probability of malignancy. Held-out lesions are scored by every scorer and
//! the outputs become the `predictions__{i}` columns of a score table.

use rayon::prelude::*;

use crate::error::{PipelineError, Result};
use crate::table::ScoreTable;

/// A black-box image model
pub trait ImageScorer: Send + Sync {
    /// Scorer name for messages
    fn name(&self) -> &str;

    /// Probability of malignancy for one encoded image, in `[0, 1]`
    ///
    /// # Errors
    /// Returns an error if the image cannot be scored
    fn score(&self, image: &[u8]) -> Result<f64>;
}

/// One held-out lesion image
#[derive(Debug, Clone, Copy)]
pub struct LesionImage<'a> {
    /// Lesion id
    pub lesion_id: &'a str,
    /// Patient id
    pub patient_id: &'a str,
    /// Encoded image bytes
    pub image: &'a [u8],
}

/// Score every image with every scorer
///
/// # Arguments
/// * `scorers` - Scorers, scorer `i` fills column `{prefix}{i}`
/// * `images` - Held-out lesion images
/// * `prefix` - Column prefix, usually `predictions__`
///
/// # Errors
/// Returns an error if a scorer fails or returns a value outside `[0, 1]`
pub fn score_held_out(
    scorers: &[&dyn ImageScorer],
    images: &[LesionImage<'_>],
    prefix: &str,
) -> Result<ScoreTable> {
    let mut table = ScoreTable::new(
        "held_out_images",
        images.iter().map(|i| i.lesion_id.to_string()).collect(),
        Some(images.iter().map(|i| i.patient_id.to_string()).collect()),
    )?;
    for (idx, scorer) in scorers.iter().enumerate() {
        let scores = images
            .par_iter()
            .map(|image| {
                let p = scorer.score(image.image)?;
                if (0.0..=1.0).contains(&p) {
                    Ok(p)
                } else {
                    Err(PipelineError::Model(format!(
                        "scorer '{}' returned {p} for lesion '{}'",
                        scorer.name(),
                        image.lesion_id
                    )))
                }
            })
            .collect::<Result<Vec<f64>>>()?;
        table.set_column(format!("{prefix}{idx}"), scores)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MeanByte;

    impl ImageScorer for MeanByte {
        fn name(&self) -> &str {
            "mean_byte"
        }

        fn score(&self, image: &[u8]) -> Result<f64> {
            let total: f64 = image.iter().map(|&b| f64::from(b)).sum();
            Ok(total / (255.0 * image.len().max(1) as f64))
        }
    }

    struct Broken;

    impl ImageScorer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn score(&self, _image: &[u8]) -> Result<f64> {
            Ok(1.5)
        }
    }

    #[test]
    fn test_each_scorer_fills_one_column() {
        let images = [
            LesionImage {
                lesion_id: "a",
                patient_id: "p",
                image: &[255, 255],
            },
            LesionImage {
                lesion_id: "b",
                patient_id: "p",
                image: &[0, 255],
            },
        ];
        let table = score_held_out(&[&MeanByte, &MeanByte], &images, "predictions__").unwrap();
        assert_eq!(table.column("predictions__0").unwrap(), &[1.0, 0.5]);
        assert!(table.column("predictions__1").is_ok());
    }

    #[test]
    fn test_out_of_range_scores_are_rejected() {
        let images = [LesionImage {
            lesion_id: "a",
            patient_id: "p",
            image: &[1],
        }];
        assert!(score_held_out(&[&Broken], &images, "predictions__").is_err());
    }
}
