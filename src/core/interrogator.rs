//! Interrogation contract and result-bag merging.
//!
//! The engine treats the interrogator as an opaque collaborator: one call per
//! work item, mapping `(model, image, threshold)` to tag and rating scores.
//! The only per-item transformation the engine performs is merging the two
//! score maps into a single bag, prefixing rating labels so they cannot
//! collide with tag labels.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::EngineError;

/// Label-to-score mapping produced for one work item.
pub type ResultBag = HashMap<String, f32>;

/// Raw output of one interrogation call, before bag merging.
#[derive(Debug, Clone, Default)]
pub struct InterrogationOutput {
    /// Tag labels and their confidence scores.
    pub tags: HashMap<String, f32>,
    /// Rating labels and their confidence scores.
    pub ratings: HashMap<String, f32>,
}

impl InterrogationOutput {
    /// Merge tags and ratings into a single bag, prefixing rating labels.
    pub fn into_bag(self, rating_prefix: &str) -> ResultBag {
        let mut bag = self.tags;
        for (label, score) in self.ratings {
            bag.insert(format!("{rating_prefix}{label}"), score);
        }
        bag
    }
}

/// Abstraction for the external worker that classifies one image.
///
/// Recoverable per-item failures must be returned as `Err`, never panicked;
/// the engine isolates each failure to the one caller awaiting that item.
#[async_trait]
pub trait Interrogator: Send + Sync + 'static {
    /// Classify a single image with the named model at the given threshold.
    async fn interrogate(
        &self,
        model: &str,
        image: &[u8],
        threshold: f32,
    ) -> Result<InterrogationOutput, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bag_merge_prefixes_ratings() {
        let output = InterrogationOutput {
            tags: HashMap::from([("cat".to_string(), 0.9), ("outdoors".to_string(), 0.4)]),
            ratings: HashMap::from([("general".to_string(), 0.8)]),
        };

        let bag = output.into_bag("rating:");
        assert_eq!(bag.len(), 3);
        assert_eq!(bag["cat"], 0.9);
        assert_eq!(bag["rating:general"], 0.8);
    }

    #[test]
    fn test_bag_merge_avoids_label_collision() {
        // A rating named like a tag must not clobber the tag's score.
        let output = InterrogationOutput {
            tags: HashMap::from([("general".to_string(), 0.1)]),
            ratings: HashMap::from([("general".to_string(), 0.95)]),
        };

        let bag = output.into_bag("rating:");
        assert_eq!(bag["general"], 0.1);
        assert_eq!(bag["rating:general"], 0.95);
    }
}
