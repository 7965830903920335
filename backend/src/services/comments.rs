//! Detection of non-authoritative observations.

use crate::api::Observation;

/// Decides whether an observation's comment marks it as a duplicate or a
/// correction that must stay out of every aggregate.
pub trait CommentClassifier: Send + Sync {
    fn is_non_authoritative(&self, comment: &str) -> bool;

    /// Whether `observation` is excluded from aggregation.
    fn excludes(&self, observation: &Observation) -> bool {
        observation
            .comment
            .as_deref()
            .is_some_and(|comment| self.is_non_authoritative(comment))
    }
}

/// Flags comments containing any configured marker, ignoring case.
#[derive(Debug, Clone, Default)]
pub struct MarkerCommentClassifier {
    markers: Vec<String>,
}

impl MarkerCommentClassifier {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }
}

impl CommentClassifier for MarkerCommentClassifier {
    fn is_non_authoritative(&self, comment: &str) -> bool {
        let comment = comment.to_lowercase();
        self.markers.iter().any(|marker| comment.contains(marker.as_str()))
    }
}
