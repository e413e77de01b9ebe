//! Digest classification policy.

use serde::{Deserialize, Serialize};

/// Placeholder reason written for every digest until a real policy exists.
pub const PLACEHOLDER_REASON: &str = "DUMMY_REASON";

/// Outcome of classifying one digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the digest is of interest.
    pub flagged: bool,
    /// Free-form reason, written verbatim to the output.
    pub reason: String,
}

impl Verdict {
    pub fn new(flagged: bool, reason: impl Into<String>) -> Self {
        Self {
            flagged,
            reason: reason.into(),
        }
    }
}

/// Decides whether a digest is of interest.
///
/// Called once per successfully hashed file with the lowercase hex digest.
pub trait Classifier: Send + Sync {
    fn classify(&self, digest_hex: &str) -> Verdict;
}

impl<F> Classifier for F
where
    F: Fn(&str) -> Verdict + Send + Sync,
{
    fn classify(&self, digest_hex: &str) -> Verdict {
        self(digest_hex)
    }
}

/// Stand-in policy: never flags, always reports [`PLACEHOLDER_REASON`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderClassifier;

impl Classifier for PlaceholderClassifier {
    fn classify(&self, _digest_hex: &str) -> Verdict {
        Verdict::new(false, PLACEHOLDER_REASON)
    }
}
