//! Classification of failed agent invocations.

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

/// What a failed invocation's output says about retrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient provider trouble; back off, maybe fall back to another model.
    Retryable,
    /// Account or permission trouble that another model will not fix.
    /// Retried on the same model, never a fallback trigger.
    Fatal,
    /// No known marker.
    Unclassified,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Fatal => "fatal",
            Self::Unclassified => "unclassified",
        }
    }
}

/// Maps agent output to a [`FailureClass`].
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, output: &str) -> FailureClass;
}

const RETRYABLE_MARKERS: &[&str] = &[
    r"rate[\s_-]?limit",
    r"\b429\b",
    r"overloaded",
    r"\b529\b",
    r"\b50[0234]\b",
    r"internal server error",
    r"service unavailable",
    r"bad gateway",
    r"connection reset",
    r"\betimedout\b",
    r"temporarily unavailable",
];

const FATAL_MARKERS: &[&str] = &[
    r"invalid[\s_-]?api[\s_-]?key",
    r"authentication failed",
    r"\bunauthori[sz]ed\b",
    r"\b401\b",
    r"permission denied",
    r"billing",
    r"quota exceeded",
];

static RETRYABLE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(RETRYABLE_MARKERS.iter().map(|p| format!("(?i){p}"))).expect("valid retryable markers")
});

static FATAL: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(FATAL_MARKERS.iter().map(|p| format!("(?i){p}"))).expect("valid fatal markers")
});

/// Marker-based classifier. Fatal markers win over retryable ones, so
/// such output never triggers a model fallback.
#[derive(Debug, Clone, Default)]
pub struct MarkerClassifier {
    extra_retryable: Vec<Regex>,
}

impl MarkerClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat output matching `pattern` as retryable too.
    pub fn with_retryable(mut self, pattern: Regex) -> Self {
        self.extra_retryable.push(pattern);
        self
    }
}

impl FailureClassifier for MarkerClassifier {
    fn classify(&self, output: &str) -> FailureClass {
        if FATAL.is_match(output) {
            FailureClass::Fatal
        } else if RETRYABLE.is_match(output) || self.extra_retryable.iter().any(|re| re.is_match(output)) {
            FailureClass::Retryable
        } else {
            FailureClass::Unclassified
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_markers() {
        let classifier = MarkerClassifier::new();
        for output in [
            "Error: Rate limit exceeded, try again later",
            "HTTP 429 Too Many Requests",
            "API Error: 529 {\"type\":\"overloaded_error\"}",
            "upstream returned 503 Service Unavailable",
            "read ECONNRESET: connection reset by peer",
            "connect ETIMEDOUT 10.0.0.1:443",
        ] {
            assert_eq!(classifier.classify(output), FailureClass::Retryable, "{output}");
        }
    }

    #[test]
    fn test_fatal_markers_win() {
        let classifier = MarkerClassifier::new();
        assert_eq!(classifier.classify("Invalid API key provided"), FailureClass::Fatal);
        assert_eq!(
            classifier.classify("429 rate limit; billing quota exceeded"),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_unclassified_and_word_boundaries() {
        let classifier = MarkerClassifier::new();
        assert_eq!(classifier.classify("thread 'main' panicked"), FailureClass::Unclassified);
        assert_eq!(classifier.classify("processed 5003 records"), FailureClass::Unclassified);
    }

    #[test]
    fn test_extra_retryable_pattern() {
        let classifier = MarkerClassifier::new().with_retryable(Regex::new("(?i)try again").unwrap());
        assert_eq!(classifier.classify("Please try again"), FailureClass::Retryable);
    }
}
