//! One-Shot Error Reporting
//!
//! Cycle-level errors get a short synthetic id on first emission and carry
//! a logged flag; when the same error object surfaces again it is logged
//! by id only. Messages are scrubbed against the configured secret list
//! before they reach the log stream.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::error;

/// An error message with a synthetic id and one-shot logging.
#[derive(Debug)]
pub struct TaggedError {
    pub id: String,
    message: String,
    logged: AtomicBool,
}

impl TaggedError {
    fn new(id: String, message: String) -> Self {
        Self {
            id,
            message,
            logged: AtomicBool::new(false),
        }
    }

    /// Emit the full payload on first call, the id alone afterwards.
    pub fn log(&self) {
        if self.logged.swap(true, Ordering::Relaxed) {
            error!(id = %self.id, "error resurfaced");
        } else {
            error!(id = %self.id, "{}", self.message);
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for TaggedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error[{}]: {}", self.id, self.message)
    }
}

impl std::error::Error for TaggedError {}

/// Assigns ids and scrubs secrets.
#[derive(Debug)]
pub struct ErrorReporter {
    secrets: Vec<String>,
    counter: AtomicU64,
}

impl ErrorReporter {
    #[must_use]
    pub fn new(secrets: Vec<String>) -> Self {
        Self {
            secrets: secrets.into_iter().filter(|s| !s.is_empty()).collect(),
            counter: AtomicU64::new(1),
        }
    }

    /// Replace every configured secret with a placeholder.
    #[must_use]
    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            out = out.replace(secret.as_str(), "<redacted>");
        }
        out
    }

    /// Wrap an error chain in a `TaggedError`. Chains that already carry a
    /// tag are returned untouched so the id survives re-wrapping layers.
    pub fn tag(&self, err: anyhow::Error) -> anyhow::Error {
        if err.downcast_ref::<TaggedError>().is_some() {
            return err;
        }
        let id = format!("{:06x}", self.counter.fetch_add(1, Ordering::Relaxed));
        let message = self.scrub(&format!("{err:#}"));
        err.context(TaggedError::new(id, message))
    }

    /// Log an error with one-shot semantics, tagging it first if needed.
    pub fn report(&self, err: anyhow::Error) -> anyhow::Error {
        let err = self.tag(err);
        if let Some(tagged) = err.downcast_ref::<TaggedError>() {
            tagged.log();
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn scrub_replaces_secrets() {
        let reporter = ErrorReporter::new(vec!["hunter2".into(), String::new()]);
        assert_eq!(
            reporter.scrub("key hunter2 leaked to hunter2"),
            "key <redacted> leaked to <redacted>"
        );
        assert_eq!(reporter.scrub("clean"), "clean");
    }

    #[test]
    fn tagging_is_idempotent() {
        let reporter = ErrorReporter::new(vec![]);
        let tagged = reporter.tag(anyhow!("boom"));
        let id = tagged.downcast_ref::<TaggedError>().unwrap().id.clone();

        let retagged = reporter.tag(tagged);
        assert_eq!(retagged.downcast_ref::<TaggedError>().unwrap().id, id);
    }

    #[test]
    fn ids_are_unique_and_messages_scrubbed() {
        let reporter = ErrorReporter::new(vec!["s3cret".into()]);
        let a = reporter.tag(anyhow!("first s3cret"));
        let b = reporter.tag(anyhow!("second"));

        let ta = a.downcast_ref::<TaggedError>().unwrap();
        let tb = b.downcast_ref::<TaggedError>().unwrap();
        assert_ne!(ta.id, tb.id);
        assert!(ta.message().contains("<redacted>"));
        assert!(!ta.message().contains("s3cret"));
    }

    #[test]
    fn log_flips_the_flag_once() {
        let reporter = ErrorReporter::new(vec![]);
        let err = reporter.tag(anyhow!("boom"));
        let tagged = err.downcast_ref::<TaggedError>().unwrap();
        assert!(!tagged.logged.load(Ordering::Relaxed));
        tagged.log();
        assert!(tagged.logged.load(Ordering::Relaxed));
        // Second call takes the id-only path; the flag stays set.
        tagged.log();
        assert!(tagged.logged.load(Ordering::Relaxed));
    }
}
