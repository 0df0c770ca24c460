use thiserror::Error;
use tracing::{debug, error};

/// Why a pipeline stage could not produce a real estimate.
///
/// `InsufficientData` and `Degenerate` are normal while a match is young or
/// the input is flat; `Unexpected` means something upstream is broken and
/// is surfaced to operators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("insufficient data: need {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("degenerate input: {0}")]
    Degenerate(&'static str),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl AnalysisError {
    /// True for the silent fallbacks (not enough data, degenerate numerics).
    pub fn is_expected(&self) -> bool {
        !matches!(self, AnalysisError::Unexpected(_))
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Collapse a stage result into a value, substituting `neutral` on failure.
///
/// Expected failures are logged at debug level, unexpected ones at error
/// level so they show up in operator logs.
pub fn or_neutral<T>(stage: &str, result: AnalysisResult<T>, neutral: impl FnOnce() -> T) -> T {
    match result {
        Ok(value) => value,
        Err(e) if e.is_expected() => {
            debug!("{}: {} – using neutral result", stage, e);
            neutral()
        }
        Err(e) => {
            error!("{}: {} – using neutral result", stage, e);
            neutral()
        }
    }
}

/// Reject NaN / ±inf before they propagate into the models.
pub(crate) fn ensure_finite(values: &[f64], what: &str) -> AnalysisResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(idx) => Err(AnalysisError::Unexpected(format!(
            "non-finite {} at index {}: {}",
            what, idx, values[idx]
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_vs_unexpected() {
        assert!(AnalysisError::InsufficientData { needed: 10, got: 3 }.is_expected());
        assert!(AnalysisError::Degenerate("zero simulations").is_expected());
        assert!(!AnalysisError::Unexpected("boom".into()).is_expected());
    }

    #[test]
    fn or_neutral_substitutes_on_any_error() {
        let ok: AnalysisResult<i32> = Ok(7);
        assert_eq!(or_neutral("test", ok, || 0), 7);

        let short: AnalysisResult<i32> = Err(AnalysisError::InsufficientData { needed: 2, got: 1 });
        assert_eq!(or_neutral("test", short, || -1), -1);

        let bug: AnalysisResult<i32> = Err(AnalysisError::Unexpected("nan".into()));
        assert_eq!(or_neutral("test", bug, || -2), -2);
    }

    #[test]
    fn ensure_finite_reports_first_bad_index() {
        assert!(ensure_finite(&[1.0, 2.0], "goals").is_ok());
        let err = ensure_finite(&[1.0, f64::NAN, f64::INFINITY], "goals").unwrap_err();
        match err {
            AnalysisError::Unexpected(msg) => assert!(msg.contains("index 1"), "{}", msg),
            other => panic!("unexpected variant {:?}", other),
        }
    }
}
