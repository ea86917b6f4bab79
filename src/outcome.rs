//! Result triples for schema runtime methods.
//!
//! Schema methods never fail by throwing; they return whatever value could
//! be produced together with the exception and warning trees collected
//! along the way. Callers decide whether a non-empty exception tree is
//! fatal.

use crate::exception::{ExceptionScope, ExceptionTree};

/// The `(value, exception, warning)` triple returned by schema methods.
///
/// `value` is present when the operation could produce one, even if
/// warnings were recorded. `error` is present iff at least one error
/// message was recorded.
///
/// # Examples
/// ```
/// use oas_enforcer::Outcome;
///
/// let outcome = Outcome::ok(42);
/// assert_eq!(outcome.into_result().unwrap(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: Option<T>,
    pub error: Option<ExceptionTree>,
    pub warning: Option<ExceptionTree>,
}

impl<T> Outcome<T> {
    /// An outcome carrying only a value.
    pub fn ok(value: T) -> Self {
        Outcome {
            value: Some(value),
            error: None,
            warning: None,
        }
    }

    /// Assembles an outcome from a produced value and the scopes the
    /// operation wrote into. The value is dropped when errors exist.
    pub fn from_scopes(value: Option<T>, exception: ExceptionScope, warn: ExceptionScope) -> Self {
        let error = exception.into_option();
        Outcome {
            value: if error.is_some() { None } else { value },
            error,
            warning: warn.into_option(),
        }
    }

    /// True iff no error was recorded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into a standard `Result`, discarding warnings.
    pub fn into_result(self) -> Result<T, ExceptionTree> {
        match (self.value, self.error) {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => Err(ExceptionTree::new("Operation produced no value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_outcome_converts() {
        let outcome = Outcome::ok("x");
        assert!(outcome.is_ok());
        assert_eq!(outcome.into_result().unwrap(), "x");
    }

    #[test]
    fn error_scope_drops_value() {
        let exception = ExceptionScope::new("errors");
        let warn = ExceptionScope::new("warnings");
        exception.at("a").message("bad");
        let outcome = Outcome::from_scopes(Some(1), exception, warn);
        assert!(!outcome.is_ok());
        assert!(outcome.value.is_none());
        assert!(outcome.into_result().is_err());
    }

    #[test]
    fn warnings_keep_value() {
        let exception = ExceptionScope::new("errors");
        let warn = ExceptionScope::new("warnings");
        warn.at("format").message("Non standard format");
        let outcome = Outcome::from_scopes(Some(1), exception, warn);
        assert!(outcome.is_ok());
        assert_eq!(outcome.value, Some(1));
        assert!(outcome.warning.is_some());
    }
}
