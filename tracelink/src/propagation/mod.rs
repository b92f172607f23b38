//! # Propagation interface
//!
//! Cross-cutting concerns send their state to the next process using codecs,
//! which are defined as objects used to read and write context data to and
//! from messages exchanged by the applications.
//!
//! Codecs leverage the [`Context`] to inject and extract data for each
//! cross-cutting concern, such as trace identity and [`Baggage`].
//!
//! Codecs use [`Injector`] and [`Extractor`] to read and write context data
//! to and from carriers. Each codec defines its expected carrier type, such
//! as a string map or a byte array.
//!
//! Malformed carrier data is reported through [`PropagationError`] rather
//! than silently swallowed, so callers can decide whether to drop a request
//! or continue without a remote parent. Data that is merely *absent* is not
//! an error.
//!
//! [`Baggage`]: crate::baggage::Baggage
//! [`Context`]: crate::Context
use crate::trace::TraceStateError;
use std::collections::HashMap;
use thiserror::Error;

pub mod composite;
pub mod text_map_propagator;

pub use composite::TextMapCompositePropagator;
pub use text_map_propagator::TextMapPropagator;

/// Injector provides an interface for adding fields from an underlying struct like `HashMap`
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for removing fields from an underlying struct like `HashMap`
pub trait Extractor {
    /// Get a value from a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

/// Error returned when carrier data is present but malformed.
///
/// Carrier data that is absent altogether does not produce this error;
/// extraction then succeeds and leaves the context unchanged.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PropagationError {
    /// A carrier field held a value the codec could not parse.
    #[error("invalid {name} in carrier: {value:?}")]
    InvalidField {
        /// The carrier field or wire-format component that failed to parse.
        name: &'static str,
        /// The offending value, as found in the carrier.
        value: String,
    },

    /// A trace state header failed validation.
    #[error(transparent)]
    TraceState(#[from] TraceStateError),
}

impl PropagationError {
    /// Error for a carrier field holding an unparsable value.
    pub fn invalid_field(name: &'static str, value: impl Into<String>) -> Self {
        PropagationError::InvalidField {
            name,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_get() {
        let mut carrier = HashMap::new();
        carrier.set("headerName", "value".to_string());

        assert_eq!(
            Extractor::get(&carrier, "HEADERNAME"),
            Some("value"),
            "case insensitive extraction"
        );
    }

    #[test]
    fn hash_map_keys() {
        let mut carrier = HashMap::new();
        carrier.set("headerName1", "value1".to_string());
        carrier.set("headerName2", "value2".to_string());

        let got = Extractor::keys(&carrier);
        assert_eq!(got.len(), 2);
        assert!(got.contains(&"headername1"));
        assert!(got.contains(&"headername2"));
    }

    #[test]
    fn invalid_field_error_message() {
        let err = PropagationError::invalid_field("traceparent", "not-a-header");
        assert_eq!(
            err.to_string(),
            "invalid traceparent in carrier: \"not-a-header\""
        );
    }

    #[test]
    fn trace_state_error_is_transparent() {
        let err = PropagationError::from(TraceStateError::TooManyMembers);
        assert_eq!(
            err.to_string(),
            "TraceState cannot hold more than 32 members"
        );
    }
}
