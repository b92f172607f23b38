use crate::trace_context::{SpanId, TraceFlags, TraceId};
use std::collections::VecDeque;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

const MAX_TRACE_STATE_MEMBERS: usize = 32;
const MAX_TRACE_STATE_LEN: usize = 512;

/// TraceState carries tracing-system-specific configuration data,
/// represented as an ordered list of key-value pairs. TraceState allows
/// multiple tracing systems to participate in the same trace.
///
/// Entries are serialized as `key:value` pairs joined by `,`, holding at
/// most 32 members and at most 512 bytes in total. Updating an entry moves
/// it to the front of the list, so iteration yields the most recently set
/// entry first.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// The default `TraceState`, as a constant
    pub const NONE: TraceState = TraceState(None);

    /// Validates that the given `TraceState` entry key is valid.
    ///
    /// Keys must be non-empty printable ASCII and must not contain the
    /// entry delimiter `,` or the key/value delimiter `:`.
    fn valid_key(key: &str) -> bool {
        if key.is_empty() || key.len() > 256 {
            return false;
        }

        key.bytes()
            .all(|b| b.is_ascii_graphic() && b != b',' && b != b':')
    }

    /// Validates that the given `TraceState` entry value is valid.
    fn valid_value(value: &str) -> bool {
        if value.len() > 256 {
            return false;
        }

        !(value.contains(',') || value.contains(':'))
    }

    /// Creates a new `TraceState` from the given key-value collection.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracelink::trace::TraceState;
    ///
    /// let kvs = vec![("foo", "bar"), ("apple", "banana")];
    /// let trace_state = TraceState::from_key_value(kvs);
    ///
    /// assert!(trace_state.is_ok());
    /// assert_eq!(trace_state.unwrap().header(), String::from("foo:bar,apple:banana"))
    /// ```
    pub fn from_key_value<T, K, V>(trace_state: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let ordered_data = trace_state
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !TraceState::valid_key(key.as_str()) {
                    return Err(TraceStateError::Key(key));
                }
                if !TraceState::valid_value(value.as_str()) {
                    return Err(TraceStateError::Value(value));
                }

                Ok((key, value))
            })
            .collect::<Result<VecDeque<_>, TraceStateError>>()?;

        if ordered_data.len() > MAX_TRACE_STATE_MEMBERS {
            return Err(TraceStateError::TooManyMembers);
        }

        if ordered_data.is_empty() {
            Ok(TraceState(None))
        } else {
            let trace_state = TraceState(Some(ordered_data));
            if trace_state.header().len() > MAX_TRACE_STATE_LEN {
                return Err(TraceStateError::TooLarge);
            }
            Ok(trace_state)
        }
    }

    /// Retrieves a value for a given key from the `TraceState` if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|kvs| {
            kvs.iter().find_map(|item| {
                if item.0.as_str() == key {
                    Some(item.1.as_str())
                } else {
                    None
                }
            })
        })
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |kvs| kvs.len())
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts the given key-value pair into the `TraceState`. If a value
    /// already exists for the given key, this updates the value and moves
    /// the entry to the front of the list. If the key or value are invalid,
    /// or the update would exceed the 32-member or 512-byte limits, an
    /// `Err` is returned; else a new `TraceState` with the updated
    /// key/value is returned.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<TraceState, TraceStateError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }
        if !TraceState::valid_value(value.as_str()) {
            return Err(TraceStateError::Value(value));
        }

        let mut trace_state = self.delete_from_deque(key.clone());
        let kvs = trace_state.0.get_or_insert(VecDeque::with_capacity(1));

        kvs.push_front((key, value));

        if kvs.len() > MAX_TRACE_STATE_MEMBERS {
            return Err(TraceStateError::TooManyMembers);
        }
        if trace_state.header().len() > MAX_TRACE_STATE_LEN {
            return Err(TraceStateError::TooLarge);
        }

        Ok(trace_state)
    }

    /// Removes the given key-value pair from the `TraceState`. If the key
    /// is invalid an `Err` is returned. Else, a new `TraceState` with the
    /// removed entry is returned.
    ///
    /// If the key is not in `TraceState`, the original `TraceState` will be
    /// cloned and returned.
    pub fn delete<K: Into<String>>(&self, key: K) -> Result<TraceState, TraceStateError> {
        let key = key.into();
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }

        Ok(self.delete_from_deque(key))
    }

    /// Delete key from trace state's deque. The key MUST be valid
    fn delete_from_deque(&self, key: String) -> TraceState {
        let mut owned = self.clone();
        if let Some(kvs) = owned.0.as_mut() {
            if let Some(index) = kvs.iter().position(|x| *x.0 == *key) {
                kvs.remove(index);
            }
        }
        owned
    }

    /// Creates a new `TraceState` header string, delimiting each key and
    /// value with a `:` and each entry with a `,`.
    pub fn header(&self) -> String {
        self.header_delimited(":", ",")
    }

    /// Creates a new `TraceState` header string, with the given key/value
    /// delimiter and entry delimiter.
    pub fn header_delimited(&self, entry_delimiter: &str, list_delimiter: &str) -> String {
        self.0
            .as_ref()
            .map(|kvs| {
                kvs.iter()
                    .map(|(key, value)| format!("{key}{entry_delimiter}{value}"))
                    .collect::<Vec<String>>()
                    .join(list_delimiter)
            })
            .unwrap_or_default()
    }
}

impl FromStr for TraceState {
    type Err = TraceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let list_members: Vec<&str> = s.split_terminator(',').collect();
        let mut key_value_pairs: Vec<(String, String)> = Vec::with_capacity(list_members.len());

        for list_member in list_members {
            let list_member = list_member.trim_matches(|c| c == ' ' || c == '\t');
            match list_member.find(':') {
                None => return Err(TraceStateError::List(list_member.to_string())),
                Some(separator_index) => {
                    let (key, value) = list_member.split_at(separator_index);
                    key_value_pairs
                        .push((key.to_string(), value.trim_start_matches(':').to_string()));
                }
            }
        }

        TraceState::from_key_value(key_value_pairs)
    }
}

/// Error returned by `TraceState` operations.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key is invalid.
    #[error("{0:?} is not a valid key in TraceState")]
    Key(String),

    /// The value is invalid.
    #[error("{0:?} is not a valid value in TraceState")]
    Value(String),

    /// The list member is invalid.
    #[error("{0:?} is not a valid list member in TraceState")]
    List(String),

    /// The 32-member limit would be exceeded.
    #[error("TraceState cannot hold more than 32 members")]
    TooManyMembers,

    /// The 512-byte serialized-size limit would be exceeded.
    #[error("TraceState cannot exceed 512 bytes when serialized")]
    TooLarge,
}

/// Immutable portion of a span which can be serialized and propagated.
///
/// Spans that do not have the `sampled` flag set in their [`TraceFlags`]
/// will be ignored by most tracing tools.
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Create an invalid empty span context
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Construct a new `SpanContext`
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The [`TraceId`] for this span context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] for this span context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Returns details about the trace.
    ///
    /// Unlike `TraceState` values, these are present in all traces. Only a
    /// single flag, [`TraceFlags::SAMPLED`], currently carries meaning.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Returns `true` if the span context has a valid (non-zero) `trace_id`
    /// and a valid (non-zero) `span_id`.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Returns `true` if the span context was propagated from a remote parent.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Returns `true` if the `sampled` trace flag is set.
    ///
    /// Spans that are not sampled will be ignored by most tracing tools.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// A reference to the span context's [`TraceState`].
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}
