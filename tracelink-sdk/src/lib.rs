//! Wire codecs and aggregators for the [`tracelink`] context propagation API.
//!
//! This crate holds the concrete implementations behind the abstract
//! [`tracelink`] interfaces:
//!
//! * [`propagation`]: text and binary codecs for span context and baggage.
//! * [`metrics`]: sum aggregators for counting across threads.
//!
//! Applications usually compose a text codec for the trace identity with the
//! baggage codec:
//!
//! ```
//! use tracelink::propagation::{TextMapCompositePropagator, TextMapPropagator};
//! use tracelink_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
//! use std::collections::HashMap;
//!
//! let propagator = TextMapCompositePropagator::new(vec![
//!     Box::new(TraceContextPropagator::new()),
//!     Box::new(BaggagePropagator::new()),
//! ]);
//!
//! let mut carrier = HashMap::new();
//! carrier.insert(
//!     "traceparent".to_string(),
//!     "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
//! );
//!
//! let cx = propagator.extract(&carrier).expect("well formed carrier");
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod metrics;
pub mod propagation;
