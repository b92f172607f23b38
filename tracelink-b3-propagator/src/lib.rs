//! B3 multi-header propagator for [`tracelink`].
//!
//! The B3 format predates the W3C headers and is used by Zipkin-lineage
//! systems. Trace identity travels in separate `x-b3-*` headers; vendor
//! trace state travels in a packed `tracestate` header alongside them.
//!
//! ```
//! use tracelink::propagation::TextMapPropagator;
//! use tracelink_b3_propagator::Propagator as B3Propagator;
//! use std::collections::HashMap;
//!
//! let mut headers = HashMap::new();
//! headers.insert(
//!     "x-b3-traceid".to_string(),
//!     "4bf92f3577b34da6a3ce929d0e0e4736".to_string(),
//! );
//! headers.insert("x-b3-spanid".to_string(), "00f067aa0ba902b7".to_string());
//! headers.insert("x-b3-sampled".to_string(), "01".to_string());
//!
//! let propagator = B3Propagator::new();
//! let cx = propagator.extract(&headers).expect("headers are well formed");
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

mod propagator;

pub use propagator::Propagator;
