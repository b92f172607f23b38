//! # TextMapPropagator
//!
//! [`TextMapPropagator`] performs the injection and extraction of a
//! cross-cutting concern value as string key/values pairs into carriers that
//! travel in-band across process boundaries.
//!
//! The carrier of propagated data on both the client (injector) and server
//! (extractor) side is usually an HTTP request.
//!
//! In order to increase compatibility, the key/value pairs MUST only consist
//! of US-ASCII characters that make up valid HTTP header fields as per RFC
//! 7230.
use crate::{
    propagation::{Extractor, Injector, PropagationError},
    Context,
};
use std::fmt::Debug;
use std::slice;

/// Methods to inject and extract a value as text into injectors and extractors.
pub trait TextMapPropagator: Debug {
    /// Properly encodes the values of the current [`Context`] and injects
    /// them into the [`Injector`].
    fn inject(&self, injector: &mut dyn Injector) {
        Context::map_current(|cx| self.inject_context(cx, injector))
    }

    /// Properly encodes the values of the [`Context`] and injects them into
    /// the [`Injector`].
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Retrieves encoded data using the provided [`Extractor`] and merges it
    /// with the current [`Context`], returning the new [`Context`].
    ///
    /// If the carrier holds no data for this codec, the current context is
    /// returned unchanged. If the carrier data is present but malformed, a
    /// [`PropagationError`] is returned and no partial data is merged.
    fn extract(&self, extractor: &dyn Extractor) -> Result<Context, PropagationError> {
        self.extract_with_context(&Context::current(), extractor)
    }

    /// Retrieves encoded data using the provided [`Extractor`] and merges it
    /// with the given [`Context`], returning the new [`Context`].
    fn extract_with_context(
        &self,
        cx: &Context,
        extractor: &dyn Extractor,
    ) -> Result<Context, PropagationError>;

    /// Returns iter of fields used by [`TextMapPropagator`]
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over fields of a [`TextMapPropagator`]
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Create a new `FieldIter` from a slice of propagator fields
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|field| field.as_str())
    }
}
