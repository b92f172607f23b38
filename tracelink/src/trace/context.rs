use crate::{trace::SpanContext, Context};

static NONE_SPAN_CONTEXT: SpanContext = SpanContext::NONE;

/// Methods for storing and retrieving trace data in a [`Context`].
///
/// # Examples
///
/// ```
/// use tracelink::{
///     trace::{SpanContext, TraceContextExt},
///     Context,
/// };
///
/// // Applications started with no remote parent see an invalid span context.
/// assert!(!Context::current().has_active_span());
///
/// // Remote span contexts extracted from carriers can be attached.
/// let cx = Context::current_with_remote_span_context(SpanContext::NONE);
/// assert_eq!(cx.span_context(), &SpanContext::NONE);
/// ```
pub trait TraceContextExt {
    /// Returns a clone of the current context with the given remote
    /// [`SpanContext`].
    fn current_with_remote_span_context(span_context: SpanContext) -> Self;

    /// Returns a clone of this context with the given remote [`SpanContext`].
    ///
    /// This is used by codecs to attach an extracted remote parent to the
    /// context that further operations run under.
    fn with_remote_span_context(&self, span_context: SpanContext) -> Self;

    /// Returns a reference to this context's [`SpanContext`], or an invalid
    /// default if none is set.
    fn span_context(&self) -> &SpanContext;

    /// Returns whether or not a valid span context exists in this context.
    fn has_active_span(&self) -> bool;
}

impl TraceContextExt for Context {
    fn current_with_remote_span_context(span_context: SpanContext) -> Self {
        Context::map_current(|cx| cx.with_remote_span_context(span_context))
    }

    fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        self.with_span_context(span_context)
    }

    fn span_context(&self) -> &SpanContext {
        match &self.span_context {
            Some(span_context) => span_context,
            None => &NONE_SPAN_CONTEXT,
        }
    }

    fn has_active_span(&self) -> bool {
        self.span_context().is_valid()
    }
}
