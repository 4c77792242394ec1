use std::borrow::Cow;

/// Boxed error a subscriber may return from a capability method.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Return type of every capability method.
///
/// Subscribers return `Err` to report a failure; publishers always return `Ok(())`
/// because failures are routed to the bus' [`crate::ExceptionHandler`] instead.
pub type Delivery = Result<(), BoxError>;

/// A failure raised by a single subscriber during one fan-out pass.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The subscriber returned an error.
    #[error("Subscriber rejected delivery{}: {source}", format_context(.context))]
    Rejected {
        #[source]
        source: BoxError,
        context: Option<Cow<'static, str>>,
    },

    /// The subscriber panicked; the panic was caught at the dispatch boundary.
    #[error("Subscriber panicked{}: {message}", format_context(.context))]
    Panicked { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl DeliveryError {
    /// Returns the attached context, usually the bus node the subscriber lives on.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Rejected { context, .. } | Self::Panicked { context, .. } => context.as_deref(),
        }
    }

    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

impl From<BoxError> for DeliveryError {
    #[inline]
    fn from(source: BoxError) -> Self {
        Self::Rejected { source, context: None }
    }
}

/// Adds `.context(...)` to results carrying a [`DeliveryError`] or a subscriber error.
pub trait DeliveryErrorExt<T> {
    /// Attaches context to the error, replacing any previous context.
    ///
    /// # Errors
    /// Returns the original error converted into [`DeliveryError`].
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, DeliveryError>;
}

impl<T> DeliveryErrorExt<T> for Result<T, DeliveryError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                DeliveryError::Rejected { context: c, .. }
                | DeliveryError::Panicked { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl<T> DeliveryErrorExt<T> for Result<T, BoxError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, DeliveryError> {
        self.map_err(|source| DeliveryError::Rejected { source, context: Some(context.into()) })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
