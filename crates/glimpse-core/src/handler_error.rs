//! Notification handler error classification
//!
//! A handler reports failures as `anyhow::Error`. Wrapping the cause in a
//! [`HandlerError`] tells the subscriber whether the message is worth
//! redelivering. Plain errors without this wrapper count as transient.

use std::fmt;

/// Handler failure that is either transient (redeliver) or permanent (dead-letter).
#[derive(Debug)]
pub struct HandlerError {
    inner: anyhow::Error,
    transient: bool,
}

impl HandlerError {
    /// A failure that will not go away on redelivery (bad Location, rejected
    /// request, unparseable response). The message is dead-lettered at once.
    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            transient: false,
        }
    }

    /// A failure worth retrying (backend unreachable, upstream timeout, 5xx).
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }

    /// Classify an arbitrary handler error. Anything not explicitly marked
    /// permanent is transient.
    pub fn is_permanent(err: &anyhow::Error) -> bool {
        err.downcast_ref::<HandlerError>()
            .map(|he| !he.is_transient())
            .unwrap_or(false)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.inner)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::transient(err)
    }
}

/// Extension trait for marking a `Result` as a permanent handler failure.
pub trait HandlerResultExt<T> {
    fn permanent(self) -> Result<T, HandlerError>;
}

impl<T, E: Into<anyhow::Error>> HandlerResultExt<T> for Result<T, E> {
    fn permanent(self) -> Result<T, HandlerError> {
        self.map_err(|e| HandlerError::permanent(e.into()))
    }
}
