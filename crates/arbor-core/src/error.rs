//! Error types for Arbor.

use std::fmt;

use crate::meta::MetaError;
use crate::object::ObjectError;

/// The main error type for Arbor operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArborError {
    /// Object-related error.
    Object(ObjectError),
    /// Timer-related error.
    Timer(TimerError),
    /// Meta-object/reflection error.
    Meta(MetaError),
}

impl fmt::Display for ArborError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(err) => write!(f, "Object error: {err}"),
            Self::Timer(err) => write!(f, "Timer error: {err}"),
            Self::Meta(err) => write!(f, "Meta error: {err}"),
        }
    }
}

impl std::error::Error for ArborError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Object(err) => Some(err),
            Self::Timer(err) => Some(err),
            Self::Meta(err) => Some(err),
        }
    }
}

impl From<ObjectError> for ArborError {
    fn from(err: ObjectError) -> Self {
        Self::Object(err)
    }
}

impl From<TimerError> for ArborError {
    fn from(err: TimerError) -> Self {
        Self::Timer(err)
    }
}

impl From<MetaError> for ArborError {
    fn from(err: MetaError) -> Self {
        Self::Meta(err)
    }
}

/// Timer-specific errors. These are the recoverable failed-to-arm results;
/// canceling an absent timer is a no-op, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// A repeating timer cannot have a zero interval.
    InvalidDuration,
    /// The owning object has already been destroyed.
    OwnerDestroyed,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDuration => write!(f, "Invalid timer duration"),
            Self::OwnerDestroyed => write!(f, "Timer owner has been destroyed"),
        }
    }
}

impl std::error::Error for TimerError {}

/// A specialized Result type for Arbor operations.
pub type Result<T> = std::result::Result<T, ArborError>;
