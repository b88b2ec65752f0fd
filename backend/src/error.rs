use thiserror::Error;
use uuid::Uuid;

use crate::booking::model::BookingStatus;

/// Domain failures surfaced by the reservation engine.
///
/// Every variant except `Storage` is a recoverable, caller-facing condition.
/// `Storage` carries infrastructure failures (connection loss, decode errors)
/// unchanged so callers can log the full chain.
#[derive(Error, Debug)]
pub enum BookingError {
    #[error("event not found: {0}")]
    EventNotFound(Uuid),

    #[error("event {0} is not accepting bookings")]
    EventNotActive(Uuid),

    #[error("no seats available for event {0}")]
    NoSeatsAvailable(Uuid),

    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("booking {id} is not pending (status: {status})")]
    BookingNotPending { id: Uuid, status: BookingStatus },

    #[error("booking {0} hold has expired")]
    BookingExpired(Uuid),

    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(Uuid),

    #[error("event {0} is already cancelled")]
    EventAlreadyCancelled(Uuid),

    #[error("event {0} has already taken place")]
    CannotCancelPastEvent(Uuid),

    #[error("event {0} starts too soon to be cancelled")]
    CancellationTooLate(Uuid),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("user not found: {0}")]
    UserNotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Outcome class a transport layer maps each error onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Gone,
    PreconditionFailed,
    InvalidInput,
    Internal,
}

impl BookingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EventNotFound(_) | Self::BookingNotFound(_) | Self::UserNotFound(_) => {
                ErrorCategory::NotFound
            }
            Self::NoSeatsAvailable(_)
            | Self::BookingNotPending { .. }
            | Self::AlreadyCancelled(_)
            | Self::EventAlreadyCancelled(_)
            | Self::EventNotActive(_) => ErrorCategory::Conflict,
            Self::BookingExpired(_) => ErrorCategory::Gone,
            Self::CannotCancelPastEvent(_) | Self::CancellationTooLate(_) => {
                ErrorCategory::PreconditionFailed
            }
            Self::InvalidEvent(_) => ErrorCategory::InvalidInput,
            Self::Storage(_) => ErrorCategory::Internal,
        }
    }

    /// True for conditions the caller caused, as opposed to infrastructure faults.
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_stable() {
        let id = Uuid::new_v4();

        assert_eq!(
            BookingError::NoSeatsAvailable(id).category(),
            ErrorCategory::Conflict
        );
        assert_eq!(BookingError::BookingExpired(id).category(), ErrorCategory::Gone);
        assert_eq!(
            BookingError::CancellationTooLate(id).category(),
            ErrorCategory::PreconditionFailed
        );
        assert_eq!(
            BookingError::BookingNotFound(id).category(),
            ErrorCategory::NotFound
        );
    }

    #[test]
    fn storage_errors_keep_their_chain() {
        let err: BookingError = anyhow::anyhow!("connection reset")
            .context("decrement failed")
            .into();

        assert!(!err.is_domain());
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert!(format!("{err:?}").contains("connection reset"));
    }
}
