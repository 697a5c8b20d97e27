use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{BookingDetails, ClassId, FitnessClass, UnknownClassName};
use crate::storage::{Storage, StorageError};
use crate::validation::{validate_client_name, validate_email};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Class not found")]
    NotFound,
    #[error("Cannot book past classes")]
    ClassClosed,
    #[error("You have already booked this class")]
    DuplicateBooking,
    #[error("No available slots for this class")]
    SlotsExhausted,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Storage failure: {0}")]
    Storage(StorageError),
}

impl BookingError {
    /// Only storage failures may succeed when retried unchanged.
    pub fn is_retriable(&self) -> bool {
        matches!(self, BookingError::Storage(_))
    }
}

impl From<StorageError> for BookingError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::ClassNotFound(_) => BookingError::NotFound,
            StorageError::UniqueViolation { .. } => BookingError::DuplicateBooking,
            StorageError::CapacityExhausted(_) => BookingError::SlotsExhausted,
            StorageError::InvalidClass(msg) => BookingError::InvalidInput(msg),
            StorageError::LockTimeout { .. }
            | StorageError::Database(_)
            | StorageError::Migration(_)
            | StorageError::CorruptRow(_) => BookingError::Storage(value),
        }
    }
}

impl From<UnknownClassName> for BookingError {
    fn from(value: UnknownClassName) -> Self {
        BookingError::InvalidInput(value.to_string())
    }
}

/// The only writer of `available_slots`.
#[derive(Clone)]
pub struct ReservationEngine {
    storage: Arc<Storage>,
    lock_timeout: Duration,
}

impl ReservationEngine {
    pub fn new(storage: Arc<Storage>, lock_timeout: Duration) -> Self {
        Self {
            storage,
            lock_timeout,
        }
    }

    /// Books one slot of `class_id` for the client.
    ///
    /// Checks run in order: class exists, class is in the future, client
    /// has not booked it yet, a slot is left. They run once without the
    /// class lock to reject cheaply and again under it before committing,
    /// so a race between the two can only turn a success into
    /// `DuplicateBooking` or `SlotsExhausted`, never over-book.
    pub async fn reserve_slot(
        &self,
        class_id: ClassId,
        client_name: &str,
        client_email: &str,
    ) -> Result<BookingDetails, BookingError> {
        let client_name = validate_client_name(client_name)?;
        let client_email = validate_email(client_email)?;

        let class = self
            .storage
            .get_class(class_id)
            .await
            .map_err(|err| self.storage_failure(err))?;
        self.check(class, client_email).await?;

        let lock = self
            .storage
            .lock_class(class_id, self.lock_timeout)
            .await
            .map_err(|err| self.storage_failure(err))?;

        let class = self
            .storage
            .get_class(class_id)
            .await
            .map_err(|err| self.storage_failure(err))?;
        let class = self.check(class, client_email).await?;
        let booking = self
            .storage
            .commit_booking(&lock, client_name, client_email)
            .await
            .map_err(|err| self.storage_failure(err))?;
        drop(lock);

        info!(
            class_id,
            booking_id = booking.id,
            email = %booking.client_email,
            slots_left = class.available_slots - 1,
            "Booking created for {} class",
            class.name
        );
        Ok(BookingDetails {
            booking,
            class_name: class.name,
            class_datetime: class.datetime,
            instructor: class.instructor,
        })
    }

    async fn check(
        &self,
        class: Option<FitnessClass>,
        client_email: &str,
    ) -> Result<FitnessClass, BookingError> {
        let Some(class) = class else {
            return Err(BookingError::NotFound);
        };
        let rejection = if !class.is_upcoming(Utc::now()) {
            Some(BookingError::ClassClosed)
        } else if self
            .storage
            .booking_exists(class.id, client_email)
            .await
            .map_err(|err| self.storage_failure(err))?
        {
            Some(BookingError::DuplicateBooking)
        } else if class.available_slots == 0 {
            Some(BookingError::SlotsExhausted)
        } else {
            None
        };
        match rejection {
            Some(err) => {
                debug!(class_id = class.id, email = client_email, "Booking rejected: {err}");
                Err(err)
            }
            None => Ok(class),
        }
    }

    fn storage_failure(&self, err: StorageError) -> BookingError {
        let err = BookingError::from(err);
        if err.is_retriable() {
            error!("Reservation aborted: {err}");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::models::{ClassName, NewClass};

    async fn engine_with_class(
        hours_from_now: i64,
        total_slots: u32,
    ) -> (ReservationEngine, Arc<Storage>, ClassId) {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        let class = storage
            .insert_class(NewClass {
                name: ClassName::Yoga,
                datetime: Utc::now() + ChronoDuration::hours(hours_from_now),
                instructor: "John Doe".to_string(),
                total_slots,
                available_slots: None,
            })
            .await
            .unwrap();
        let engine = ReservationEngine::new(Arc::clone(&storage), Duration::from_millis(200));
        (engine, storage, class.id)
    }

    async fn slots(storage: &Storage, class_id: ClassId) -> u32 {
        storage
            .get_class(class_id)
            .await
            .unwrap()
            .unwrap()
            .available_slots
    }

    #[tokio::test]
    async fn test_book_duplicate_then_exhaust() {
        let (engine, storage, class_id) = engine_with_class(2, 2).await;

        let booking = engine
            .reserve_slot(class_id, "Alice", "a@example.com")
            .await
            .unwrap();
        assert_eq!(booking.class_name, ClassName::Yoga);
        assert_eq!(booking.instructor, "John Doe");
        assert_eq!(slots(&storage, class_id).await, 1);

        let err = engine
            .reserve_slot(class_id, "Alice", "a@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::DuplicateBooking));
        assert_eq!(slots(&storage, class_id).await, 1);

        engine
            .reserve_slot(class_id, "Bob", "b@example.com")
            .await
            .unwrap();
        assert_eq!(slots(&storage, class_id).await, 0);

        let err = engine
            .reserve_slot(class_id, "Carol", "c@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::SlotsExhausted));
        assert_eq!(slots(&storage, class_id).await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_wins_over_exhausted() {
        let (engine, _storage, class_id) = engine_with_class(2, 1).await;
        engine
            .reserve_slot(class_id, "Alice", "a@example.com")
            .await
            .unwrap();

        let err = engine
            .reserve_slot(class_id, "Alice", "a@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::DuplicateBooking));
    }

    #[tokio::test]
    async fn test_past_class_is_closed() {
        let (engine, storage, class_id) = engine_with_class(-1, 5).await;
        let err = engine
            .reserve_slot(class_id, "Dave", "d@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ClassClosed));
        assert_eq!(slots(&storage, class_id).await, 5);
    }

    #[tokio::test]
    async fn test_unknown_class() {
        let (engine, _storage, _) = engine_with_class(2, 5).await;
        let err = engine
            .reserve_slot(999, "Dave", "d@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound));
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let (engine, storage, class_id) = engine_with_class(2, 5).await;
        let err = engine
            .reserve_slot(class_id, "", "d@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
        let err = engine
            .reserve_slot(class_id, "Dave", "not-an-email")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidInput(_)));
        assert_eq!(slots(&storage, class_id).await, 5);
    }

    #[tokio::test]
    async fn test_lock_timeout_is_retriable_and_changes_nothing() {
        let (engine, storage, class_id) = engine_with_class(2, 5).await;
        let held = storage
            .lock_class(class_id, Duration::from_secs(1))
            .await
            .unwrap();

        let err = engine
            .reserve_slot(class_id, "Eve", "e@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Storage(_)));
        assert!(err.is_retriable());
        assert_eq!(slots(&storage, class_id).await, 5);
        assert!(!storage.booking_exists(class_id, "e@example.com").await.unwrap());

        drop(held);
        engine
            .reserve_slot(class_id, "Eve", "e@example.com")
            .await
            .unwrap();
        assert_eq!(slots(&storage, class_id).await, 4);
    }

    #[test]
    fn test_permanent_errors_not_retriable() {
        assert!(!BookingError::NotFound.is_retriable());
        assert!(!BookingError::ClassClosed.is_retriable());
        assert!(!BookingError::DuplicateBooking.is_retriable());
        assert!(!BookingError::SlotsExhausted.is_retriable());
        assert!(!BookingError::InvalidInput("x".into()).is_retriable());
    }

    #[test]
    fn test_database_errors_are_retriable() {
        let err = BookingError::from(StorageError::Database(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, BookingError::Storage(_)));
        assert!(err.is_retriable());
        let err = BookingError::from(StorageError::CorruptRow("slot count -1".into()));
        assert!(err.is_retriable());
    }

    #[test]
    fn test_unknown_class_name_is_invalid_input() {
        let err: BookingError = "PILATES".parse::<ClassName>().unwrap_err().into();
        assert!(matches!(err, BookingError::InvalidInput(msg) if msg.contains("PILATES")));
    }
}
