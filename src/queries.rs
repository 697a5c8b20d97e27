use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::models::{BookingDetails, FitnessClass};
use crate::reservation::BookingError;
use crate::storage::Storage;
use crate::validation::require_email;

/// Read-only views over storage. Never takes a class lock.
#[derive(Clone)]
pub struct QueryService {
    storage: Arc<Storage>,
}

impl QueryService {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn list_upcoming_classes(&self) -> Result<Vec<FitnessClass>, BookingError> {
        let classes = self.storage.upcoming_classes(Utc::now()).await?;
        info!("Retrieved {} upcoming classes", classes.len());
        Ok(classes)
    }

    pub async fn list_bookings_by_email(
        &self,
        email: Option<&str>,
    ) -> Result<Vec<BookingDetails>, BookingError> {
        let email = require_email(email)?;
        let bookings = self.storage.bookings_by_email(email).await?;
        info!("Retrieved {} bookings for {email}", bookings.len());
        Ok(bookings)
    }
}
