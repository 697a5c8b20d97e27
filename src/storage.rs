use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{Booking, BookingDetails, ClassId, ClassName, FitnessClass, NewClass};

const MAX_INSTRUCTOR_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Class {0} not found")]
    ClassNotFound(ClassId),
    #[error("Invalid class: {0}")]
    InvalidClass(String),
    #[error("Booking for class {class_id} and {email} already exists")]
    UniqueViolation { class_id: ClassId, email: String },
    #[error("Class {0} has no available slots")]
    CapacityExhausted(ClassId),
    #[error("Timed out after {timeout:?} waiting for the lock on class {class_id}")]
    LockTimeout { class_id: ClassId, timeout: Duration },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

fn to_micros(value: DateTime<Utc>) -> i64 {
    value.timestamp_micros()
}

fn from_micros(value: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| StorageError::CorruptRow(format!("timestamp {value} out of range")))
}

fn slots(value: i64) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| StorageError::CorruptRow(format!("slot count {value}")))
}

fn class_name(value: &str) -> Result<ClassName, StorageError> {
    value
        .parse()
        .map_err(|err: crate::models::UnknownClassName| StorageError::CorruptRow(err.to_string()))
}

#[derive(FromRow)]
struct ClassRecord {
    id: i64,
    name: String,
    datetime_us: i64,
    instructor: String,
    total_slots: i64,
    available_slots: i64,
    created_at_us: i64,
}

impl TryFrom<ClassRecord> for FitnessClass {
    type Error = StorageError;

    fn try_from(row: ClassRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: class_name(&row.name)?,
            datetime: from_micros(row.datetime_us)?,
            instructor: row.instructor,
            total_slots: slots(row.total_slots)?,
            available_slots: slots(row.available_slots)?,
            created_at: from_micros(row.created_at_us)?,
        })
    }
}

#[derive(FromRow)]
struct BookingRecord {
    id: i64,
    class_id: i64,
    client_name: String,
    client_email: String,
    booking_time_us: i64,
    class_name: String,
    class_datetime_us: i64,
    instructor: String,
}

impl TryFrom<BookingRecord> for BookingDetails {
    type Error = StorageError;

    fn try_from(row: BookingRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            booking: Booking {
                id: row.id,
                class_id: row.class_id,
                client_name: row.client_name,
                client_email: row.client_email,
                booking_time: from_micros(row.booking_time_us)?,
            },
            class_name: class_name(&row.class_name)?,
            class_datetime: from_micros(row.class_datetime_us)?,
            instructor: row.instructor,
        })
    }
}

const SELECT_CLASS: &str = "SELECT id, name, datetime_us, instructor, total_slots, \
     available_slots, created_at_us FROM classes";

/// Exclusive hold on one class's reservation lock. Released on drop.
pub struct ClassLock {
    class_id: ClassId,
    _guard: OwnedMutexGuard<()>,
}

impl ClassLock {
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }
}

/// SQLite-backed class and booking tables.
///
/// The schema enforces one booking per (class, email), keeps
/// `available_slots` within `0..=total_slots` and cascades class deletes.
/// Within a process, writers that read-check-write a class hold that
/// class's [`ClassLock`]; across processes the booking commit relies on the
/// guarded slot update inside its transaction. Readers never touch class
/// locks.
pub struct Storage {
    pool: SqlitePool,
    locks: Mutex<HashMap<ClassId, Arc<Mutex<()>>>>,
}

impl Storage {
    /// Opens (creating if missing) the database at `database_url` and
    /// applies migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database, lives as long as the returned value.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn check_new_class(new: &NewClass) -> Result<(), StorageError> {
        if new.total_slots < 1 {
            return Err(StorageError::InvalidClass(
                "total_slots must be at least 1".into(),
            ));
        }
        let instructor = new.instructor.trim();
        if instructor.is_empty() || instructor.chars().count() > MAX_INSTRUCTOR_LEN {
            return Err(StorageError::InvalidClass(format!(
                "instructor must be 1 to {MAX_INSTRUCTOR_LEN} characters"
            )));
        }
        Ok(())
    }

    pub async fn insert_class(&self, new: NewClass) -> Result<FitnessClass, StorageError> {
        Self::check_new_class(&new)?;
        let result = sqlx::query(
            "INSERT INTO classes \
             (name, datetime_us, instructor, total_slots, available_slots, created_at_us) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new.name.as_str())
        .bind(to_micros(new.datetime))
        .bind(new.instructor.trim())
        .bind(i64::from(new.total_slots))
        .bind(i64::from(new.available_slots.unwrap_or(new.total_slots).min(new.total_slots)))
        .bind(to_micros(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::InvalidClass(
                "a class with this name, datetime and instructor already exists".into(),
            ),
            other => StorageError::Database(other),
        })?;

        let id = result.last_insert_rowid();
        self.get_class(id)
            .await?
            .ok_or(StorageError::ClassNotFound(id))
    }

    /// Returns the existing class with the same name, datetime and
    /// instructor, or inserts a new one. The flag is true on insert.
    pub async fn get_or_create_class(
        &self,
        new: NewClass,
    ) -> Result<(FitnessClass, bool), StorageError> {
        Self::check_new_class(&new)?;
        let instructor = new.instructor.trim();
        let result = sqlx::query(
            "INSERT INTO classes \
             (name, datetime_us, instructor, total_slots, available_slots, created_at_us) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (name, datetime_us, instructor) DO NOTHING",
        )
        .bind(new.name.as_str())
        .bind(to_micros(new.datetime))
        .bind(instructor)
        .bind(i64::from(new.total_slots))
        .bind(i64::from(new.available_slots.unwrap_or(new.total_slots).min(new.total_slots)))
        .bind(to_micros(Utc::now()))
        .execute(&self.pool)
        .await?;

        let record: ClassRecord = sqlx::query_as(&format!(
            "{SELECT_CLASS} WHERE name = ? AND datetime_us = ? AND instructor = ?"
        ))
        .bind(new.name.as_str())
        .bind(to_micros(new.datetime))
        .bind(instructor)
        .fetch_one(&self.pool)
        .await?;
        Ok((record.try_into()?, result.rows_affected() == 1))
    }

    pub async fn get_class(&self, class_id: ClassId) -> Result<Option<FitnessClass>, StorageError> {
        let record: Option<ClassRecord> = sqlx::query_as(&format!("{SELECT_CLASS} WHERE id = ?"))
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await?;
        record.map(FitnessClass::try_from).transpose()
    }

    pub async fn booking_exists(&self, class_id: ClassId, email: &str) -> Result<bool, StorageError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE class_id = ? AND client_email = ?)",
        )
        .bind(class_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Waits at most `timeout` for the class's reservation lock.
    pub async fn lock_class(
        &self,
        class_id: ClassId,
        timeout: Duration,
    ) -> Result<ClassLock, StorageError> {
        if self.get_class(class_id).await?.is_none() {
            return Err(StorageError::ClassNotFound(class_id));
        }
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(class_id).or_default())
        };

        let guard = tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| StorageError::LockTimeout { class_id, timeout })?;
        Ok(ClassLock {
            class_id,
            _guard: guard,
        })
    }

    /// Takes one slot from the class and inserts the booking in one
    /// transaction. The guarded update is the locking step: it takes the
    /// database write lock and only matches while a slot is left. Any
    /// error rolls both changes back.
    pub async fn commit_booking(
        &self,
        lock: &ClassLock,
        client_name: &str,
        client_email: &str,
    ) -> Result<Booking, StorageError> {
        let class_id = lock.class_id();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE classes SET available_slots = available_slots - 1 \
             WHERE id = ? AND available_slots > 0",
        )
        .bind(class_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let (found, booked): (bool, bool) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM classes WHERE id = ?1), \
                 EXISTS (SELECT 1 FROM bookings WHERE class_id = ?1 AND client_email = ?2)",
            )
            .bind(class_id)
            .bind(client_email)
            .fetch_one(&mut *tx)
            .await?;
            tx.rollback().await?;
            return Err(if !found {
                StorageError::ClassNotFound(class_id)
            } else if booked {
                StorageError::UniqueViolation {
                    class_id,
                    email: client_email.to_string(),
                }
            } else {
                StorageError::CapacityExhausted(class_id)
            });
        }

        let booking_time = from_micros(to_micros(Utc::now()))?;
        let inserted = sqlx::query(
            "INSERT INTO bookings (class_id, client_name, client_email, booking_time_us) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(class_id)
        .bind(client_name)
        .bind(client_email)
        .bind(to_micros(booking_time))
        .execute(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(result) => result,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tx.rollback().await?;
                return Err(StorageError::UniqueViolation {
                    class_id,
                    email: client_email.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        tx.commit().await?;

        Ok(Booking {
            id: inserted.last_insert_rowid(),
            class_id,
            client_name: client_name.to_string(),
            client_email: client_email.to_string(),
            booking_time,
        })
    }

    /// Classes after `now` that still have room, soonest first.
    pub async fn upcoming_classes(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<FitnessClass>, StorageError> {
        let records: Vec<ClassRecord> = sqlx::query_as(&format!(
            "{SELECT_CLASS} WHERE datetime_us > ? AND available_slots > 0 \
             ORDER BY datetime_us ASC, id ASC"
        ))
        .bind(to_micros(now))
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(FitnessClass::try_from).collect()
    }

    /// Bookings for an exact email, newest first.
    pub async fn bookings_by_email(&self, email: &str) -> Result<Vec<BookingDetails>, StorageError> {
        let records: Vec<BookingRecord> = sqlx::query_as(
            "SELECT b.id, b.class_id, b.client_name, b.client_email, b.booking_time_us, \
             c.name AS class_name, c.datetime_us AS class_datetime_us, c.instructor \
             FROM bookings b JOIN classes c ON c.id = b.class_id \
             WHERE b.client_email = ? \
             ORDER BY b.booking_time_us DESC, b.id DESC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(BookingDetails::try_from).collect()
    }

    /// Removes a class; its bookings go with it.
    pub async fn delete_class(
        &self,
        class_id: ClassId,
        timeout: Duration,
    ) -> Result<(), StorageError> {
        let _lock = self.lock_class(class_id, timeout).await?;
        let result = sqlx::query("DELETE FROM classes WHERE id = ?")
            .bind(class_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::ClassNotFound(class_id));
        }
        self.locks.lock().await.remove(&class_id);
        Ok(())
    }
}
