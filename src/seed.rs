use chrono::{DateTime, Duration, DurationRound, Utc};
use tracing::{info, warn};

use crate::models::{ClassName, NewClass};
use crate::storage::{Storage, StorageError};

struct SampleClass {
    name: ClassName,
    instructor: &'static str,
    total_slots: u32,
    hours_from_now: i64,
}

const SAMPLE_CLASSES: [SampleClass; 4] = [
    SampleClass {
        name: ClassName::Yoga,
        instructor: "Pawan Shejwal",
        total_slots: 15,
        hours_from_now: 2,
    },
    SampleClass {
        name: ClassName::Zumba,
        instructor: "Ganesh Katore",
        total_slots: 20,
        hours_from_now: 4,
    },
    SampleClass {
        name: ClassName::Hiit,
        instructor: "Deepak Thakur",
        total_slots: 12,
        hours_from_now: 6,
    },
    // next day
    SampleClass {
        name: ClassName::Yoga,
        instructor: "Gokul Katore",
        total_slots: 15,
        hours_from_now: 26,
    },
];

/// Loads the sample timetable relative to `now`, skipping classes that
/// already exist. Returns how many were inserted.
pub async fn load_sample_classes(
    storage: &Storage,
    now: DateTime<Utc>,
) -> Result<usize, StorageError> {
    let base = now.duration_trunc(Duration::minutes(1)).unwrap_or(now);
    let mut created = 0;
    for sample in &SAMPLE_CLASSES {
        let (class, inserted) = storage
            .get_or_create_class(NewClass {
                name: sample.name,
                datetime: base + Duration::hours(sample.hours_from_now),
                instructor: sample.instructor.to_string(),
                total_slots: sample.total_slots,
                available_slots: None,
            })
            .await?;
        if inserted {
            created += 1;
            info!("Created class: {} - {}", class.name, class.datetime);
        } else {
            warn!("Class already exists: {} - {}", class.name, class.datetime);
        }
    }
    Ok(created)
}
