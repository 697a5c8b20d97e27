use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fitness_booking::models::{ClassName, NewClass};
use fitness_booking::reservation::{BookingError, ReservationEngine};
use fitness_booking::storage::Storage;
use futures::future::join_all;

async fn new_storage() -> Arc<Storage> {
    Arc::new(Storage::in_memory().await.unwrap())
}

async fn setup(total_slots: u32) -> (ReservationEngine, Arc<Storage>, i64) {
    let storage = new_storage().await;
    let class = storage
        .insert_class(NewClass {
            name: ClassName::Hiit,
            datetime: Utc::now() + chrono::Duration::hours(2),
            instructor: "Deepak Thakur".to_string(),
            total_slots,
            available_slots: None,
        })
        .await
        .unwrap();
    let engine = ReservationEngine::new(Arc::clone(&storage), Duration::from_secs(5));
    (engine, storage, class.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_race_for_last_slots() {
    let (engine, storage, class_id) = setup(5).await;

    let tasks = (0..50).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .reserve_slot(class_id, "Racer", &format!("racer{i}@example.com"))
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let exhausted = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::SlotsExhausted)))
        .count();
    assert_eq!(successes, 5);
    assert_eq!(exhausted, 45);
    assert_eq!(storage.get_class(class_id).await.unwrap().unwrap().available_slots, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_duplicates_book_once() {
    let (engine, storage, class_id) = setup(10).await;

    let tasks = (0..20).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .reserve_slot(class_id, "Same Client", "same@example.com")
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, BookingError::DuplicateBooking))
    );
    assert_eq!(storage.get_class(class_id).await.unwrap().unwrap().available_slots, 9);
}

#[tokio::test]
async fn test_capacity_tracks_successful_bookings() {
    let (engine, storage, class_id) = setup(3).await;
    let mut booked = 0;

    for i in 0..6 {
        let email = if i % 2 == 0 {
            format!("client{i}@example.com")
        } else {
            format!("client{}@example.com", i - 1)
        };
        if engine.reserve_slot(class_id, "Client", &email).await.is_ok() {
            booked += 1;
        }
        let class = storage.get_class(class_id).await.unwrap().unwrap();
        assert_eq!(class.available_slots, class.total_slots - booked);
    }
    assert_eq!(booked, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_classes_do_not_block() {
    let storage = new_storage().await;
    let mut ids = Vec::new();
    for hours in [2, 3] {
        let class = storage
            .insert_class(NewClass {
                name: ClassName::Yoga,
                datetime: Utc::now() + chrono::Duration::hours(hours),
                instructor: "Gokul Katore".to_string(),
                total_slots: 5,
                available_slots: None,
            })
            .await
            .unwrap();
        ids.push(class.id);
    }
    let engine = ReservationEngine::new(Arc::clone(&storage), Duration::from_millis(100));
    let _held = storage
        .lock_class(ids[0], Duration::from_secs(1))
        .await
        .unwrap();

    let other = engine.reserve_slot(ids[1], "Client", "c@example.com").await;
    assert!(other.is_ok());

    let blocked = engine.reserve_slot(ids[0], "Client", "c@example.com").await;
    assert!(matches!(blocked, Err(BookingError::Storage(_))));
    assert_eq!(storage.get_class(ids[0]).await.unwrap().unwrap().available_slots, 5);
}
