mod common;

use spotcast::clock::FixedClock;
use spotcast::departure::schedule::{ClassSession, ClockTime, DayOfWeek, Schedule};
use spotcast::departure::{DepartureRecommender, ParkingWindow};
use spotcast::error::AppError;
use spotcast::geo::GeoPoint;
use spotcast::ranking::RankingEngine;
use spotcast::store::LotKind;
use spotcast::store::memory::InMemoryStore;
use std::sync::Arc;
use time::Duration;
use time::macros::datetime;

fn schedule(start: &str, commute_minutes: f64) -> Result<Schedule, String> {
    Ok(Schedule {
        classes: vec![ClassSession {
            course: "CS 2100".to_string(),
            building: "SCI".to_string(),
            days: vec![DayOfWeek::Monday, DayOfWeek::Wednesday],
            start: ClockTime::try_from(start.to_string())?,
            end: None,
        }],
        commute_minutes,
        preferred_lots: Vec::new(),
        origin: Some(GeoPoint::new(33.2300, -97.1300)),
    })
}

fn recommender(store: InMemoryStore, now: time::OffsetDateTime) -> DepartureRecommender {
    let clock = Arc::new(FixedClock::new(now));
    let service = Arc::new(common::service(store, clock, None));
    DepartureRecommender::new(service, RankingEngine::new())
}

#[tokio::test]
async fn morning_class_gets_permit_lot_and_leave_by() -> Result<(), Box<dyn std::error::Error>> {
    // 2025-09-15 is a Monday.
    let now = datetime!(2025-09-15 07:30 UTC);
    let recommender = recommender(common::campus_store(), now);

    let recommendation = recommender
        .recommend(&schedule("10:00", 20.0)?, "commuter", now)
        .await?
        .ok_or("expected a recommendation")?;

    let class_start = datetime!(2025-09-15 10:00 UTC);
    assert_eq!(recommendation.parking_window, ParkingWindow::PermitOnly);
    assert_eq!(recommendation.class.starts_at, class_start);
    assert_ne!(recommendation.target_lot.lot_id, "lot-f");
    assert!(recommendation.alternatives.iter().all(|alt| alt.lot_id != "lot-f"));
    assert_eq!(recommendation.alternatives.len(), 2);

    let total = recommendation.timing.total_minutes;
    assert_eq!(
        recommendation.leave_by,
        class_start - Duration::minutes(total.ceil() as i64)
    );
    assert_eq!(recommendation.arrival_time, recommendation.leave_by + Duration::minutes(20));
    assert!(!recommendation.leave_now);
    assert!((0.1..=0.95).contains(&recommendation.confidence));
    Ok(())
}

#[tokio::test]
async fn no_admitting_lot_yields_none() -> Result<(), Box<dyn std::error::Error>> {
    let now = datetime!(2025-09-15 07:30 UTC);
    let mut store = InMemoryStore::new();
    store.insert_lot(common::lot(
        "lot-f",
        LotKind::Faculty,
        GeoPoint::new(33.2110, -97.1490),
        &["faculty"],
    ));
    let recommender = recommender(store, now);

    let result = recommender
        .recommend(&schedule("10:00", 20.0)?, "commuter", now)
        .await?;

    assert!(result.is_none());
    Ok(())
}

#[tokio::test]
async fn evening_arrival_opens_every_lot() -> Result<(), Box<dyn std::error::Error>> {
    let now = datetime!(2025-09-15 17:20 UTC);
    let mut store = InMemoryStore::new();
    store.insert_lot(common::lot(
        "lot-f",
        LotKind::Faculty,
        GeoPoint::new(33.2110, -97.1490),
        &["faculty"],
    ));
    let recommender = recommender(store, now);

    let recommendation = recommender
        .recommend(&schedule("19:00", 15.0)?, "commuter", now)
        .await?
        .ok_or("expected a recommendation")?;

    assert_eq!(recommendation.parking_window, ParkingWindow::FreeParking);
    assert_eq!(recommendation.target_lot.lot_id, "lot-f");
    assert!(recommendation.alternatives.is_empty());
    Ok(())
}

#[tokio::test]
async fn tight_schedule_says_leave_now() -> Result<(), AppError> {
    let now = datetime!(2025-09-15 09:50 UTC);
    let recommender = recommender(common::campus_store(), now);
    let schedule = schedule("10:00", 20.0).map_err(AppError::InvalidArgument)?;

    let recommendation = recommender.recommend(&schedule, "commuter", now).await?;

    assert!(recommendation.is_some_and(|r| r.leave_now && r.leave_by <= now));
    Ok(())
}

#[tokio::test]
async fn commute_outside_a_day_is_rejected() -> Result<(), AppError> {
    let now = datetime!(2025-09-15 07:30 UTC);
    let recommender = recommender(common::campus_store(), now);

    for commute in [1e10, -5.0, f64::NAN, 1441.0] {
        let schedule = schedule("10:00", commute).map_err(AppError::InvalidArgument)?;
        let result = recommender.recommend(&schedule, "commuter", now).await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))), "commute {commute}");
    }
    Ok(())
}

#[tokio::test]
async fn request_time_is_read_in_campus_time() -> Result<(), Box<dyn std::error::Error>> {
    let campus_now = datetime!(2025-09-15 12:00 -5);
    let recommender = recommender(common::campus_store(), campus_now);

    let recommendation = recommender
        .recommend(&schedule("14:00", 20.0)?, "commuter", datetime!(2025-09-15 17:00 UTC))
        .await?
        .ok_or("expected a recommendation")?;

    assert_eq!(recommendation.class.starts_at, datetime!(2025-09-15 14:00 -5));
    assert_eq!(recommendation.parking_window, ParkingWindow::PermitOnly);
    Ok(())
}
