mod common;

use spotcast::clock::FixedClock;
use spotcast::geo::GeoPoint;
use spotcast::ranking::{AdviceKind, Candidate, RankQuery, RankingEngine};
use spotcast::store::LotKind;
use std::sync::Arc;
use time::macros::datetime;

fn query(permit: Option<&str>) -> RankQuery<'_> {
    RankQuery {
        user_location: GeoPoint::new(33.2100, -97.1500),
        destination: Some("SCI"),
        urgency_minutes: 20.0,
        max_results: 0,
        permit,
    }
}

#[tokio::test]
async fn full_campus_points_to_satellite_lot() -> Result<(), Box<dyn std::error::Error>> {
    let body = common::forecast_body(&["lot-a", "lot-b"], "2025-09-15T10:00:00Z", 96.0);
    let (endpoint, _hits) = common::counting_server(body).await?;
    let clock = Arc::new(FixedClock::new(datetime!(2025-09-15 09:45 UTC)));
    let service = common::service(common::campus_store(), clock, Some(common::remote(endpoint)));
    let store = service.store();

    let ids = vec!["lot-a".to_string(), "lot-b".to_string()];
    let predictions = service
        .get_predictions(&ids, datetime!(2025-09-15 10:00 UTC))
        .await?;
    let candidates: Vec<Candidate> = ids
        .iter()
        .filter_map(|id| store.lot(id))
        .zip(predictions)
        .map(|(lot, prediction)| Candidate { lot, prediction })
        .collect();

    let engine = RankingEngine::new();
    let ranked = engine.rank(candidates, &query(Some("commuter")));
    let satellites: Vec<_> = store
        .lots()
        .into_iter()
        .filter(|lot| lot.kind == LotKind::Satellite)
        .collect();
    let advice = engine.advise_when_full(&ranked, &satellites);

    assert_eq!(ranked.len(), 2);
    let advice = advice.ok_or("expected advice when every lot is full")?;
    assert_eq!(advice.kind, AdviceKind::Satellite);
    assert_eq!(advice.lot_id.as_deref(), Some("sat-1"));
    Ok(())
}

#[tokio::test]
async fn ranking_over_local_predictions_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
    let clock = Arc::new(FixedClock::new(datetime!(2025-09-15 09:00 UTC)));
    let service = common::service(common::campus_store(), clock, None);
    let store = service.store();
    let lots = store.lots();
    let ids: Vec<String> = lots.iter().map(|lot| lot.id.clone()).collect();
    let predictions = service
        .get_predictions(&ids, datetime!(2025-09-15 10:00 UTC))
        .await?;
    let candidates: Vec<Candidate> = lots
        .into_iter()
        .zip(predictions)
        .map(|(lot, prediction)| Candidate { lot, prediction })
        .collect();
    let mut reversed = candidates.clone();
    reversed.reverse();

    let engine = RankingEngine::new();
    let forward = engine.rank(candidates, &query(Some("commuter")));
    let backward = engine.rank(reversed, &query(Some("commuter")));

    let forward_ids: Vec<&str> = forward.iter().map(|r| r.lot_id.as_str()).collect();
    let backward_ids: Vec<&str> = backward.iter().map(|r| r.lot_id.as_str()).collect();
    assert_eq!(forward_ids, backward_ids);
    assert_eq!(forward.len(), 4);
    assert!(forward[0].recommended);
    let faculty = forward
        .iter()
        .find(|r| r.lot_id == "lot-f")
        .ok_or("faculty lot missing")?;
    assert!(faculty.penalty_total >= 50.0);
    Ok(())
}
