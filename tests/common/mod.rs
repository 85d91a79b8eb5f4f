#![allow(dead_code)]

use spotcast::clock::FixedClock;
use spotcast::estimation::EnsemblePredictor;
use spotcast::estimation::remote::RemoteClient;
use spotcast::features::FeatureExtractor;
use spotcast::features::calendar::AcademicCalendar;
use spotcast::geo::GeoPoint;
use spotcast::prediction::{PredictionService, ServiceSettings};
use spotcast::store::memory::InMemoryStore;
use spotcast::store::{Lot, LotKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub fn lot(id: &str, kind: LotKind, location: GeoPoint, permits: &[&str]) -> Lot {
    Lot {
        id: id.to_string(),
        name: id.to_uppercase(),
        capacity: 300,
        location,
        kind,
        time_limit_minutes: None,
        icing_zone: false,
        permits: permits.iter().map(|p| p.to_string()).collect(),
        amenities: Vec::new(),
        popularity: 50.0,
        walk_minutes: BTreeMap::from([("SCI".to_string(), 6.0)]),
    }
}

pub fn campus_store() -> InMemoryStore {
    let mut store = InMemoryStore::new();
    store.insert_lot(lot("lot-a", LotKind::Commuter, GeoPoint::new(33.2100, -97.1500), &["commuter"]));
    store.insert_lot(lot("lot-b", LotKind::Commuter, GeoPoint::new(33.2150, -97.1450), &["commuter"]));
    store.insert_lot(lot("lot-f", LotKind::Faculty, GeoPoint::new(33.2110, -97.1490), &["faculty"]));
    store.insert_lot(lot("sat-1", LotKind::Satellite, GeoPoint::new(33.2000, -97.1600), &["any"]));
    store
}

pub fn service(
    store: InMemoryStore,
    clock: Arc<FixedClock>,
    remote: Option<RemoteClient>,
) -> PredictionService {
    let extractor = FeatureExtractor::new(Arc::new(store), AcademicCalendar::default(), clock);
    PredictionService::new(
        extractor,
        EnsemblePredictor::default(),
        remote,
        ServiceSettings::default(),
    )
}

pub fn remote(endpoint: String) -> RemoteClient {
    RemoteClient::new(endpoint, Duration::from_millis(500))
}

/// Serves `body` to every connection and counts how many arrived.
pub async fn counting_server(body: String) -> std::io::Result<(String, Arc<AtomicUsize>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });
    Ok((format!("http://{addr}/predict"), hits))
}

/// One-step forecast body with the same occupancy for every lot.
pub fn forecast_body(lot_ids: &[&str], timestamp: &str, occupancy: f64) -> String {
    let forecasts: Vec<String> = lot_ids
        .iter()
        .map(|id| {
            format!(
                r#"{{"lot_id":"{id}","steps":[{{"timestamp":"{timestamp}","occupancy":{occupancy},"confidence":0.8,"lower_bound":{lower},"upper_bound":{upper}}}]}}"#,
                lower = occupancy - 5.0,
                upper = (occupancy + 5.0).min(100.0)
            )
        })
        .collect();
    format!(
        r#"{{"model_version":"srv-test","forecasts":[{}]}}"#,
        forecasts.join(",")
    )
}
