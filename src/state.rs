use crate::departure::DepartureRecommender;
use crate::prediction::PredictionService;
use crate::ranking::RankingEngine;
use std::sync::Arc;

/// Shared handles behind every HTTP handler.
#[derive(Debug, Clone)]
pub struct AppState {
    service: Arc<PredictionService>,
    ranking: RankingEngine,
    departure: DepartureRecommender,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>) -> Self {
        let ranking = RankingEngine::new();
        let departure = DepartureRecommender::new(Arc::clone(&service), ranking);
        Self {
            service,
            ranking,
            departure,
        }
    }

    pub fn service(&self) -> &Arc<PredictionService> {
        &self.service
    }

    pub fn ranking(&self) -> &RankingEngine {
        &self.ranking
    }

    pub fn departure(&self) -> &DepartureRecommender {
        &self.departure
    }
}
