//! Prediction service: cache, then remote inference, then the local ensemble.

use crate::clock::Clock;
use crate::error::AppError;
use crate::estimation::model::{Factor, ModelInput};
use crate::estimation::realtime::{REPORT_WINDOW, RealtimeAdjuster};
use crate::estimation::remote::{ForecastResponse, ForecastStep, RemoteClient};
use crate::estimation::{ComponentPredictions, EnsemblePredictor, Trend};
use crate::features::FeatureExtractor;
use crate::store::DataStore;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

pub mod cache;
pub mod labels;
pub mod record;

use cache::{CacheKey, PredictionCache, bucket_start};
pub use labels::{Freshness, LotStatus, chance_of_spot};
pub use record::{Prediction, SourceKind};
use record::PredictionDraft;

pub const STEPS_PER_HOUR: u32 = 4;
const STEP: Duration = Duration::minutes(15);

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub cache_ttl: std::time::Duration,
    pub horizon_hours: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            cache_ttl: std::time::Duration::from_secs(300),
            horizon_hours: 24,
        }
    }
}

#[derive(Debug)]
pub struct PredictionService {
    extractor: FeatureExtractor,
    ensemble: EnsemblePredictor,
    adjuster: RealtimeAdjuster,
    remote: Option<RemoteClient>,
    cache: PredictionCache,
    horizon_hours: u32,
}

impl PredictionService {
    pub fn new(
        extractor: FeatureExtractor,
        ensemble: EnsemblePredictor,
        remote: Option<RemoteClient>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            extractor,
            ensemble,
            adjuster: RealtimeAdjuster::default(),
            remote,
            cache: PredictionCache::new(settings.cache_ttl),
            horizon_hours: settings.horizon_hours,
        }
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        self.extractor.store()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.extractor.clock()
    }

    pub fn horizon_hours(&self) -> u32 {
        self.horizon_hours
    }

    pub fn model_version(&self) -> &str {
        self.ensemble.model_version()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    fn ensure_lot(&self, lot_id: &str) -> Result<(), AppError> {
        self.store()
            .lot(lot_id)
            .map(|_| ())
            .ok_or_else(|| AppError::UnknownLot(lot_id.to_string()))
    }

    /// Moves `target` into campus time. Targets further than the forecast
    /// horizon from `now`, in either direction, are rejected.
    pub fn campus_target(
        &self,
        target: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<OffsetDateTime, AppError> {
        let horizon = Duration::hours(i64::from(self.horizon_hours));
        if (target - now).abs() > horizon {
            return Err(outside_horizon(target, self.horizon_hours));
        }
        target
            .checked_to_offset(now.offset())
            .ok_or_else(|| outside_horizon(target, self.horizon_hours))
    }

    pub async fn get_prediction(
        &self,
        lot_id: &str,
        target: OffsetDateTime,
    ) -> Result<Arc<Prediction>, AppError> {
        self.ensure_lot(lot_id)?;
        let now = self.clock().now();
        let target = self.campus_target(target, now)?;

        if let Some(hit) = self.cache.get(lot_id, target, now)? {
            debug!(lot_id, "Prediction cache hit");
            return Ok(hit);
        }

        let lot_ids = [lot_id.to_string()];
        let remote = self.fetch_remote(&lot_ids, target, 0).await;
        let prediction = match remote
            .as_ref()
            .and_then(|response| self.from_remote(response, lot_id, target, now))
        {
            Some(prediction) => prediction,
            None => self.predict_local(lot_id, target, now).await?,
        };

        let prediction = Arc::new(prediction);
        self.cache.insert(Arc::clone(&prediction), now)?;
        Ok(prediction)
    }

    /// Predictions for several lots at one target, in input order.
    pub async fn get_predictions(
        &self,
        lot_ids: &[String],
        target: OffsetDateTime,
    ) -> Result<Vec<Arc<Prediction>>, AppError> {
        for lot_id in lot_ids {
            self.ensure_lot(lot_id)?;
        }
        let now = self.clock().now();
        let target = self.campus_target(target, now)?;

        let mut results: Vec<Option<Arc<Prediction>>> = Vec::with_capacity(lot_ids.len());
        for lot_id in lot_ids {
            results.push(self.cache.get(lot_id, target, now)?);
        }

        let misses: Vec<usize> = (0..lot_ids.len()).filter(|&i| results[i].is_none()).collect();
        if misses.is_empty() {
            return Ok(results.into_iter().flatten().collect());
        }

        let miss_ids: Vec<String> = misses.iter().map(|&i| lot_ids[i].clone()).collect();
        let remote = self.fetch_remote(&miss_ids, target, 0).await;

        let mut local = Vec::new();
        for &i in &misses {
            let from_remote = remote
                .as_ref()
                .and_then(|response| self.from_remote(response, &lot_ids[i], target, now));
            match from_remote {
                Some(prediction) => {
                    let prediction = Arc::new(prediction);
                    self.cache.insert(Arc::clone(&prediction), now)?;
                    results[i] = Some(prediction);
                }
                None => local.push(i),
            }
        }

        let computed = join_all(local.iter().map(|&i| {
            let lot_id = lot_ids[i].as_str();
            async move { (i, self.predict_local(lot_id, target, now).await) }
        }))
        .await;

        for (i, prediction) in computed {
            let prediction = Arc::new(prediction?);
            self.cache.insert(Arc::clone(&prediction), now)?;
            results[i] = Some(prediction);
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// One prediction per 15-minute step, `hours * 4` steps from the bucket
    /// containing `start`.
    pub async fn get_prediction_timeline(
        &self,
        lot_id: &str,
        start: OffsetDateTime,
        hours: u32,
    ) -> Result<Vec<Arc<Prediction>>, AppError> {
        if hours == 0 || hours > self.horizon_hours {
            return Err(AppError::InvalidArgument(format!(
                "hours must be between 1 and {}, got {hours}",
                self.horizon_hours
            )));
        }
        self.ensure_lot(lot_id)?;
        let now = self.clock().now();
        let start = bucket_start(self.campus_target(start, now)?);

        let targets = (0..hours * STEPS_PER_HOUR)
            .map(|i| {
                start
                    .checked_add(STEP * i)
                    .ok_or_else(|| outside_horizon(start, self.horizon_hours))
            })
            .collect::<Result<Vec<OffsetDateTime>, AppError>>()?;

        let mut results: Vec<Option<Arc<Prediction>>> = Vec::with_capacity(targets.len());
        for &target in &targets {
            results.push(self.cache.get(lot_id, target, now)?);
        }
        if results.iter().all(Option::is_some) {
            return Ok(results.into_iter().flatten().collect());
        }

        let lot_ids = [lot_id.to_string()];
        if let Some(response) = self.fetch_remote(&lot_ids, start, hours).await {
            let steps = response.steps_for(lot_id);
            let by_bucket: HashMap<CacheKey, usize> = steps
                .iter()
                .enumerate()
                .map(|(i, step)| (CacheKey::new(lot_id, step.timestamp), i))
                .collect();
            let last_report_at = self.store().latest_report(lot_id, now).map(|r| r.reported_at);

            for (slot, &target) in results.iter_mut().zip(&targets) {
                if slot.is_some() {
                    continue;
                }
                let Some(&index) = by_bucket.get(&CacheKey::new(lot_id, target)) else {
                    continue;
                };
                let prediction = Arc::new(
                    remote_draft(
                        lot_id,
                        &response.model_version,
                        steps,
                        index,
                        target,
                        last_report_at,
                    )
                    .finish(now),
                );
                self.cache.insert(Arc::clone(&prediction), now)?;
                *slot = Some(prediction);
            }
        }

        let missing: Vec<usize> = (0..targets.len()).filter(|&i| results[i].is_none()).collect();
        let computed = join_all(missing.iter().map(|&i| {
            let target = targets[i];
            async move { (i, self.predict_local(lot_id, target, now).await) }
        }))
        .await;

        for (i, prediction) in computed {
            let prediction = Arc::new(prediction?);
            self.cache.insert(Arc::clone(&prediction), now)?;
            results[i] = Some(prediction);
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Drops cached predictions for a lot, e.g. after new reports arrive.
    pub fn invalidate_lot(&self, lot_id: &str) -> Result<usize, AppError> {
        let removed = self.cache.invalidate_lot(lot_id)?;
        debug!(lot_id, removed, "Invalidated cached predictions");
        Ok(removed)
    }

    pub fn clear_cache(&self) -> Result<(), AppError> {
        self.cache.clear()
    }

    async fn fetch_remote(
        &self,
        lot_ids: &[String],
        target: OffsetDateTime,
        hours_ahead: u32,
    ) -> Option<ForecastResponse> {
        let remote = self.remote.as_ref()?;
        match remote.forecast(lot_ids, target, hours_ahead).await {
            Ok(response) => Some(response),
            Err(err) => {
                let err = AppError::RemoteInferenceFailed(err.to_string());
                warn!(endpoint = remote.endpoint(), error = %err, "Falling back to local inference");
                None
            }
        }
    }

    fn from_remote(
        &self,
        response: &ForecastResponse,
        lot_id: &str,
        target: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Option<Prediction> {
        let steps = response.steps_for(lot_id);
        if steps.is_empty() {
            warn!(
                lot_id,
                error = %AppError::RemoteInferenceFailed("no steps for lot".to_string()),
                "Falling back to local inference"
            );
            return None;
        }
        let last_report_at = self.store().latest_report(lot_id, now).map(|r| r.reported_at);
        Some(remote_draft(lot_id, &response.model_version, steps, 0, target, last_report_at).finish(now))
    }

    async fn predict_local(
        &self,
        lot_id: &str,
        target: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Prediction, AppError> {
        let features = self.extractor.extract_features(lot_id, target).await?;
        let series = self.extractor.occupancy_series(lot_id, now);
        let estimate = self.ensemble.estimate(&ModelInput {
            features: &features,
            series: &series,
            target,
            now,
        });

        let confidence = self.ensemble.calibrate(estimate.confidence);

        let reports = self
            .store()
            .reports_between(lot_id, target.saturating_sub(REPORT_WINDOW), target.min(now));
        let mut factors = estimate.factors;
        let (occupancy, lower_bound, upper_bound) = match self.adjuster.adjust(
            estimate.occupancy,
            confidence,
            estimate.lower_bound,
            estimate.upper_bound,
            &reports,
            target,
        ) {
            Some(adjusted) => {
                factors.push(Factor::new("report_adjustment", adjusted.adjustment));
                (adjusted.occupancy, adjusted.lower_bound, adjusted.upper_bound)
            }
            None => (estimate.occupancy, estimate.lower_bound, estimate.upper_bound),
        };

        Ok(PredictionDraft {
            lot_id: lot_id.to_string(),
            target_time: target,
            occupancy,
            confidence,
            lower_bound,
            upper_bound,
            components: estimate.components,
            model_version: estimate.model_version,
            source: SourceKind::Local,
            factors,
            trend: estimate.trend,
            last_report_at: features.realtime.last_report_at,
        }
        .finish(now))
    }
}

fn outside_horizon(target: OffsetDateTime, horizon_hours: u32) -> AppError {
    AppError::InvalidArgument(format!(
        "target time {target} is more than {horizon_hours} hours from now"
    ))
}

/// Trend of a remote step compares it with its neighbour in the response.
fn remote_trend(steps: &[ForecastStep], index: usize) -> Trend {
    let current = steps[index].occupancy;
    match (steps.get(index + 1), index.checked_sub(1).and_then(|i| steps.get(i))) {
        (Some(next), _) => Trend::from_delta(next.occupancy - current),
        (None, Some(previous)) => Trend::from_delta(current - previous.occupancy),
        (None, None) => Trend::Steady,
    }
}

fn remote_draft(
    lot_id: &str,
    model_version: &str,
    steps: &[ForecastStep],
    index: usize,
    target: OffsetDateTime,
    last_report_at: Option<OffsetDateTime>,
) -> PredictionDraft {
    let step = &steps[index];
    PredictionDraft {
        lot_id: lot_id.to_string(),
        target_time: target,
        occupancy: step.occupancy,
        confidence: step.confidence,
        lower_bound: step.lower_bound,
        upper_bound: step.upper_bound,
        components: step.components.unwrap_or(ComponentPredictions {
            tabular: step.occupancy,
            temporal: step.occupancy,
        }),
        model_version: model_version.to_string(),
        source: SourceKind::Server,
        factors: step.factors.clone(),
        trend: remote_trend(steps, index),
        last_report_at,
    }
}
