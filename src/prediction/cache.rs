//! TTL cache of predictions keyed by (lot, 15-minute bucket).
//!
//! Expired entries are evicted lazily when read. Concurrent writers for the
//! same key are last-write-wins.

use crate::error::AppError;
use crate::prediction::Prediction;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use time::{Duration, OffsetDateTime};

pub const BUCKET_MINUTES: u8 = 15;

/// Floors `at` to the start of its 15-minute bucket.
pub fn bucket_start(at: OffsetDateTime) -> OffsetDateTime {
    let minute = at.minute() - at.minute() % BUCKET_MINUTES;
    at.replace_minute(minute)
        .and_then(|t| t.replace_second(0))
        .and_then(|t| t.replace_nanosecond(0))
        .unwrap_or(at)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    lot_id: String,
    /// Unix seconds of the bucket start.
    bucket: i64,
}

impl CacheKey {
    pub fn new(lot_id: &str, target: OffsetDateTime) -> Self {
        Self {
            lot_id: lot_id.to_string(),
            bucket: bucket_start(target).unix_timestamp(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    prediction: Arc<Prediction>,
    stored_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct PredictionCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl PredictionCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::try_from(ttl).unwrap_or(Duration::MAX),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(
        &self,
        lot_id: &str,
        target: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Option<Arc<Prediction>>, AppError> {
        let key = CacheKey::new(lot_id, target);
        {
            let entries = self.entries.read().map_err(|_| AppError::CacheLock)?;
            match entries.get(&key) {
                None => return Ok(None),
                Some(entry) if now - entry.stored_at < self.ttl => {
                    return Ok(Some(Arc::clone(&entry.prediction)));
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().map_err(|_| AppError::CacheLock)?;
        if entries
            .get(&key)
            .is_some_and(|entry| now - entry.stored_at >= self.ttl)
        {
            entries.remove(&key);
        }
        Ok(None)
    }

    pub fn insert(&self, prediction: Arc<Prediction>, now: OffsetDateTime) -> Result<(), AppError> {
        let key = CacheKey::new(&prediction.lot_id, prediction.target_time);
        let mut entries = self.entries.write().map_err(|_| AppError::CacheLock)?;
        entries.retain(|_, entry| now - entry.stored_at < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                prediction,
                stored_at: now,
            },
        );
        Ok(())
    }

    /// Drops every entry for `lot_id`; returns how many were removed.
    pub fn invalidate_lot(&self, lot_id: &str) -> Result<usize, AppError> {
        let mut entries = self.entries.write().map_err(|_| AppError::CacheLock)?;
        let before = entries.len();
        entries.retain(|key, _| key.lot_id != lot_id);
        Ok(before - entries.len())
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.entries
            .write()
            .map_err(|_| AppError::CacheLock)?
            .clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize, AppError> {
        Ok(self.entries.read().map_err(|_| AppError::CacheLock)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len()? == 0)
    }
}
