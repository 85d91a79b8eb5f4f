//! Ordering of scored candidates.
//!
//! Scores more than five points apart are ordered by score. Closer scores go
//! through a cascade of secondary signals ending in the lot id, so no two
//! distinct lots ever compare equal. The near-tie rule is not transitive, so
//! the final order is built by repeated selection instead of `sort_by`: each
//! pick is the cascade-best among the remaining lots within five points of the
//! highest remaining score.

use crate::ranking::RankedResult;
use std::cmp::Ordering;

pub const NEAR_TIE_POINTS: f64 = 5.0;
const EPSILON: f64 = 1e-9;

/// Interval-width band: narrow forecasts rank above wide ones.
fn confidence_tier(result: &RankedResult) -> u8 {
    let width = result.prediction.upper_bound - result.prediction.lower_bound;
    if width <= 15.0 {
        2
    } else if width <= 30.0 {
        1
    } else {
        0
    }
}

fn higher_f64(a: f64, b: f64) -> Ordering {
    if (a - b).abs() <= EPSILON {
        Ordering::Equal
    } else if a > b {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// `Less` means `a` ranks ahead of `b`.
pub fn compare(a: &RankedResult, b: &RankedResult) -> Ordering {
    if (a.final_score - b.final_score).abs() > NEAR_TIE_POINTS {
        return higher_f64(a.final_score, b.final_score);
    }

    higher_f64(a.prediction.confidence, b.prediction.confidence)
        .then_with(|| b.prediction.last_report_at.cmp(&a.prediction.last_report_at))
        .then_with(|| confidence_tier(b).cmp(&confidence_tier(a)))
        .then_with(|| higher_f64(b.prediction.predicted_occupancy, a.prediction.predicted_occupancy))
        .then_with(|| b.has_amenity.cmp(&a.has_amenity))
        .then_with(|| a.has_time_limit.cmp(&b.has_time_limit))
        .then_with(|| a.lot_id.cmp(&b.lot_id))
}

/// Orders results best-first, independent of input order.
pub fn order(mut results: Vec<RankedResult>) -> Vec<RankedResult> {
    results.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.lot_id.cmp(&b.lot_id))
    });

    let mut ordered = Vec::with_capacity(results.len());
    while let Some(top) = results.first().map(|r| r.final_score) {
        let window = results
            .iter()
            .take_while(|r| top - r.final_score <= NEAR_TIE_POINTS)
            .count();
        let mut best = 0;
        for i in 1..window {
            if compare(&results[i], &results[best]) == Ordering::Less {
                best = i;
            }
        }
        ordered.push(results.remove(best));
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::{ComponentPredictions, Trend};
    use crate::prediction::SourceKind;
    use crate::prediction::record::PredictionDraft;
    use crate::ranking::{ComponentScores, RankReason};
    use crate::store::LotKind;
    use std::sync::Arc;
    use time::OffsetDateTime;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-09-15 09:00 UTC);

    struct Entry {
        lot_id: &'static str,
        score: f64,
        confidence: f64,
        last_report_at: Option<OffsetDateTime>,
        interval: f64,
        occupancy: f64,
        has_amenity: bool,
        has_time_limit: bool,
    }

    fn entry(lot_id: &'static str, score: f64) -> Entry {
        Entry {
            lot_id,
            score,
            confidence: 0.7,
            last_report_at: None,
            interval: 20.0,
            occupancy: 50.0,
            has_amenity: false,
            has_time_limit: false,
        }
    }

    fn result(entry: Entry) -> RankedResult {
        let prediction = PredictionDraft {
            lot_id: entry.lot_id.to_string(),
            target_time: NOW,
            occupancy: entry.occupancy,
            confidence: entry.confidence,
            lower_bound: entry.occupancy - entry.interval / 2.0,
            upper_bound: entry.occupancy + entry.interval / 2.0,
            components: ComponentPredictions::default(),
            model_version: "test".to_string(),
            source: SourceKind::Local,
            factors: Vec::new(),
            trend: Trend::Steady,
            last_report_at: entry.last_report_at,
        }
        .finish(NOW);

        RankedResult {
            rank: 0,
            lot_id: entry.lot_id.to_string(),
            lot_name: entry.lot_id.to_uppercase(),
            kind: LotKind::Commuter,
            distance_m: 400.0,
            drive_minutes: 2.0,
            walk_minutes: None,
            prediction: Arc::new(prediction),
            scores: ComponentScores {
                availability: 50.0,
                proximity: 50.0,
                walk: 50.0,
                convenience: 100.0,
            },
            penalty_total: 0.0,
            final_score: entry.score,
            recommended: false,
            reason: RankReason::Alternative,
            has_amenity: entry.has_amenity,
            has_time_limit: entry.has_time_limit,
        }
    }

    fn ids(results: Vec<RankedResult>) -> Vec<String> {
        results.into_iter().map(|r| r.lot_id).collect()
    }

    /// Orders `entries` in both input directions and checks they agree.
    fn ordered(entries: Vec<Entry>) -> Vec<String> {
        let forward: Vec<RankedResult> = entries.into_iter().map(result).collect();
        let mut backward = forward.clone();
        backward.reverse();
        let forward = ids(order(forward));
        assert_eq!(forward, ids(order(backward)));
        forward
    }

    #[test]
    fn near_tie_chain_never_lifts_a_lot_over_a_clear_winner() {
        let ranked = ordered(vec![
            Entry {
                confidence: 0.5,
                ..entry("a", 86.0)
            },
            Entry {
                confidence: 0.9,
                ..entry("b", 82.0)
            },
            Entry {
                confidence: 0.95,
                ..entry("c", 78.0)
            },
        ]);

        assert_eq!(ranked, vec!["b", "a", "c"]);
    }

    #[test]
    fn scores_more_than_five_apart_ignore_the_cascade() {
        let ranked = ordered(vec![
            Entry {
                confidence: 0.95,
                ..entry("a", 70.0)
            },
            entry("b", 80.0),
        ]);

        assert_eq!(ranked, vec!["b", "a"]);
    }

    #[test]
    fn near_tie_prefers_newer_report() {
        let ranked = ordered(vec![
            Entry {
                last_report_at: Some(datetime!(2025-09-15 08:30 UTC)),
                ..entry("a", 80.0)
            },
            Entry {
                last_report_at: Some(datetime!(2025-09-15 08:55 UTC)),
                ..entry("b", 78.0)
            },
        ]);

        assert_eq!(ranked, vec!["b", "a"]);
    }

    #[test]
    fn near_tie_prefers_narrower_interval() {
        let ranked = ordered(vec![
            Entry {
                interval: 40.0,
                ..entry("a", 80.0)
            },
            Entry {
                interval: 10.0,
                ..entry("b", 78.0)
            },
        ]);

        assert_eq!(ranked, vec!["b", "a"]);
    }

    #[test]
    fn near_tie_prefers_lower_occupancy() {
        let ranked = ordered(vec![
            Entry {
                occupancy: 60.0,
                ..entry("a", 80.0)
            },
            Entry {
                occupancy: 40.0,
                ..entry("b", 78.0)
            },
        ]);

        assert_eq!(ranked, vec!["b", "a"]);
    }

    #[test]
    fn near_tie_prefers_lot_with_amenity() {
        let ranked = ordered(vec![
            entry("a", 80.0),
            Entry {
                has_amenity: true,
                ..entry("b", 78.0)
            },
        ]);

        assert_eq!(ranked, vec!["b", "a"]);
    }

    #[test]
    fn near_tie_prefers_lot_without_time_limit() {
        let ranked = ordered(vec![
            Entry {
                has_time_limit: true,
                ..entry("a", 80.0)
            },
            entry("b", 78.0),
        ]);

        assert_eq!(ranked, vec!["b", "a"]);
    }
}
