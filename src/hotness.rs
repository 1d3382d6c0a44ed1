//! Time-decayed hotness scoring over persisted topics.
//!
//! The score is a weighted sum of view, reply and like counts multiplied by
//! a linear decay over hours since last activity. Scores are a projection:
//! they can be recomputed from topic fields at any time.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::db::{self, Database, HotnessStats};

/// Scoring weights and bounds.
#[derive(Debug, Clone, Copy)]
pub struct HotnessWeights {
    pub view_weight: f64,
    pub reply_weight: f64,
    pub like_weight: f64,
    /// Window over which the decay factor falls from 1.0 to its 0.1 floor.
    pub decay_window_hours: f64,
    pub max_score: f64,
}

impl Default for HotnessWeights {
    fn default() -> Self {
        Self {
            view_weight: 1.0,
            reply_weight: 5.0,
            like_weight: 3.0,
            decay_window_hours: 168.0,
            max_score: 999_999.0,
        }
    }
}

/// Compute a single topic's hotness score.
///
/// The result always lies in `[0.1, weights.max_score]` for any
/// non-negative inputs and any `hours_since_activity >= 0`.
#[must_use]
pub fn compute_score(
    view_count: i64,
    reply_count: i64,
    total_like_count: i64,
    hours_since_activity: f64,
    weights: &HotnessWeights,
) -> f64 {
    let raw = view_count as f64 * weights.view_weight
        + reply_count as f64 * weights.reply_weight
        + total_like_count as f64 * weights.like_weight;
    let decay = (1.0 - hours_since_activity / weights.decay_window_hours).max(0.1);
    (raw * decay).clamp(0.1, weights.max_score)
}

/// Recomputes like totals and hotness scores over persisted topics.
pub struct HotnessEngine {
    db: Database,
    weights: HotnessWeights,
}

/// Result of a recomputation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisOutcome {
    pub analyzed_topics: usize,
    pub updated_likes: u64,
    pub updated_scores: u64,
}

impl HotnessEngine {
    #[must_use]
    pub fn new(db: Database, weights: HotnessWeights) -> Self {
        Self { db, weights }
    }

    /// Recompute `total_like_count` and then `hotness_score` for the given
    /// topic ids, or for every topic when `ids` is `None`.
    ///
    /// Returns the number of score rows updated.
    ///
    /// # Errors
    ///
    /// Returns an error if either update fails; the failed statement is
    /// rolled back by the database layer.
    pub async fn recompute(&self, ids: Option<&[i64]>) -> Result<AnalysisOutcome> {
        // Like totals feed into the score, so they go first.
        let updated_likes = db::update_total_like_counts(self.db.pool(), ids)
            .await
            .context("Failed to update total like counts")?;
        let updated_scores = db::update_hotness_scores(self.db.pool(), &self.weights, ids)
            .await
            .context("Failed to update hotness scores")?;

        info!(updated_likes, updated_scores, "Hotness recomputation complete");

        Ok(AnalysisOutcome {
            analyzed_topics: ids.map_or(updated_scores as usize, <[i64]>::len),
            updated_likes,
            updated_scores,
        })
    }

    /// Recompute scores for topics active within the last `hours_back` hours.
    pub async fn recompute_recent(&self, hours_back: i64) -> Result<AnalysisOutcome> {
        let recent = db::topics_active_within(self.db.pool(), hours_back)
            .await
            .context("Failed to fetch recently active topics")?;

        if recent.is_empty() {
            warn!(hours_back, "No active topics found in analysis window");
            return Ok(AnalysisOutcome::default());
        }

        let ids: Vec<i64> = recent.iter().map(|t| t.id).collect();
        let mut outcome = self.recompute(Some(&ids)).await?;
        outcome.analyzed_topics = ids.len();
        Ok(outcome)
    }

    /// Read-side aggregation: heat-level distribution and per-category
    /// averages. No mutation.
    pub async fn stats(&self) -> Result<HotnessStats> {
        db::hotness_stats(self.db.pool())
            .await
            .context("Failed to fetch hotness statistics")
    }
}
