//! Duration-constrained track selection.
//!
//! Candidates are shuffled uniformly (Fisher-Yates), then taken in order while
//! the running total stays within the limit. The first track that would cross
//! the limit is still taken and ends the walk, so a result either reaches the
//! target, or contains every candidate.
use crate::error::{PomoError, Result};
use crate::models::{SelectionResult, Track};
use rand::seq::SliceRandom;
use rand::Rng;

/// Target duration in milliseconds; negative targets count as zero.
pub fn limit_ms(target_minutes: i64) -> u64 {
    (target_minutes.max(0) as u64).saturating_mul(60_000)
}

pub fn select(candidates: &[Track], target_minutes: i64) -> SelectionResult {
    select_with_rng(candidates, target_minutes, &mut rand::thread_rng())
}

pub fn select_with_rng<R: Rng + ?Sized>(candidates: &[Track], target_minutes: i64, rng: &mut R) -> SelectionResult {
    let mut shuffled = candidates.to_vec();
    shuffled.shuffle(rng);
    fill_to_limit(shuffled, limit_ms(target_minutes))
}

/// Like [`select`], but an empty pool is an error.
pub fn try_select(candidates: &[Track], target_minutes: i64) -> Result<SelectionResult> {
    if candidates.is_empty() {
        return Err(PomoError::NoCandidates);
    }
    Ok(select(candidates, target_minutes))
}

/// Walk `ordered` as given, with one deliberate overshoot track.
pub fn fill_to_limit(ordered: Vec<Track>, limit_ms: u64) -> SelectionResult {
    let mut result = SelectionResult::default();
    for track in ordered {
        let next_total = result.total_duration_ms + track.duration_ms;
        result.selected_tracks.push(track);
        result.total_duration_ms = next_total;
        if next_total > limit_ms {
            break;
        }
    }
    result
}
