//! Throughput derived from successive progress snapshots.

use serde::Serialize;

use crate::types::ProgressSnapshot;

/// Processing rate between two snapshots of the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rate {
    pub processed: i64,
    pub seconds: f64,
    pub per_second: f64,
}

/// Rate between `earlier` and `later`. `None` when no time elapsed.
pub fn rate(earlier: &ProgressSnapshot, later: &ProgressSnapshot) -> Option<Rate> {
    let seconds = (later.checked_at - earlier.checked_at).num_milliseconds() as f64 / 1000.0;
    if seconds <= 0.0 {
        return None;
    }
    let processed = later.processed() - earlier.processed();
    Some(Rate {
        processed,
        seconds,
        per_second: processed as f64 / seconds,
    })
}

/// Rate over the two most recent snapshots of a series.
pub fn latest(series: &[ProgressSnapshot]) -> Option<Rate> {
    match series {
        [.., earlier, later] => rate(earlier, later),
        _ => None,
    }
}

/// Rate across the whole series, first to last.
pub fn overall(series: &[ProgressSnapshot]) -> Option<Rate> {
    match (series.first(), series.last()) {
        (Some(first), Some(last)) => rate(first, last),
        _ => None,
    }
}

/// Seconds until `total` items are processed at the latest rate.
pub fn eta_seconds(series: &[ProgressSnapshot], total: i64) -> Option<f64> {
    let last = series.last()?;
    let current = latest(series)?;
    if current.per_second <= 0.0 {
        return None;
    }
    let remaining = (total - last.processed()).max(0);
    Some(remaining as f64 / current.per_second)
}
