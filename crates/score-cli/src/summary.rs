//! Summary statistics and anomaly ranking over a score file.

use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::records::ScoreRecord;

/// Aggregate view of one score file.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreSummary {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    /// Lowest-scoring (most anomalous) records, ascending by score.
    pub lowest: Vec<ScoreRecord>,
}

impl ScoreSummary {
    pub fn from_scores(scores: &[ScoreRecord], lowest_n: usize) -> Self {
        let count = scores.len();
        let min = scores.iter().map(|r| OrderedFloat(r.score)).min().map(|v| v.0);
        let max = scores.iter().map(|r| OrderedFloat(r.score)).max().map(|v| v.0);
        let mean = (count > 0).then(|| scores.iter().map(|r| r.score).sum::<f64>() / count as f64);

        Self {
            count,
            min,
            max,
            mean,
            lowest: lowest_scores(scores, lowest_n),
        }
    }
}

/// The `n` lowest-scoring records, ascending; ties keep input order.
pub fn lowest_scores(scores: &[ScoreRecord], n: usize) -> Vec<ScoreRecord> {
    if n == 0 {
        return Vec::new();
    }
    // Max-heap of the n smallest seen so far; the root is the one to evict.
    let mut heap: BinaryHeap<(OrderedFloat<f64>, usize)> =
        BinaryHeap::with_capacity(n.min(scores.len()) + 1);
    for (i, record) in scores.iter().enumerate() {
        heap.push((OrderedFloat(record.score), i));
        if heap.len() > n {
            heap.pop();
        }
    }
    heap.into_sorted_vec()
        .into_iter()
        .map(|(_, i)| scores[i].clone())
        .collect()
}
