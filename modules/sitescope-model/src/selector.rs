use serde::{Deserialize, Serialize};
use tracing::info;

use sitescope_common::{haversine_m, CellId, GeoPoint};

/// A scored cell eligible for selection. Vetoed (zero-score) cells never
/// reach the selector.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub cell: CellId,
    pub point: GeoPoint,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRow {
    pub rank: u32,
    pub cell: CellId,
    pub score: f64,
    pub label: String,
}

/// One city's ranked shortlist. Replaced wholesale each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub city: String,
    pub rows: Vec<SelectionRow>,
    /// Why the list is shorter than the target, when it is. Never a silent
    /// short list.
    pub shortfall: Option<String>,
}

/// Greedy non-maximum suppression over an indexed candidate arena.
///
/// Take the best remaining candidate, give it the next rank, drop everything
/// within `min_separation_m` of it, repeat until `target` picks or
/// exhaustion. Every selected pair ends up `>= min_separation_m` apart —
/// locally optimal by construction, deliberately not a global k-center
/// solution.
///
/// Deterministic: equal scores break by ascending cell id.
pub fn select_city(
    city: &str,
    candidates: Vec<Candidate>,
    target: usize,
    min_separation_m: f64,
) -> SelectionResult {
    let mut arena: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.score > 0.0)
        .collect();
    arena.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cell.cmp(&b.cell))
    });

    let total = arena.len();
    let mut alive = vec![true; total];
    let mut rows = Vec::with_capacity(target.min(total));
    let mut cursor = 0;

    while rows.len() < target && cursor < total {
        if !alive[cursor] {
            cursor += 1;
            continue;
        }
        let winner = &arena[cursor];
        let rank = rows.len() as u32 + 1;
        rows.push(SelectionRow {
            rank,
            cell: winner.cell.clone(),
            score: winner.score,
            label: format!("Top {rank} {city}"),
        });

        // Suppress everything too close to the winner
        let winner_point = winner.point;
        for (candidate, flag) in arena.iter().zip(alive.iter_mut()).skip(cursor + 1) {
            if *flag && haversine_m(winner_point, candidate.point) < min_separation_m {
                *flag = false;
            }
        }
        cursor += 1;
    }

    let shortfall = (rows.len() < target).then(|| {
        format!(
            "only {} of {target}: insufficient separated, unvetoed candidates",
            rows.len()
        )
    });
    if let Some(reason) = &shortfall {
        info!(city, reason = reason.as_str(), "Shortlist fell short of target");
    }

    SelectionResult {
        city: city.to_string(),
        rows,
        shortfall,
    }
}
