//! Rank computation
//!
//! Rank 1 goes to the highest `total_points`. Equal points are ordered by
//! ascending user id so the result is reproducible.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankInput {
    pub user_id: i64,
    pub total_points: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    pub user_id: i64,
    pub rank: u32,
}

pub fn rank_users(mut entries: Vec<RankInput>) -> Vec<RankAssignment> {
    entries.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    entries
        .iter()
        .enumerate()
        .map(|(i, e)| RankAssignment {
            user_id: e.user_id,
            rank: (i + 1) as u32,
        })
        .collect()
}
