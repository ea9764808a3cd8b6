//! crates/lms_core/src/leaderboard.rs
//!
//! Ranking of students by official quiz scores, and the best-attempt reduction
//! used by lecture reports.

use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{AttemptRecord, ScoreTotal};

pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub username: String,
    pub total_score: i64,
}

/// Keeps positive totals, highest first (username breaks ties), top ten.
pub fn leaderboard(totals: Vec<ScoreTotal>) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = totals
        .into_iter()
        .filter_map(|t| match t.total {
            Some(total) if total > 0 => Some(LeaderboardEntry {
                user_id: t.user_id,
                username: t.username,
                total_score: total,
            }),
            _ => None,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| a.username.cmp(&b.username))
    });
    entries.truncate(LEADERBOARD_SIZE);
    entries
}

/// First attempt seen per student. Expects `attempts` ordered by score, highest
/// first, so the survivor is each student's best.
pub fn best_attempt_per_student(attempts: Vec<AttemptRecord>) -> Vec<AttemptRecord> {
    let mut seen = HashSet::new();
    attempts
        .into_iter()
        .filter(|record| seen.insert(record.attempt.student_id))
        .collect()
}
