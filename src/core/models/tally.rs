use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::core::models::option::Opt;

#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct OptionCount {
    pub option_id: i32,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct Voter {
    pub option_id: i32,
    pub user_id: i32,
    pub username: String,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionTally {
    pub option: Opt,
    pub count: i64,
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters: Option<Vec<Voter>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteResults {
    pub vote_id: i32,
    pub total_votes: i64,
    pub unique_voters: i64,
    pub show_voters: bool,
    pub options: Vec<OptionTally>,
}
