use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct Response {
    pub id: i32,
    pub user_id: i32,
    pub option_id: i32,
    pub vote_id: i32,
    pub voted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Submit {
    pub option_id: i32,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub user_id: i32,
    pub option_id: i32,
    pub vote_id: i32,
    pub voted_at: DateTime<Utc>,
}
