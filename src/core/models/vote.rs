use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::models::option::{Opt, OptCreate, OptUpsert};
use crate::core::models::response::Response;
use crate::error::Error;

pub const TITLE_MAX_LEN: usize = 200;
pub const MIN_OPTIONS: usize = 2;

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct Vote {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub created_by: i32,
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub allow_revote: bool,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    Inactive,
    Upcoming,
    Open,
    Closed,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteSettings {
    pub title: String,
    pub description: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub allow_revote: bool,
    #[serde(default)]
    pub is_anonymous: bool,
}

impl VoteSettings {
    pub fn validate(&self) -> Result<(), Error> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::ValidationError("title is required".into()));
        }
        if title.chars().count() > TITLE_MAX_LEN {
            return Err(Error::ValidationError(format!("title is longer than {} characters", TITLE_MAX_LEN)));
        }
        if self.description.trim().is_empty() {
            return Err(Error::ValidationError("description is required".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end <= start {
                return Err(Error::ValidationError("end date must be later than start date".into()));
            }
        }
        Ok(())
    }
}

pub fn validate_options<'a, I>(options: I) -> Result<(), Error>
where
    I: IntoIterator<Item = &'a OptCreate>,
{
    let mut n = 0;
    for opt in options {
        opt.validate()?;
        n += 1;
    }
    if n < MIN_OPTIONS {
        return Err(Error::ValidationError(format!("at least {} options are required", MIN_OPTIONS)));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteCreate {
    #[serde(flatten)]
    pub settings: VoteSettings,
    pub options: Vec<OptCreate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteUpdate {
    #[serde(flatten)]
    pub settings: VoteSettings,
    pub options: Vec<OptUpsert>,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub title: String,
    pub description: String,
    pub created_by: i32,
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub allow_revote: bool,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl Insert {
    pub fn new(settings: VoteSettings, created_by: i32, now: DateTime<Utc>) -> Self {
        Self {
            title: settings.title.trim().to_owned(),
            description: settings.description.trim().to_owned(),
            created_by,
            is_active: settings.is_active,
            start_date: settings.start_date,
            end_date: settings.end_date,
            allow_revote: settings.allow_revote,
            is_anonymous: settings.is_anonymous,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Update {
    pub title: String,
    pub description: String,
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub allow_revote: bool,
    pub is_anonymous: bool,
    pub updated_at: DateTime<Utc>,
}

impl Update {
    pub fn new(settings: VoteSettings, now: DateTime<Utc>) -> Self {
        Self {
            title: settings.title.trim().to_owned(),
            description: settings.description.trim().to_owned(),
            is_active: settings.is_active,
            start_date: settings.start_date,
            end_date: settings.end_date,
            allow_revote: settings.allow_revote,
            is_anonymous: settings.is_anonymous,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VotedFilter {
    Yes,
    No,
}

/// Filters understood by the list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VoteFilter {
    pub search: Option<String>,
    pub status: Option<StatusFilter>,
    pub voted: Option<VotedFilter>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    10
}

impl Default for VoteFilter {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            voted: None,
            page: default_page(),
            size: default_size(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub active_only: bool,
    pub search: Option<String>,
    /// `(filter, now)`: open-ness is evaluated against `now`.
    pub status: Option<(StatusFilter, DateTime<Utc>)>,
    /// `(user_id, has_voted)`
    pub voted: Option<(i32, bool)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteSummary {
    #[serde(flatten)]
    pub vote: Vote,
    pub status: VoteStatus,
    pub has_voted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteDetail {
    pub vote: Vote,
    pub options: Vec<Opt>,
    pub status: VoteStatus,
    pub is_open: bool,
    pub user_response: Option<Response>,
    pub has_voted: bool,
    pub can_vote: bool,
    pub total_votes: i64,
    pub unique_voters: i64,
}
