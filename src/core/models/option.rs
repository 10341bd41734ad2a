use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::Error;

pub const TEXT_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct Opt {
    pub id: i32,
    pub vote_id: i32,
    pub text: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptCreate {
    pub text: String,
    #[serde(default)]
    pub sort_order: i32,
}

impl OptCreate {
    pub fn validate(&self) -> Result<(), Error> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(Error::ValidationError("option text is required".into()));
        }
        if text.chars().count() > TEXT_MAX_LEN {
            return Err(Error::ValidationError(format!("option text is longer than {} characters", TEXT_MAX_LEN)));
        }
        if self.sort_order < 0 {
            return Err(Error::ValidationError("option order must not be negative".into()));
        }
        Ok(())
    }
}

/// An entry of the option batch sent with a vote update. Entries carrying an
/// id rewrite that option, entries without one are appended.
#[derive(Debug, Clone, Deserialize)]
pub struct OptUpsert {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(flatten)]
    pub option: OptCreate,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub vote_id: i32,
    pub text: String,
    pub sort_order: i32,
}

impl Insert {
    pub fn new(vote_id: i32, opt: OptCreate) -> Self {
        Self {
            vote_id,
            text: opt.text.trim().to_owned(),
            sort_order: opt.sort_order,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Update {
    pub text: String,
    pub sort_order: i32,
}

impl From<OptCreate> for Update {
    fn from(opt: OptCreate) -> Self {
        Self {
            text: opt.text.trim().to_owned(),
            sort_order: opt.sort_order,
        }
    }
}
