use chrono::{DateTime, Utc};

use crate::core::models::vote::{Vote, VoteStatus};
use crate::error::Error;

/// Whether the vote accepts responses at `now`. Both window bounds are
/// inclusive.
pub fn is_open(vote: &Vote, now: DateTime<Utc>) -> bool {
    status(vote, now) == VoteStatus::Open
}

pub fn status(vote: &Vote, now: DateTime<Utc>) -> VoteStatus {
    if !vote.is_active {
        return VoteStatus::Inactive;
    }
    if matches!(vote.start_date, Some(start) if now < start) {
        return VoteStatus::Upcoming;
    }
    if matches!(vote.end_date, Some(end) if now > end) {
        return VoteStatus::Closed;
    }
    VoteStatus::Open
}

pub fn can_vote(vote: &Vote, has_existing_response: bool, now: DateTime<Utc>) -> bool {
    check(vote, has_existing_response, now).is_ok()
}

/// Same rule as [`can_vote`], naming the reason of a refusal.
pub fn check(vote: &Vote, has_existing_response: bool, now: DateTime<Utc>) -> Result<(), Error> {
    if !is_open(vote, now) {
        return Err(Error::ClosedVote);
    }
    if has_existing_response && !vote.allow_revote {
        return Err(Error::RevoteDisallowed);
    }
    Ok(())
}
