use chrono::{DateTime, Utc};

use crate::core::models::{
    response::{Insert as ResponseInsert, Response},
    user::User,
};
use crate::core::ports::repository::{OptionCommon, ResponseCommon, Store, TxStore, VoteCommon};
use crate::core::services::eligibility;
use crate::error::Error;
use crate::privilege::policy::{AccessPolicy, Action};

pub async fn user_response<S>(store: &mut S, user_id: i32, vote_id: i32) -> Result<Option<Response>, Error>
where
    S: Store,
{
    ResponseCommon::get_by_user(store, user_id, vote_id).await
}

pub async fn has_user_voted<S>(store: &mut S, user_id: i32, vote_id: i32) -> Result<bool, Error>
where
    S: Store,
{
    Ok(user_response(store, user_id, vote_id).await?.is_some())
}

/// Records `user`'s choice of `option_id` on the vote, replacing an earlier
/// choice when the vote allows revoting. The replacement gets a fresh
/// `voted_at`. Nothing is written unless the whole sequence succeeds.
pub async fn record_response<T>(mut tx: T, policy: &AccessPolicy, user: &User, vote_id: i32, option_id: i32, now: DateTime<Utc>) -> Result<Response, Error>
where
    T: TxStore,
{
    tx.lock_response(user.id, vote_id).await?;
    let vote = VoteCommon::get(&mut tx, vote_id).await?.ok_or(Error::NotFound("vote"))?;
    policy.ensure(user, Action::Respond, Some(&vote))?;
    let option = OptionCommon::get(&mut tx, option_id)
        .await?
        .filter(|o| o.vote_id == vote.id)
        .ok_or(Error::NotFound("option"))?;
    let existing = ResponseCommon::get_by_user(&mut tx, user.id, vote.id).await?;
    if let Err(e) = eligibility::check(&vote, existing.is_some(), now) {
        log::debug!("response of user {} on vote {} rejected: {}", user.id, vote.id, e);
        tx.rollback().await?;
        return Err(e);
    }
    if let Some(previous) = &existing {
        ResponseCommon::delete(&mut tx, previous.id).await?;
    }
    let response = ResponseCommon::insert(
        &mut tx,
        ResponseInsert {
            user_id: user.id,
            option_id: option.id,
            vote_id: vote.id,
            voted_at: now,
        },
    )
    .await?;
    tx.commit().await?;
    match existing {
        Some(previous) => log::info!("user {} changed vote {} from option {} to {}", user.id, vote.id, previous.option_id, option.id),
        None => log::info!("user {} voted for option {} on vote {}", user.id, option.id, vote.id),
    }
    Ok(response)
}
