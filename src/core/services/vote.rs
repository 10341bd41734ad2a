use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::core::models::{
    common::Pagination,
    option::{Insert as OptionInsert, Update as OptionUpdate},
    user::User,
    vote::{
        validate_options, Insert as VoteInsert, Query as VoteQuery, Update as VoteUpdateRow, Vote, VoteCreate, VoteDetail, VoteFilter, VoteSummary,
        VoteUpdate, VotedFilter,
    },
};
use crate::core::ports::repository::{OptionCommon, ResponseCommon, Store, TxStore, VoteCommon};
use crate::core::services::{eligibility, response, tally};
use crate::error::Error;
use crate::privilege::policy::{AccessPolicy, Action};

pub async fn create_vote<T>(mut tx: T, policy: &AccessPolicy, owner: &User, vote: VoteCreate, now: DateTime<Utc>) -> Result<Vote, Error>
where
    T: TxStore,
{
    policy.ensure(owner, Action::Create, None)?;
    vote.settings.validate()?;
    validate_options(&vote.options)?;
    // 创建投票
    let vote_id = VoteCommon::insert(&mut tx, VoteInsert::new(vote.settings, owner.id, now)).await?;
    // 创建选项
    for opt in vote.options {
        OptionCommon::insert(&mut tx, OptionInsert::new(vote_id, opt)).await?;
    }
    let created = VoteCommon::get(&mut tx, vote_id).await?.ok_or(Error::NotFound("vote"))?;
    tx.commit().await?;
    log::info!("user {} created vote {}", owner.id, vote_id);
    Ok(created)
}

/// Rewrites the settings and replaces the option batch: listed ids are
/// updated, new entries inserted, unlisted options deleted together with
/// their responses.
pub async fn update_vote<T>(mut tx: T, policy: &AccessPolicy, user: &User, vote_id: i32, update: VoteUpdate, now: DateTime<Utc>) -> Result<Vote, Error>
where
    T: TxStore,
{
    let vote = VoteCommon::get(&mut tx, vote_id).await?.ok_or(Error::NotFound("vote"))?;
    policy.ensure(user, Action::Update, Some(&vote))?;
    update.settings.validate()?;
    validate_options(update.options.iter().map(|o| &o.option))?;
    let current: HashSet<i32> = OptionCommon::query_by_vote(&mut tx, vote_id).await?.into_iter().map(|o| o.id).collect();
    let mut kept = HashSet::new();
    for upsert in &update.options {
        if let Some(id) = upsert.id {
            if !current.contains(&id) {
                return Err(Error::NotFound("option"));
            }
            if !kept.insert(id) {
                return Err(Error::ValidationError(format!("duplicate option id {}", id)));
            }
        }
    }
    VoteCommon::update(&mut tx, vote_id, VoteUpdateRow::new(update.settings, now)).await?;
    for id in current.difference(&kept) {
        OptionCommon::delete(&mut tx, *id).await?;
    }
    for upsert in update.options {
        match upsert.id {
            Some(id) => OptionCommon::update(&mut tx, id, OptionUpdate::from(upsert.option)).await?,
            None => {
                OptionCommon::insert(&mut tx, OptionInsert::new(vote_id, upsert.option)).await?;
            }
        }
    }
    let updated = VoteCommon::get(&mut tx, vote_id).await?.ok_or(Error::NotFound("vote"))?;
    tx.commit().await?;
    log::info!("user {} updated vote {} ({} options removed)", user.id, vote_id, current.len() - kept.len());
    Ok(updated)
}

pub async fn delete_vote<T>(mut tx: T, policy: &AccessPolicy, user: &User, vote_id: i32) -> Result<(), Error>
where
    T: TxStore,
{
    let vote = VoteCommon::get(&mut tx, vote_id).await?.ok_or(Error::NotFound("vote"))?;
    policy.ensure(user, Action::Delete, Some(&vote))?;
    if !VoteCommon::delete(&mut tx, vote_id).await? {
        return Err(Error::NotFound("vote"));
    }
    tx.commit().await?;
    log::info!("user {} deleted vote {}", user.id, vote_id);
    Ok(())
}

pub async fn get_vote<S>(store: &mut S, policy: &AccessPolicy, user: &User, vote_id: i32, action: Action) -> Result<Vote, Error>
where
    S: Store,
{
    let vote = VoteCommon::get(store, vote_id).await?.ok_or(Error::NotFound("vote"))?;
    policy.ensure(user, action, Some(&vote))?;
    Ok(vote)
}

pub async fn list_votes<S>(store: &mut S, policy: &AccessPolicy, user: &User, filter: VoteFilter, now: DateTime<Utc>) -> Result<(Vec<VoteSummary>, i64), Error>
where
    S: Store,
{
    policy.ensure(user, Action::List, None)?;
    let pagination = Pagination::from_page(filter.page, filter.size)?;
    let query = VoteQuery {
        active_only: !policy.authorize(user, Action::ListInactive, None)?,
        search: filter.search.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()),
        status: filter.status.map(|s| (s, now)),
        voted: filter.voted.map(|v| (user.id, v == VotedFilter::Yes)),
    };
    let total = VoteCommon::count(store, &query).await?;
    let votes = VoteCommon::query(store, &query, Some(pagination)).await?;
    let ids: Vec<i32> = votes.iter().map(|v| v.id).collect();
    let voted: HashSet<i32> = ResponseCommon::voted_vote_ids(store, user.id, &ids).await?.into_iter().collect();
    let summaries = votes
        .into_iter()
        .map(|vote| VoteSummary {
            status: eligibility::status(&vote, now),
            has_voted: voted.contains(&vote.id),
            vote,
        })
        .collect();
    Ok((summaries, total))
}

pub async fn vote_detail<S>(store: &mut S, policy: &AccessPolicy, user: &User, vote_id: i32, now: DateTime<Utc>) -> Result<VoteDetail, Error>
where
    S: Store,
{
    let vote = get_vote(store, policy, user, vote_id, Action::Detail).await?;
    let options = OptionCommon::query_by_vote(store, vote_id).await?;
    let user_response = response::user_response(store, user.id, vote_id).await?;
    let has_voted = user_response.is_some();
    let total_votes = tally::total_votes(store, vote_id).await?;
    let unique_voters = tally::unique_voters(store, vote_id).await?;
    Ok(VoteDetail {
        status: eligibility::status(&vote, now),
        is_open: eligibility::is_open(&vote, now),
        can_vote: eligibility::can_vote(&vote, has_voted, now) && policy.authorize(user, Action::Respond, Some(&vote))?,
        vote,
        options,
        user_response,
        has_voted,
        total_votes,
        unique_voters,
    })
}
