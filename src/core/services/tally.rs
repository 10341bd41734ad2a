use std::collections::HashMap;

use itertools::Itertools;

use crate::core::models::{
    tally::{OptionTally, VoteResults},
    user::User,
    vote::Vote,
};
use crate::core::ports::repository::{OptionCommon, ResponseCommon, Store};
use crate::error::Error;
use crate::privilege::policy::{AccessPolicy, Action};

/// Share of `count` in `total` as a percentage with one decimal, rounding
/// half up. Worked on integer tenths so ties are exact.
pub fn vote_percentage(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let tenths = (count * 2000 + total) / (2 * total);
    tenths as f64 / 10.0
}

pub async fn total_votes<S>(store: &mut S, vote_id: i32) -> Result<i64, Error>
where
    S: Store,
{
    ResponseCommon::count_voters(store, vote_id).await
}

/// Same value as [`total_votes`].
pub async fn unique_voters<S>(store: &mut S, vote_id: i32) -> Result<i64, Error>
where
    S: Store,
{
    total_votes(store, vote_id).await
}

pub async fn vote_count<S>(store: &mut S, vote_id: i32, option_id: i32) -> Result<i64, Error>
where
    S: Store,
{
    let counts = ResponseCommon::count_by_option(store, vote_id).await?;
    Ok(counts.into_iter().find(|c| c.option_id == option_id).map(|c| c.count).unwrap_or(0))
}

pub async fn get_results<S>(store: &mut S, policy: &AccessPolicy, user: &User, vote: &Vote) -> Result<VoteResults, Error>
where
    S: Store,
{
    policy.ensure(user, Action::Results, Some(vote))?;
    let show_voters = policy.authorize(user, Action::ViewVoters, Some(vote))?;
    let options = OptionCommon::query_by_vote(store, vote.id).await?;
    let counts: HashMap<i32, i64> = ResponseCommon::count_by_option(store, vote.id)
        .await?
        .into_iter()
        .map(|c| (c.option_id, c.count))
        .collect();
    let total = total_votes(store, vote.id).await?;
    let unique = unique_voters(store, vote.id).await?;
    let mut voters = if show_voters {
        ResponseCommon::voters(store, vote.id).await?.into_iter().into_group_map_by(|v| v.option_id)
    } else {
        HashMap::new()
    };
    let options = options
        .into_iter()
        .map(|option| {
            let count = counts.get(&option.id).copied().unwrap_or(0);
            let option_voters = if show_voters { Some(voters.remove(&option.id).unwrap_or_default()) } else { None };
            OptionTally {
                percentage: vote_percentage(count, total),
                count,
                voters: option_voters,
                option,
            }
        })
        .collect();
    Ok(VoteResults {
        vote_id: vote.id,
        total_votes: total,
        unique_voters: unique,
        show_voters,
        options,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::models::option::OptCreate;
    use crate::core::models::vote::{VoteCreate, VoteSettings};
    use crate::core::ports::repository::Manager;
    use crate::core::services::{response::record_response, vote::create_vote};
    use crate::impls::store::memory::MemoryManager;
    use chrono::Utc;

    #[test]
    fn test_percentage_zero_total() {
        assert_eq!(vote_percentage(0, 0), 0.0);
        assert_eq!(vote_percentage(3, 0), 0.0);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(vote_percentage(1, 2), 50.0);
        assert_eq!(vote_percentage(1, 3), 33.3);
        assert_eq!(vote_percentage(2, 3), 66.7);
        assert_eq!(vote_percentage(3, 3), 100.0);
        assert_eq!(vote_percentage(0, 3), 0.0);
        assert_eq!(vote_percentage(1, 8), 12.5);
    }

    #[test]
    fn test_percentage_ties_round_half_up() {
        // 6.25 and 1.25 sit exactly on the tie
        assert_eq!(vote_percentage(1, 16), 6.3);
        assert_eq!(vote_percentage(1, 80), 1.3);
        assert_eq!(vote_percentage(3, 16), 18.8);
    }

    fn member(id: i32) -> User {
        User {
            id,
            username: format!("user{}", id),
            ..Default::default()
        }
    }

    fn moderator() -> User {
        User {
            id: 100,
            username: "moderator".into(),
            is_moderator: true,
            ..Default::default()
        }
    }

    async fn color_vote(manager: &MemoryManager, policy: &AccessPolicy, is_anonymous: bool) -> Vote {
        let tx = manager.tx().await.unwrap();
        create_vote(
            tx,
            policy,
            &moderator(),
            VoteCreate {
                settings: VoteSettings {
                    title: "Favorite color".into(),
                    description: "Pick one".into(),
                    is_active: true,
                    start_date: None,
                    end_date: None,
                    allow_revote: false,
                    is_anonymous,
                },
                options: ["Red", "Blue", "Green"]
                    .iter()
                    .enumerate()
                    .map(|(i, t)| OptCreate {
                        text: t.to_string(),
                        sort_order: i as i32,
                    })
                    .collect(),
            },
            Utc::now(),
        )
        .await
        .unwrap()
    }

    async fn setup(is_anonymous: bool) -> (MemoryManager, AccessPolicy, Vote) {
        let manager = MemoryManager::new();
        for id in 1..=3 {
            manager.add_user(member(id)).await;
        }
        manager.add_user(moderator()).await;
        let policy = AccessPolicy::new().await.unwrap();
        let vote = color_vote(&manager, &policy, is_anonymous).await;
        (manager, policy, vote)
    }

    #[tokio::test]
    async fn test_results_scenario() {
        let (manager, policy, vote) = setup(false).await;
        let mut db = manager.db().await.unwrap();
        let options = OptionCommon::query_by_vote(&mut db, vote.id).await.unwrap();
        let (red, blue, green) = (options[0].id, options[1].id, options[2].id);
        record_response(manager.tx().await.unwrap(), &policy, &member(1), vote.id, red, Utc::now()).await.unwrap();
        record_response(manager.tx().await.unwrap(), &policy, &member(2), vote.id, blue, Utc::now()).await.unwrap();

        let results = get_results(&mut db, &policy, &member(1), &vote).await.unwrap();
        assert_eq!(results.total_votes, 2);
        assert_eq!(results.unique_voters, 2);
        assert!(!results.show_voters);
        let tallies: Vec<(&str, i64, f64)> = results.options.iter().map(|t| (t.option.text.as_str(), t.count, t.percentage)).collect();
        assert_eq!(tallies, vec![("Red", 1, 50.0), ("Blue", 1, 50.0), ("Green", 0, 0.0)]);
        assert!(results.options.iter().all(|t| t.voters.is_none()));

        assert_eq!(vote_count(&mut db, vote.id, red).await.unwrap(), 1);
        assert_eq!(vote_count(&mut db, vote.id, green).await.unwrap(), 0);
        let sum: i64 = results.options.iter().map(|t| t.count).sum();
        assert_eq!(sum, total_votes(&mut db, vote.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_results_without_responses() {
        let (manager, policy, vote) = setup(false).await;
        let mut db = manager.db().await.unwrap();
        let results = get_results(&mut db, &policy, &member(1), &vote).await.unwrap();
        assert_eq!(results.total_votes, 0);
        assert!(results.options.iter().all(|t| t.count == 0 && t.percentage == 0.0));
    }

    #[tokio::test]
    async fn test_voters_visible_to_moderators() {
        let (manager, policy, vote) = setup(false).await;
        let mut db = manager.db().await.unwrap();
        let red = OptionCommon::query_by_vote(&mut db, vote.id).await.unwrap()[0].id;
        let now = Utc::now();
        record_response(manager.tx().await.unwrap(), &policy, &member(1), vote.id, red, now).await.unwrap();
        record_response(manager.tx().await.unwrap(), &policy, &member(2), vote.id, red, now + chrono::Duration::seconds(5))
            .await
            .unwrap();

        let results = get_results(&mut db, &policy, &moderator(), &vote).await.unwrap();
        assert!(results.show_voters);
        let voters = results.options[0].voters.as_ref().unwrap();
        assert_eq!(voters.iter().map(|v| v.user_id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(voters[0].username, "user2");
        assert_eq!(results.options[1].voters.as_ref().map(|v| v.len()), Some(0));
    }

    #[tokio::test]
    async fn test_voters_hidden_on_anonymous_vote() {
        let (manager, policy, vote) = setup(true).await;
        let mut db = manager.db().await.unwrap();
        let red = OptionCommon::query_by_vote(&mut db, vote.id).await.unwrap()[0].id;
        record_response(manager.tx().await.unwrap(), &policy, &member(1), vote.id, red, Utc::now()).await.unwrap();
        let results = get_results(&mut db, &policy, &moderator(), &vote).await.unwrap();
        assert!(!results.show_voters);
        assert!(results.options.iter().all(|t| t.voters.is_none()));
        assert_eq!(results.total_votes, 1);
    }
}
