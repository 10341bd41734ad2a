use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::models::{
    common::Pagination,
    option::{Insert as OptionInsert, Opt, Update as OptionUpdate},
    response::{Insert as ResponseInsert, Response},
    tally::{OptionCount, Voter},
    user::User,
    vote::{Insert as VoteInsert, Query as VoteQuery, StatusFilter, Update as VoteUpdate, Vote},
};
use crate::core::ports::repository::{Common, Manager, OptionCommon, ResponseCommon, Store, TxStore, UserCommon, VoteCommon};
use crate::core::services::eligibility;
use crate::error::Error;

#[derive(Debug, Clone, Default)]
pub struct Tables {
    users: BTreeMap<i32, User>,
    votes: BTreeMap<i32, Vote>,
    options: BTreeMap<i32, Opt>,
    responses: BTreeMap<i32, Response>,
    vote_seq: i32,
    option_seq: i32,
    response_seq: i32,
}

impl Tables {
    fn matches(&self, query: &VoteQuery, vote: &Vote) -> bool {
        if query.active_only && !vote.is_active {
            return false;
        }
        if let Some(search) = &query.search {
            let search = search.to_lowercase();
            if !vote.title.to_lowercase().contains(&search) && !vote.description.to_lowercase().contains(&search) {
                return false;
            }
        }
        if let Some((status, now)) = query.status {
            let open = eligibility::is_open(vote, now);
            if open != (status == StatusFilter::Active) {
                return false;
            }
        }
        if let Some((user_id, has_voted)) = query.voted {
            let voted = self.responses.values().any(|r| r.user_id == user_id && r.vote_id == vote.id);
            if voted != has_voted {
                return false;
            }
        }
        true
    }

    fn responses_of(&self, vote_id: i32) -> impl Iterator<Item = &Response> {
        self.responses.values().filter(move |r| r.vote_id == vote_id)
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

/// Store handle over shared in-process tables. A transactional handle holds
/// the table lock for its whole life and works on a private copy that
/// replaces the shared tables on commit; dropping it discards the copy.
pub struct Memory {
    shared: Arc<Mutex<Tables>>,
    tx: Option<MemoryTx>,
}

impl Memory {
    async fn apply<R>(&mut self, f: impl FnOnce(&mut Tables) -> R) -> R {
        match &mut self.tx {
            Some(tx) => f(&mut tx.work),
            None => {
                let mut tables = self.shared.lock().await;
                f(&mut tables)
            }
        }
    }
}

impl VoteCommon for Memory {
    async fn insert(&mut self, data: VoteInsert) -> Result<i32, Error> {
        let id = self
            .apply(|t| {
                t.vote_seq += 1;
                let id = t.vote_seq;
                t.votes.insert(
                    id,
                    Vote {
                        id,
                        title: data.title,
                        description: data.description,
                        created_by: data.created_by,
                        is_active: data.is_active,
                        start_date: data.start_date,
                        end_date: data.end_date,
                        allow_revote: data.allow_revote,
                        is_anonymous: data.is_anonymous,
                        created_at: data.created_at,
                        updated_at: data.created_at,
                    },
                );
                id
            })
            .await;
        Ok(id)
    }

    async fn update(&mut self, id: i32, data: VoteUpdate) -> Result<(), Error> {
        self.apply(|t| {
            let vote = t.votes.get_mut(&id).ok_or(Error::NotFound("vote"))?;
            vote.title = data.title;
            vote.description = data.description;
            vote.is_active = data.is_active;
            vote.start_date = data.start_date;
            vote.end_date = data.end_date;
            vote.allow_revote = data.allow_revote;
            vote.is_anonymous = data.is_anonymous;
            vote.updated_at = data.updated_at;
            Ok(())
        })
        .await
    }

    async fn delete(&mut self, id: i32) -> Result<bool, Error> {
        let deleted = self
            .apply(|t| {
                let deleted = t.votes.remove(&id).is_some();
                t.options.retain(|_, o| o.vote_id != id);
                t.responses.retain(|_, r| r.vote_id != id);
                deleted
            })
            .await;
        Ok(deleted)
    }

    async fn get(&mut self, id: i32) -> Result<Option<Vote>, Error> {
        Ok(self.apply(|t| t.votes.get(&id).cloned()).await)
    }

    async fn query(&mut self, query: &VoteQuery, pagination: Option<Pagination>) -> Result<Vec<Vote>, Error> {
        let votes = self
            .apply(|t| {
                let matched = t
                    .votes
                    .values()
                    .filter(|v| t.matches(query, v))
                    .sorted_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
                    .cloned();
                match pagination {
                    Some(p) => matched.skip(p.offset() as usize).take(p.limit() as usize).collect(),
                    None => matched.collect(),
                }
            })
            .await;
        Ok(votes)
    }

    async fn count(&mut self, query: &VoteQuery) -> Result<i64, Error> {
        Ok(self.apply(|t| t.votes.values().filter(|v| t.matches(query, v)).count() as i64).await)
    }
}

impl OptionCommon for Memory {
    async fn insert(&mut self, option: OptionInsert) -> Result<i32, Error> {
        self.apply(|t| {
            if !t.votes.contains_key(&option.vote_id) {
                return Err(Error::NotFound("vote"));
            }
            t.option_seq += 1;
            let id = t.option_seq;
            t.options.insert(
                id,
                Opt {
                    id,
                    vote_id: option.vote_id,
                    text: option.text,
                    sort_order: option.sort_order,
                },
            );
            Ok(id)
        })
        .await
    }

    async fn update(&mut self, id: i32, option: OptionUpdate) -> Result<(), Error> {
        self.apply(|t| {
            let opt = t.options.get_mut(&id).ok_or(Error::NotFound("option"))?;
            opt.text = option.text;
            opt.sort_order = option.sort_order;
            Ok(())
        })
        .await
    }

    async fn delete(&mut self, id: i32) -> Result<(), Error> {
        self.apply(|t| {
            t.options.remove(&id);
            t.responses.retain(|_, r| r.option_id != id);
        })
        .await;
        Ok(())
    }

    async fn get(&mut self, id: i32) -> Result<Option<Opt>, Error> {
        Ok(self.apply(|t| t.options.get(&id).cloned()).await)
    }

    async fn query_by_vote(&mut self, vote_id: i32) -> Result<Vec<Opt>, Error> {
        let opts = self
            .apply(|t| t.options.values().filter(|o| o.vote_id == vote_id).sorted_by_key(|o| (o.sort_order, o.id)).cloned().collect())
            .await;
        Ok(opts)
    }
}

impl ResponseCommon for Memory {
    async fn insert(&mut self, response: ResponseInsert) -> Result<Response, Error> {
        self.apply(|t| {
            if !t.options.get(&response.option_id).map(|o| o.vote_id == response.vote_id).unwrap_or(false) {
                return Err(Error::NotFound("option"));
            }
            if t.responses.values().any(|r| r.user_id == response.user_id && r.vote_id == response.vote_id) {
                return Err(Error::Conflict(format!("user {} already answered vote {}", response.user_id, response.vote_id)));
            }
            t.response_seq += 1;
            let row = Response {
                id: t.response_seq,
                user_id: response.user_id,
                option_id: response.option_id,
                vote_id: response.vote_id,
                voted_at: response.voted_at,
                updated_at: response.voted_at,
            };
            t.responses.insert(row.id, row.clone());
            Ok(row)
        })
        .await
    }

    async fn delete(&mut self, id: i32) -> Result<(), Error> {
        self.apply(|t| t.responses.remove(&id)).await;
        Ok(())
    }

    async fn get_by_user(&mut self, user_id: i32, vote_id: i32) -> Result<Option<Response>, Error> {
        Ok(self.apply(|t| t.responses_of(vote_id).find(|r| r.user_id == user_id).cloned()).await)
    }

    async fn voted_vote_ids(&mut self, user_id: i32, vote_ids: &[i32]) -> Result<Vec<i32>, Error> {
        let ids = self
            .apply(|t| {
                t.responses
                    .values()
                    .filter(|r| r.user_id == user_id && vote_ids.contains(&r.vote_id))
                    .map(|r| r.vote_id)
                    .unique()
                    .collect()
            })
            .await;
        Ok(ids)
    }

    async fn count_voters(&mut self, vote_id: i32) -> Result<i64, Error> {
        Ok(self.apply(|t| t.responses_of(vote_id).map(|r| r.user_id).unique().count() as i64).await)
    }

    async fn count_by_option(&mut self, vote_id: i32) -> Result<Vec<OptionCount>, Error> {
        let counts = self
            .apply(|t| {
                t.responses_of(vote_id)
                    .map(|r| r.option_id)
                    .counts()
                    .into_iter()
                    .map(|(option_id, count)| OptionCount { option_id, count: count as i64 })
                    .sorted_by_key(|c| c.option_id)
                    .collect()
            })
            .await;
        Ok(counts)
    }

    async fn voters(&mut self, vote_id: i32) -> Result<Vec<Voter>, Error> {
        let voters = self
            .apply(|t| {
                t.responses_of(vote_id)
                    .sorted_by(|a, b| b.voted_at.cmp(&a.voted_at).then(b.id.cmp(&a.id)))
                    .map(|r| Voter {
                        option_id: r.option_id,
                        user_id: r.user_id,
                        username: t.users.get(&r.user_id).map(|u| u.username.clone()).unwrap_or_default(),
                        voted_at: r.voted_at,
                    })
                    .collect()
            })
            .await;
        Ok(voters)
    }
}

impl UserCommon for Memory {
    async fn get(&mut self, id: i32) -> Result<Option<User>, Error> {
        Ok(self.apply(|t| t.users.get(&id).cloned()).await)
    }
}

impl Common for Memory {}
impl Store for Memory {}

impl TxStore for Memory {
    async fn lock_response(&mut self, _user_id: i32, _vote_id: i32) -> Result<(), Error> {
        // the transaction already owns the table lock
        Ok(())
    }

    async fn commit(self) -> Result<(), Error> {
        if let Some(MemoryTx { mut guard, work }) = self.tx {
            *guard = work;
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryManager {
    shared: Arc<Mutex<Tables>>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users are owned by the account service; this seeds the local copy.
    pub async fn add_user(&self, user: User) {
        self.shared.lock().await.users.insert(user.id, user);
    }
}

impl Manager for MemoryManager {
    type Store = Memory;
    type Tx = Memory;

    async fn db(&self) -> Result<Memory, Error> {
        Ok(Memory {
            shared: self.shared.clone(),
            tx: None,
        })
    }

    async fn tx(&self) -> Result<Memory, Error> {
        let guard = self.shared.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Memory {
            shared: self.shared.clone(),
            tx: Some(MemoryTx { guard, work }),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, Utc};

    fn vote_insert(title: &str) -> VoteInsert {
        VoteInsert {
            title: title.into(),
            description: "d".into(),
            created_by: 1,
            is_active: true,
            start_date: None,
            end_date: None,
            allow_revote: true,
            is_anonymous: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dropped_tx_discards_writes() {
        let manager = MemoryManager::new();
        let mut tx = manager.tx().await.unwrap();
        VoteCommon::insert(&mut tx, vote_insert("a")).await.unwrap();
        drop(tx);
        let mut db = manager.db().await.unwrap();
        assert!(VoteCommon::get(&mut db, 1).await.unwrap().is_none());

        let mut tx = manager.tx().await.unwrap();
        let id = VoteCommon::insert(&mut tx, vote_insert("b")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(VoteCommon::get(&mut db, id).await.unwrap().map(|v| v.title), Some("b".to_owned()));
    }

    #[tokio::test]
    async fn test_options_ordered_by_sort_order_then_id() {
        let manager = MemoryManager::new();
        let mut db = manager.db().await.unwrap();
        let vote_id = VoteCommon::insert(&mut db, vote_insert("a")).await.unwrap();
        for (text, sort_order) in [("c", 1), ("a", 0), ("b", 1)] {
            OptionCommon::insert(
                &mut db,
                OptionInsert {
                    vote_id,
                    text: text.into(),
                    sort_order,
                },
            )
            .await
            .unwrap();
        }
        let texts: Vec<String> = OptionCommon::query_by_vote(&mut db, vote_id).await.unwrap().into_iter().map(|o| o.text).collect();
        assert_eq!(texts, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_response_counts() {
        let manager = MemoryManager::new();
        let mut db = manager.db().await.unwrap();
        let vote_id = VoteCommon::insert(&mut db, vote_insert("a")).await.unwrap();
        let red = OptionCommon::insert(&mut db, OptionInsert { vote_id, text: "Red".into(), sort_order: 0 }).await.unwrap();
        let blue = OptionCommon::insert(&mut db, OptionInsert { vote_id, text: "Blue".into(), sort_order: 1 }).await.unwrap();
        let now = Utc::now();
        for (user_id, option_id, offset) in [(1, red, 0), (2, red, 1), (3, blue, 2)] {
            ResponseCommon::insert(
                &mut db,
                ResponseInsert {
                    user_id,
                    option_id,
                    vote_id,
                    voted_at: now + Duration::seconds(offset),
                },
            )
            .await
            .unwrap();
        }
        assert_eq!(ResponseCommon::count_voters(&mut db, vote_id).await.unwrap(), 3);
        assert_eq!(
            ResponseCommon::count_by_option(&mut db, vote_id).await.unwrap(),
            vec![OptionCount { option_id: red, count: 2 }, OptionCount { option_id: blue, count: 1 }]
        );
        let voters: Vec<i32> = ResponseCommon::voters(&mut db, vote_id).await.unwrap().into_iter().map(|v| v.user_id).collect();
        assert_eq!(voters, vec![3, 2, 1]);

        OptionCommon::delete(&mut db, red).await.unwrap();
        assert_eq!(ResponseCommon::count_voters(&mut db, vote_id).await.unwrap(), 1);
    }
}
