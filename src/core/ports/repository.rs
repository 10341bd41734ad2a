use crate::core::models::{
    common::Pagination,
    option::{Insert as OptionInsert, Opt, Update as OptionUpdate},
    response::{Insert as ResponseInsert, Response},
    tally::{OptionCount, Voter},
    user::User,
    vote::{Insert as VoteInsert, Query as VoteQuery, Update as VoteUpdate, Vote},
};
use crate::error::Error;

pub trait VoteCommon {
    async fn insert(&mut self, data: VoteInsert) -> Result<i32, Error>;
    async fn update(&mut self, id: i32, data: VoteUpdate) -> Result<(), Error>;
    async fn delete(&mut self, id: i32) -> Result<bool, Error>;
    async fn get(&mut self, id: i32) -> Result<Option<Vote>, Error>;
    async fn query(&mut self, query: &VoteQuery, pagination: Option<Pagination>) -> Result<Vec<Vote>, Error>;
    async fn count(&mut self, query: &VoteQuery) -> Result<i64, Error>;
}

pub trait OptionCommon {
    async fn insert(&mut self, option: OptionInsert) -> Result<i32, Error>;
    async fn update(&mut self, id: i32, option: OptionUpdate) -> Result<(), Error>;
    async fn delete(&mut self, id: i32) -> Result<(), Error>;
    async fn get(&mut self, id: i32) -> Result<Option<Opt>, Error>;
    /// Options of a vote ordered by `(sort_order, id)`.
    async fn query_by_vote(&mut self, vote_id: i32) -> Result<Vec<Opt>, Error>;
}

pub trait ResponseCommon {
    async fn insert(&mut self, response: ResponseInsert) -> Result<Response, Error>;
    async fn delete(&mut self, id: i32) -> Result<(), Error>;
    async fn get_by_user(&mut self, user_id: i32, vote_id: i32) -> Result<Option<Response>, Error>;
    /// Ids of the votes among `vote_ids` the user has answered.
    async fn voted_vote_ids(&mut self, user_id: i32, vote_ids: &[i32]) -> Result<Vec<i32>, Error>;
    async fn count_voters(&mut self, vote_id: i32) -> Result<i64, Error>;
    /// One entry per option that has at least one response.
    async fn count_by_option(&mut self, vote_id: i32) -> Result<Vec<OptionCount>, Error>;
    /// Newest first.
    async fn voters(&mut self, vote_id: i32) -> Result<Vec<Voter>, Error>;
}

pub trait UserCommon {
    async fn get(&mut self, id: i32) -> Result<Option<User>, Error>;
}

pub trait Common: VoteCommon + OptionCommon + ResponseCommon + UserCommon {}

pub trait Store: Common {}

pub trait TxStore: Store {
    /// Serialises every transaction touching the `(user, vote)` pair until
    /// this one ends.
    async fn lock_response(&mut self, user_id: i32, vote_id: i32) -> Result<(), Error>;
    async fn commit(self) -> Result<(), Error>;
    async fn rollback(self) -> Result<(), Error>;
}

pub trait Manager {
    type Store: Store;
    type Tx: TxStore;
    async fn db(&self) -> Result<Self::Store, Error>;
    async fn tx(&self) -> Result<Self::Tx, Error>;
}
