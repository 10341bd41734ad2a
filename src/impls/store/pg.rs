use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, query_as, query_scalar, Executor, PgPool, Postgres, QueryBuilder, Transaction};

use crate::core::models::{
    common::Pagination,
    option::{Insert as OptionInsert, Opt, Update as OptionUpdate},
    response::{Insert as ResponseInsert, Response},
    tally::{OptionCount, Voter},
    user::User,
    vote::{Insert as VoteInsert, Query as VoteQuery, StatusFilter, Update as VoteUpdate, Vote},
};
use crate::core::ports::repository::{Common, Manager, OptionCommon, ResponseCommon, Store, TxStore, UserCommon, VoteCommon};
use crate::error::Error;

pub const MODERATOR_GROUP: &str = "Moderators";

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

pub struct PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e>,
{
    executor: E,
}

impl<E> PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e>,
{
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn push_vote_filters(stmt: &mut QueryBuilder<'_, Postgres>, query: &VoteQuery) {
    if query.active_only {
        stmt.push(" AND v.is_active");
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", escape_like(search));
        stmt.push(" AND (v.title ILIKE ").push_bind(pattern.clone());
        stmt.push(" OR v.description ILIKE ").push_bind(pattern).push(")");
    }
    if let Some((status, now)) = query.status {
        stmt.push(match status {
            StatusFilter::Active => " AND (",
            StatusFilter::Closed => " AND NOT (",
        });
        stmt.push("v.is_active AND (v.start_date IS NULL OR v.start_date <= ").push_bind(now);
        stmt.push(") AND (v.end_date IS NULL OR v.end_date >= ").push_bind(now).push("))");
    }
    if let Some((user_id, has_voted)) = query.voted {
        stmt.push(if has_voted { " AND EXISTS" } else { " AND NOT EXISTS" });
        stmt.push("(SELECT 1 FROM vote_responses AS r WHERE r.vote_id = v.id AND r.user_id = ").push_bind(user_id).push(")");
    }
}

impl<E> VoteCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, data: VoteInsert) -> Result<i32, Error> {
        let id = query_scalar(
            "INSERT INTO votes (title, description, created_by, is_active, start_date, end_date, allow_revote, is_anonymous, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING id",
        )
        .bind(data.title)
        .bind(data.description)
        .bind(data.created_by)
        .bind(data.is_active)
        .bind(data.start_date)
        .bind(data.end_date)
        .bind(data.allow_revote)
        .bind(data.is_anonymous)
        .bind(data.created_at)
        .fetch_one(&mut self.executor)
        .await?;
        Ok(id)
    }

    async fn update(&mut self, id: i32, data: VoteUpdate) -> Result<(), Error> {
        let res = query(
            "UPDATE votes
            SET title = $1, description = $2, is_active = $3, start_date = $4, end_date = $5, allow_revote = $6, is_anonymous = $7, updated_at = $8
            WHERE id = $9",
        )
        .bind(data.title)
        .bind(data.description)
        .bind(data.is_active)
        .bind(data.start_date)
        .bind(data.end_date)
        .bind(data.allow_revote)
        .bind(data.is_anonymous)
        .bind(data.updated_at)
        .bind(id)
        .execute(&mut self.executor)
        .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound("vote"));
        }
        Ok(())
    }

    async fn delete(&mut self, id: i32) -> Result<bool, Error> {
        let res = query("DELETE FROM votes WHERE id = $1").bind(id).execute(&mut self.executor).await?;
        Ok(res.rows_affected() > 0)
    }

    async fn get(&mut self, id: i32) -> Result<Option<Vote>, Error> {
        let vote = query_as("SELECT * FROM votes WHERE id = $1").bind(id).fetch_optional(&mut self.executor).await?;
        Ok(vote)
    }

    async fn query(&mut self, query: &VoteQuery, pagination: Option<Pagination>) -> Result<Vec<Vote>, Error> {
        let mut stmt = QueryBuilder::new("SELECT v.* FROM votes AS v WHERE 1 = 1");
        push_vote_filters(&mut stmt, query);
        stmt.push(" ORDER BY v.created_at DESC, v.id DESC");
        if let Some(p) = pagination {
            stmt.push(" LIMIT ").push_bind(p.limit());
            stmt.push(" OFFSET ").push_bind(p.offset());
        }
        let votes = stmt.build_query_as().fetch_all(&mut self.executor).await?;
        Ok(votes)
    }

    async fn count(&mut self, query: &VoteQuery) -> Result<i64, Error> {
        let mut stmt = QueryBuilder::new("SELECT COUNT(*) FROM votes AS v WHERE 1 = 1");
        push_vote_filters(&mut stmt, query);
        let (n,) = stmt.build_query_as().fetch_one(&mut self.executor).await?;
        Ok(n)
    }
}

impl<E> OptionCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, option: OptionInsert) -> Result<i32, Error> {
        let id = query_scalar("INSERT INTO vote_options (vote_id, text, sort_order) VALUES ($1, $2, $3) RETURNING id")
            .bind(option.vote_id)
            .bind(option.text)
            .bind(option.sort_order)
            .fetch_one(&mut self.executor)
            .await?;
        Ok(id)
    }

    async fn update(&mut self, id: i32, option: OptionUpdate) -> Result<(), Error> {
        let res = query("UPDATE vote_options SET text = $1, sort_order = $2 WHERE id = $3")
            .bind(option.text)
            .bind(option.sort_order)
            .bind(id)
            .execute(&mut self.executor)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound("option"));
        }
        Ok(())
    }

    async fn delete(&mut self, id: i32) -> Result<(), Error> {
        query("DELETE FROM vote_options WHERE id = $1").bind(id).execute(&mut self.executor).await?;
        Ok(())
    }

    async fn get(&mut self, id: i32) -> Result<Option<Opt>, Error> {
        let opt = query_as("SELECT * FROM vote_options WHERE id = $1").bind(id).fetch_optional(&mut self.executor).await?;
        Ok(opt)
    }

    async fn query_by_vote(&mut self, vote_id: i32) -> Result<Vec<Opt>, Error> {
        let opts = query_as("SELECT * FROM vote_options WHERE vote_id = $1 ORDER BY sort_order, id")
            .bind(vote_id)
            .fetch_all(&mut self.executor)
            .await?;
        Ok(opts)
    }
}

impl<E> ResponseCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn insert(&mut self, response: ResponseInsert) -> Result<Response, Error> {
        let (user_id, vote_id) = (response.user_id, response.vote_id);
        let row = query_as(
            "INSERT INTO vote_responses (user_id, option_id, vote_id, voted_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *",
        )
        .bind(response.user_id)
        .bind(response.option_id)
        .bind(response.vote_id)
        .bind(response.voted_at)
        .fetch_one(&mut self.executor)
        .await
        .map_err(|e| {
            let code = match &e {
                sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
                _ => None,
            };
            match code.as_deref() {
                Some(UNIQUE_VIOLATION) => Error::Conflict(format!("user {} already answered vote {}", user_id, vote_id)),
                Some(FOREIGN_KEY_VIOLATION) => Error::NotFound("option"),
                _ => Error::DatabaseError(e),
            }
        })?;
        Ok(row)
    }

    async fn delete(&mut self, id: i32) -> Result<(), Error> {
        query("DELETE FROM vote_responses WHERE id = $1").bind(id).execute(&mut self.executor).await?;
        Ok(())
    }

    async fn get_by_user(&mut self, user_id: i32, vote_id: i32) -> Result<Option<Response>, Error> {
        let response = query_as("SELECT * FROM vote_responses WHERE user_id = $1 AND vote_id = $2")
            .bind(user_id)
            .bind(vote_id)
            .fetch_optional(&mut self.executor)
            .await?;
        Ok(response)
    }

    async fn voted_vote_ids(&mut self, user_id: i32, vote_ids: &[i32]) -> Result<Vec<i32>, Error> {
        if vote_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = query_scalar("SELECT DISTINCT vote_id FROM vote_responses WHERE user_id = $1 AND vote_id = ANY($2)")
            .bind(user_id)
            .bind(vote_ids.to_vec())
            .fetch_all(&mut self.executor)
            .await?;
        Ok(ids)
    }

    async fn count_voters(&mut self, vote_id: i32) -> Result<i64, Error> {
        let n = query_scalar(
            "SELECT COUNT(DISTINCT r.user_id)
            FROM vote_responses AS r
            JOIN vote_options AS o ON r.option_id = o.id
            WHERE o.vote_id = $1",
        )
        .bind(vote_id)
        .fetch_one(&mut self.executor)
        .await?;
        Ok(n)
    }

    async fn count_by_option(&mut self, vote_id: i32) -> Result<Vec<OptionCount>, Error> {
        let counts = query_as(
            "SELECT r.option_id AS option_id, COUNT(*) AS count
            FROM vote_responses AS r
            JOIN vote_options AS o ON r.option_id = o.id
            WHERE o.vote_id = $1
            GROUP BY r.option_id
            ORDER BY r.option_id",
        )
        .bind(vote_id)
        .fetch_all(&mut self.executor)
        .await?;
        Ok(counts)
    }

    async fn voters(&mut self, vote_id: i32) -> Result<Vec<Voter>, Error> {
        let voters = query_as(
            "SELECT r.option_id AS option_id, r.user_id AS user_id, u.username AS username, r.voted_at AS voted_at
            FROM vote_responses AS r
            JOIN vote_options AS o ON r.option_id = o.id
            JOIN users AS u ON r.user_id = u.id
            WHERE o.vote_id = $1
            ORDER BY r.voted_at DESC, r.id DESC",
        )
        .bind(vote_id)
        .fetch_all(&mut self.executor)
        .await?;
        Ok(voters)
    }
}

impl<E> UserCommon for PgSqlx<E>
where
    for<'e> &'e mut E: Executor<'e, Database = Postgres>,
{
    async fn get(&mut self, id: i32) -> Result<Option<User>, Error> {
        let user = query_as(
            "SELECT
                u.id,
                u.username,
                u.is_staff,
                EXISTS(
                    SELECT 1
                    FROM user_groups AS ug
                    JOIN groups AS g ON ug.group_id = g.id
                    WHERE ug.user_id = u.id AND g.name = $2
                ) AS is_moderator
            FROM users AS u
            WHERE u.id = $1",
        )
        .bind(id)
        .bind(MODERATOR_GROUP)
        .fetch_optional(&mut self.executor)
        .await?;
        Ok(user)
    }
}

impl Common for PgSqlx<PoolConnection<Postgres>> {}
impl Common for PgSqlx<Transaction<'static, Postgres>> {}
impl Store for PgSqlx<PoolConnection<Postgres>> {}
impl Store for PgSqlx<Transaction<'static, Postgres>> {}

impl TxStore for PgSqlx<Transaction<'static, Postgres>> {
    async fn lock_response(&mut self, user_id: i32, vote_id: i32) -> Result<(), Error> {
        query("SELECT pg_advisory_xact_lock($1, $2)").bind(user_id).bind(vote_id).execute(&mut self.executor).await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), Error> {
        self.executor.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), Error> {
        self.executor.rollback().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgSqlxManager {
    pool: PgPool,
}

impl PgSqlxManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

impl Manager for PgSqlxManager {
    type Store = PgSqlx<PoolConnection<Postgres>>;
    type Tx = PgSqlx<Transaction<'static, Postgres>>;

    async fn db(&self) -> Result<Self::Store, Error> {
        let conn = self.pool.acquire().await?;
        Ok(PgSqlx::new(conn))
    }

    async fn tx(&self) -> Result<Self::Tx, Error> {
        let tx = self.pool.begin().await?;
        Ok(PgSqlx::new(tx))
    }
}
