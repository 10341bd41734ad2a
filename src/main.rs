extern crate actix_web;
extern crate casbin;
extern crate chrono;
extern crate default;
extern crate dotenv;
extern crate env_logger;
extern crate itertools;
extern crate jsonwebtoken;
extern crate log;
extern crate serde;
extern crate serde_json;
extern crate sqlx;
extern crate thiserror;
extern crate tokio;

mod config;
mod context;
pub mod core;
mod error;
mod handlers;
mod impls;
mod middlewares;
pub mod privilege;
pub mod response;

use actix_web::web::{delete, get, post, put, scope, Data};
use actix_web::HttpServer;
use config::{Config, StoreKind};
use default::default;
use crate::core::models::user::User;
use crate::core::ports::repository::Manager;
use error::Error;
use impls::store::{memory::MemoryManager, pg::PgSqlxManager};
use middlewares::jwt::JWTMiddleware;
use privilege::policy::AccessPolicy;

async fn serve<M>(config: Config, manager: M, policy: AccessPolicy) -> Result<(), Error>
where
    M: Manager + Send + Sync + 'static,
{
    let manager = Data::new(manager);
    let policy = Data::new(policy);
    let secret = config.jwt_secret.clone();
    log::info!("listening on {}", config.bind_addr);
    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(manager.clone())
            .app_data(policy.clone())
            .service(
                scope("votes")
                    .wrap(JWTMiddleware::new(secret.clone()))
                    .route("", get().to(handlers::vote::list::<M>))
                    .route("", post().to(handlers::vote::create::<M>))
                    .service(
                        scope("{vote_id}")
                            .route("", get().to(handlers::vote::detail::<M>))
                            .route("", put().to(handlers::vote::update::<M>))
                            .route("", delete().to(handlers::vote::delete::<M>))
                            .route("results", get().to(handlers::vote::results::<M>))
                            .route("response", put().to(handlers::vote::respond::<M>)),
                    ),
            )
    })
    .bind(config.bind_addr.as_str())
    .map_err(|e| Error::ServerError(format!("failed to bind {}: {}", config.bind_addr, e)))?
    .run()
    .await
    .map_err(|e| Error::ServerError(e.to_string()))
}

#[actix_web::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info,actix_web=info")).init();
    let policy = AccessPolicy::new().await?;
    match config.store {
        StoreKind::Postgres => {
            let url = config.database_url.clone().ok_or_else(|| Error::Config(format!("{} is not set", config::DATABASE_URL)))?;
            let manager = PgSqlxManager::connect(&url, config.max_connections).await?;
            if config.run_migrations {
                manager.migrate().await?;
                log::info!("migrations applied");
            }
            serve(config, manager, policy).await
        }
        StoreKind::Memory => {
            log::warn!("using the in-memory store, data is lost on exit");
            let manager = MemoryManager::new();
            manager
                .add_user(User {
                    id: 1,
                    username: "admin".into(),
                    is_staff: true,
                    ..default()
                })
                .await;
            serve(config, manager, policy).await
        }
    }
}
