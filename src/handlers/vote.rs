use chrono::Utc;

use crate::actix_web::{
    web::{Data, Json, Path, Query},
    HttpResponse,
};
use crate::context::UserInfo;
use crate::core::models::{
    response::{Response, Submit},
    tally::VoteResults,
    vote::{Vote, VoteCreate, VoteDetail, VoteFilter, VoteSummary, VoteUpdate},
};
use crate::core::ports::repository::{Manager, VoteCommon};
use crate::core::services::{response as response_service, tally, vote as vote_service};
use crate::error::Error;
use crate::handlers::current_user;
use crate::privilege::policy::AccessPolicy;
use crate::response::List;

pub async fn list<M: Manager>(user_info: UserInfo, Query(filter): Query<VoteFilter>, manager: Data<M>, policy: Data<AccessPolicy>) -> Result<Json<List<VoteSummary>>, Error> {
    let mut db = manager.db().await?;
    let user = current_user(&mut db, &user_info).await?;
    let (votes, total) = vote_service::list_votes(&mut db, &policy, &user, filter, Utc::now()).await?;
    Ok(Json(List::new(votes, total)))
}

pub async fn create<M: Manager>(user_info: UserInfo, Json(body): Json<VoteCreate>, manager: Data<M>, policy: Data<AccessPolicy>) -> Result<HttpResponse, Error> {
    let user = current_user(&mut manager.db().await?, &user_info).await?;
    let vote = vote_service::create_vote(manager.tx().await?, &policy, &user, body, Utc::now()).await?;
    Ok(HttpResponse::Created().json(vote))
}

pub async fn detail<M: Manager>(user_info: UserInfo, vote_id: Path<(i32,)>, manager: Data<M>, policy: Data<AccessPolicy>) -> Result<Json<VoteDetail>, Error> {
    let mut db = manager.db().await?;
    let user = current_user(&mut db, &user_info).await?;
    let detail = vote_service::vote_detail(&mut db, &policy, &user, vote_id.0, Utc::now()).await?;
    Ok(Json(detail))
}

pub async fn update<M: Manager>(
    user_info: UserInfo,
    vote_id: Path<(i32,)>,
    Json(body): Json<VoteUpdate>,
    manager: Data<M>,
    policy: Data<AccessPolicy>,
) -> Result<Json<Vote>, Error> {
    let user = current_user(&mut manager.db().await?, &user_info).await?;
    let vote = vote_service::update_vote(manager.tx().await?, &policy, &user, vote_id.0, body, Utc::now()).await?;
    Ok(Json(vote))
}

pub async fn delete<M: Manager>(user_info: UserInfo, vote_id: Path<(i32,)>, manager: Data<M>, policy: Data<AccessPolicy>) -> Result<HttpResponse, Error> {
    let user = current_user(&mut manager.db().await?, &user_info).await?;
    vote_service::delete_vote(manager.tx().await?, &policy, &user, vote_id.0).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn results<M: Manager>(user_info: UserInfo, vote_id: Path<(i32,)>, manager: Data<M>, policy: Data<AccessPolicy>) -> Result<Json<VoteResults>, Error> {
    let mut db = manager.db().await?;
    let user = current_user(&mut db, &user_info).await?;
    let vote = VoteCommon::get(&mut db, vote_id.0).await?.ok_or(Error::NotFound("vote"))?;
    let results = tally::get_results(&mut db, &policy, &user, &vote).await?;
    Ok(Json(results))
}

pub async fn respond<M: Manager>(
    user_info: UserInfo,
    vote_id: Path<(i32,)>,
    Json(Submit { option_id }): Json<Submit>,
    manager: Data<M>,
    policy: Data<AccessPolicy>,
) -> Result<Json<Response>, Error> {
    let user = current_user(&mut manager.db().await?, &user_info).await?;
    let response = response_service::record_response(manager.tx().await?, &policy, &user, vote_id.0, option_id, Utc::now()).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actix_web::{
        http::{header::AUTHORIZATION, StatusCode},
        test, web, App,
    };
    use crate::core::models::user::User;
    use crate::core::tokener::Tokener;
    use crate::impls::store::memory::MemoryManager;
    use crate::impls::tokener::jwt::JWT;
    use crate::middlewares::jwt::{Claim, JWTMiddleware};
    use chrono::Duration;
    use default::default;
    use serde_json::{json, Value};

    const SECRET: &[u8] = b"handler-secret";
    const MEMBER: i32 = 1;
    const OTHER: i32 = 2;
    const MODERATOR: i32 = 10;

    async fn state() -> (Data<MemoryManager>, Data<AccessPolicy>) {
        let manager = MemoryManager::new();
        for (id, name) in [(MEMBER, "alice"), (OTHER, "bob")] {
            manager
                .add_user(User {
                    id,
                    username: name.into(),
                    ..default()
                })
                .await;
        }
        manager
            .add_user(User {
                id: MODERATOR,
                username: "mod".into(),
                is_moderator: true,
                ..default()
            })
            .await;
        (Data::new(manager), Data::new(AccessPolicy::new().await.unwrap()))
    }

    fn bearer(user: i32) -> (actix_web::http::header::HeaderName, String) {
        let token = JWT::new(SECRET.to_vec()).gen_token(&Claim::new(user, Duration::hours(1))).unwrap();
        (AUTHORIZATION, format!("Bearer {}", token))
    }

    macro_rules! app {
        ($manager:expr, $policy:expr) => {
            test::init_service(
                App::new()
                    .app_data($manager.clone())
                    .app_data($policy.clone())
                    .service(
                        web::scope("/votes")
                            .wrap(JWTMiddleware::new(SECRET.to_vec()))
                            .route("", web::get().to(list::<MemoryManager>))
                            .route("", web::post().to(create::<MemoryManager>))
                            .route("/{vote_id}", web::get().to(detail::<MemoryManager>))
                            .route("/{vote_id}", web::put().to(update::<MemoryManager>))
                            .route("/{vote_id}", web::delete().to(delete::<MemoryManager>))
                            .route("/{vote_id}/results", web::get().to(results::<MemoryManager>))
                            .route("/{vote_id}/response", web::put().to(respond::<MemoryManager>)),
                    ),
            )
            .await
        };
    }

    fn color_vote() -> Value {
        json!({
            "title": "Favorite color",
            "description": "Pick one",
            "allow_revote": false,
            "options": [
                {"text": "Red", "sort_order": 0},
                {"text": "Blue", "sort_order": 1},
                {"text": "Green", "sort_order": 2}
            ]
        })
    }

    #[actix_web::test]
    async fn test_vote_lifecycle() {
        let (manager, policy) = state().await;
        let app = app!(manager, policy);

        let req = test::TestRequest::post().uri("/votes").insert_header(bearer(MODERATOR)).set_json(color_vote()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let vote: Value = test::read_body_json(resp).await;
        let vote_id = vote["id"].as_i64().unwrap();
        assert_eq!(vote["allow_revote"], json!(false));
        assert_eq!(vote["is_active"], json!(true));

        let req = test::TestRequest::get().uri(&format!("/votes/{}", vote_id)).insert_header(bearer(MEMBER)).to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(detail["status"], json!("open"));
        assert_eq!(detail["can_vote"], json!(true));
        assert_eq!(detail["has_voted"], json!(false));
        let options = detail["options"].as_array().unwrap();
        let red = options[0]["id"].as_i64().unwrap();
        let blue = options[1]["id"].as_i64().unwrap();

        let req = test::TestRequest::put()
            .uri(&format!("/votes/{}/response", vote_id))
            .insert_header(bearer(MEMBER))
            .set_json(json!({ "option_id": red }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::put()
            .uri(&format!("/votes/{}/response", vote_id))
            .insert_header(bearer(OTHER))
            .set_json(json!({ "option_id": blue }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::put()
            .uri(&format!("/votes/{}/response", vote_id))
            .insert_header(bearer(MEMBER))
            .set_json(json!({ "option_id": blue }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], json!("revote_disallowed"));

        let req = test::TestRequest::get().uri(&format!("/votes/{}/results", vote_id)).insert_header(bearer(MEMBER)).to_request();
        let results: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(results["total_votes"], json!(2));
        assert_eq!(results["show_voters"], json!(false));
        let tallies: Vec<(i64, f64)> = results["options"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| (t["count"].as_i64().unwrap(), t["percentage"].as_f64().unwrap()))
            .collect();
        assert_eq!(tallies, vec![(1, 50.0), (1, 50.0), (0, 0.0)]);

        let req = test::TestRequest::get().uri(&format!("/votes/{}/results", vote_id)).insert_header(bearer(MODERATOR)).to_request();
        let results: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(results["options"][0]["voters"][0]["username"], json!("alice"));

        let req = test::TestRequest::get().uri("/votes?voted=yes").insert_header(bearer(MEMBER)).to_request();
        let list: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(list["total"], json!(1));
        assert_eq!(list["list"][0]["has_voted"], json!(true));

        let req = test::TestRequest::delete().uri(&format!("/votes/{}", vote_id)).insert_header(bearer(MEMBER)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::delete().uri(&format!("/votes/{}", vote_id)).insert_header(bearer(MODERATOR)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get().uri(&format!("/votes/{}", vote_id)).insert_header(bearer(MEMBER)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_create_rejected() {
        let (manager, policy) = state().await;
        let app = app!(manager, policy);

        let req = test::TestRequest::post().uri("/votes").insert_header(bearer(MEMBER)).set_json(color_vote()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let mut body = color_vote();
        body["options"] = json!([{ "text": "Only" }]);
        let req = test::TestRequest::post().uri("/votes").insert_header(bearer(MODERATOR)).set_json(body).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], json!("validation_error"));
    }

    #[actix_web::test]
    async fn test_update_replaces_options() {
        let (manager, policy) = state().await;
        let app = app!(manager, policy);
        let req = test::TestRequest::post().uri("/votes").insert_header(bearer(MODERATOR)).set_json(color_vote()).to_request();
        let vote: Value = test::call_and_read_body_json(&app, req).await;
        let vote_id = vote["id"].as_i64().unwrap();

        let req = test::TestRequest::get().uri(&format!("/votes/{}", vote_id)).insert_header(bearer(MODERATOR)).to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        let red = detail["options"][0]["id"].as_i64().unwrap();

        let req = test::TestRequest::put()
            .uri(&format!("/votes/{}", vote_id))
            .insert_header(bearer(MODERATOR))
            .set_json(json!({
                "title": "Favorite colour",
                "description": "Pick one",
                "options": [
                    {"id": red, "text": "Crimson", "sort_order": 1},
                    {"text": "Yellow", "sort_order": 0}
                ]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let updated: Value = test::read_body_json(resp).await;
        assert_eq!(updated["title"], json!("Favorite colour"));

        let req = test::TestRequest::get().uri(&format!("/votes/{}", vote_id)).insert_header(bearer(MODERATOR)).to_request();
        let detail: Value = test::call_and_read_body_json(&app, req).await;
        let texts: Vec<&str> = detail["options"].as_array().unwrap().iter().map(|o| o["text"].as_str().unwrap()).collect();
        assert_eq!(texts, vec!["Yellow", "Crimson"]);
    }

    #[actix_web::test]
    async fn test_list_rejects_out_of_range_paging() {
        let (manager, policy) = state().await;
        let app = app!(manager, policy);
        for uri in ["/votes?page=9223372036854775807", "/votes?size=101"] {
            let req = test::TestRequest::get().uri(uri).insert_header(bearer(MEMBER)).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], json!("validation_error"));
        }
    }

    #[actix_web::test]
    async fn test_unknown_user_and_missing_token() {
        let (manager, policy) = state().await;
        let app = app!(manager, policy);
        let req = test::TestRequest::get().uri("/votes").insert_header(bearer(404)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get().uri("/votes").to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }
}
