use crate::actix_web::{self, FromRequest, HttpMessage};
use crate::error::Error;
use std::future::{ready, Ready};

/// Caller identity placed in the request extensions by the JWT middleware.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub id: i32,
}

impl FromRequest for UserInfo {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &actix_web::HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(req.extensions().get::<Self>().cloned().ok_or(Error::Unauthorized))
    }
}
