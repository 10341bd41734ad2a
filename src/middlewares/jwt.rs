use std::future::{ready, Future, Ready};
use std::pin::Pin;

#[cfg(test)]
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use crate::context::UserInfo;
use crate::core::tokener::{Payload, Tokener};
use crate::error::Error as AppError;
use crate::impls::tokener::jwt::JWT;

const BEARER: &str = "Bearer ";

#[derive(Debug, Deserialize, Serialize)]
pub struct Claim {
    pub user: i32,
    pub exp: i64,
}

#[cfg(test)]
impl Claim {
    pub fn new(user: i32, ttl: Duration) -> Self {
        Self {
            user,
            exp: (Utc::now() + ttl).timestamp(),
        }
    }
}

impl Payload for Claim {
    fn user(&self) -> i32 {
        self.user
    }
}

/// Verifies the `Authorization` token and stores the caller as [`UserInfo`]
/// in the request extensions.
pub struct JWTMiddleware {
    tokener: JWT,
}

impl JWTMiddleware {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { tokener: JWT::new(secret) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JWTMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
{
    type Error = Error;
    type Response = ServiceResponse<B>;
    type Transform = JWTService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JWTService {
            tokener: self.tokener.clone(),
            next_service: service,
        }))
    }
}

pub struct JWTService<S> {
    tokener: JWT,
    next_service: S,
}

impl<S> JWTService<S> {
    fn authenticate(&self, req: &ServiceRequest) -> Result<UserInfo, AppError> {
        let header = req.headers().get(AUTHORIZATION).ok_or(AppError::Unauthorized)?;
        let value = header.to_str().map_err(|_| AppError::Unauthorized)?;
        let token = value.strip_prefix(BEARER).unwrap_or(value).trim();
        let claim: Claim = self.tokener.verify_token(token).map_err(|e| {
            log::debug!("rejected token: {}", e);
            AppError::Unauthorized
        })?;
        Ok(UserInfo { id: claim.user() })
    }
}

impl<S, B> Service<ServiceRequest> for JWTService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.next_service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match self.authenticate(&req) {
            Err(e) => Box::pin(async move { Err(e.into()) }),
            Ok(user) => {
                req.extensions_mut().insert(user);
                let res_fut = self.next_service.call(req);
                Box::pin(async move {
                    let resp = res_fut.await?;
                    Ok(resp)
                })
            }
        }
    }
}
