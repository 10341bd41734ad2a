use crate::error::Error;
use serde::{de::DeserializeOwned, Serialize};

pub trait Payload: Serialize + DeserializeOwned {
    /// Id of the authenticated user.
    fn user(&self) -> i32;
}

pub trait Tokener<P: Payload> {
    fn gen_token(&self, payload: &P) -> Result<String, Error>;
    fn verify_token(&self, token: &str) -> Result<P, Error>;
}
