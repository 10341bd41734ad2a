pub mod vote;

use crate::context::UserInfo;
use crate::core::models::user::User;
use crate::core::ports::repository::{Store, UserCommon};
use crate::error::Error;

/// Resolves the token's user against the store. A token for a user that no
/// longer exists is treated like no token.
pub(crate) async fn current_user<S>(store: &mut S, info: &UserInfo) -> Result<User, Error>
where
    S: Store,
{
    UserCommon::get(store, info.id).await?.ok_or_else(|| {
        log::debug!("token user {} does not exist", info.id);
        Error::Unauthorized
    })
}
