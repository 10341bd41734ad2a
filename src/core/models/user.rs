use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq, Default)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub is_staff: bool,
    pub is_moderator: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Moderator,
    Admin,
}

impl Role {
    /// Staff outranks group membership.
    pub fn resolve(user: &User) -> Self {
        if user.is_staff {
            Role::Admin
        } else if user.is_moderator {
            Role::Moderator
        } else {
            Role::Member
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}
