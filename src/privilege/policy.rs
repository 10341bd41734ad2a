use crate::casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use crate::core::models::user::{Role, User};
use crate::core::models::vote::Vote;
use crate::error::Error;

const MODEL: &str = include_str!("model.conf");
const RESOURCE: &str = "vote";

/// `(role, action)` grants. Roles inherit along [`ROLE_INHERITANCE`].
const GRANTS: &[(&str, &str)] = &[
    ("member", "list"),
    ("member", "detail"),
    ("member", "results"),
    ("member", "respond"),
    ("moderator", "list_inactive"),
    ("moderator", "create"),
    ("moderator", "update"),
    ("moderator", "delete"),
    ("moderator", "view_voters"),
];

const ROLE_INHERITANCE: &[(&str, &str)] = &[("moderator", "member"), ("admin", "moderator")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    ListInactive,
    Detail,
    Results,
    Respond,
    Create,
    Update,
    Delete,
    ViewVoters,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::ListInactive => "list_inactive",
            Action::Detail => "detail",
            Action::Results => "results",
            Action::Respond => "respond",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::ViewVoters => "view_voters",
        }
    }
}

pub struct AccessPolicy {
    enforcer: Enforcer,
}

impl AccessPolicy {
    pub async fn new() -> Result<Self, Error> {
        let model = DefaultModel::from_str(MODEL).await?;
        let mut enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;
        enforcer.enable_log(log::log_enabled!(log::Level::Trace));
        enforcer
            .add_policies(GRANTS.iter().map(|(role, act)| vec![role.to_string(), RESOURCE.to_owned(), act.to_string()]).collect())
            .await?;
        enforcer
            .add_grouping_policies(ROLE_INHERITANCE.iter().map(|(role, parent)| vec![role.to_string(), parent.to_string()]).collect())
            .await?;
        Ok(Self { enforcer })
    }

    pub fn authorize(&self, user: &User, action: Action, vote: Option<&Vote>) -> Result<bool, Error> {
        self.authorize_role(Role::resolve(user), action, vote)
    }

    pub fn authorize_role(&self, role: Role, action: Action, vote: Option<&Vote>) -> Result<bool, Error> {
        if !self.enforcer.enforce((role.as_str(), RESOURCE, action.as_str()))? {
            return Ok(false);
        }
        // voter identities stay hidden on anonymous votes, whatever the role
        if action == Action::ViewVoters {
            return Ok(vote.map(|v| !v.is_anonymous).unwrap_or(false));
        }
        Ok(true)
    }

    pub fn ensure(&self, user: &User, action: Action, vote: Option<&Vote>) -> Result<(), Error> {
        if !self.authorize(user, action, vote)? {
            log::warn!("user {} is not allowed to {} vote {:?}", user.id, action.as_str(), vote.map(|v| v.id));
            return Err(Error::Forbidden);
        }
        Ok(())
    }
}
