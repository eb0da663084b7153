//! the operations behind the command line tools

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::instrument;

use crate::auth::CredentialPrompt;
use crate::config::ConfigError;
use crate::connection::{Connector, DirectoryConnection};
use crate::error::{MutationError, PurgeError, QueryError, SessionError};
use crate::mutate::MembershipChange;
use crate::query::{MembershipTable, QueryEngine};
use crate::record::{AccountType, GroupRecord, UserRecord};
use crate::session::{with_session, SessionConfig};

/// errors reported by the command line tools
#[derive(Debug, Error)]
pub enum ToolError {
    /// a configuration error
    #[error("{0}")]
    Config(#[from] ConfigError),
    /// the session could not be opened
    #[error("{0}")]
    Session(#[from] SessionError),
    /// a search failed
    #[error("{0}")]
    Query(#[from] QueryError),
    /// a membership change failed
    #[error("{0}")]
    Mutation(#[from] MutationError),
    /// a purge stopped part way through
    #[error("{0}")]
    Purge(#[from] PurgeError),
    /// there is not exactly one group with the configured name
    #[error("Unable to find correct group {name} for users ({matches} matches)")]
    Group {
        /// the group name
        name: String,
        /// the number of groups found
        matches: usize,
    },
    /// no user matched
    #[error("Unable to find user with {0}, please check.")]
    UserNotFound(UserSelector),
    /// more than one user matched
    #[error("User with {0} is not unique. Please check.")]
    UserNotUnique(UserSelector),
    /// neither a login nor a life number was given
    #[error("You must specify a login (username) or a life/guest number.")]
    NoUserSelected,
    /// a search without any restriction
    #[error("You must limit the search! Do you really want ALL users?")]
    UnboundedSearch,
}

/// how the user to add or remove is identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSelector {
    /// by login name
    Login(String),
    /// by life or guest number
    LifeNumber(String),
}

impl UserSelector {
    /// the selector for a login or a life number, the login winning if both
    /// are given
    pub fn from_options(
        login: Option<String>,
        life_number: Option<String>,
    ) -> Result<Self, ToolError> {
        match (login, life_number) {
            (Some(l), _) => Ok(UserSelector::Login(l)),
            (None, Some(n)) => Ok(UserSelector::LifeNumber(n)),
            (None, None) => Err(ToolError::NoUserSelected),
        }
    }
}

impl std::fmt::Display for UserSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserSelector::Login(l) => write!(f, "login (username) {}", l),
            UserSelector::LifeNumber(n) => write!(f, "life/guest number {}", n),
        }
    }
}

/// the same configuration with anonymous or authenticated binds
fn with_authentication(config: &SessionConfig, authenticate: bool) -> SessionConfig {
    SessionConfig {
        authenticate,
        ..config.clone()
    }
}

/// the single group with the given name
fn single_group<C: DirectoryConnection>(
    query: &mut QueryEngine<'_, C>,
    name: &str,
) -> Result<GroupRecord, ToolError> {
    let mut groups = query.find_group_by_login(name)?;
    if groups.len() != 1 {
        return Err(ToolError::Group {
            name: name.to_string(),
            matches: groups.len(),
        });
    }
    Ok(groups.remove(0))
}

/// the single user identified by `selector`
fn single_user<C: DirectoryConnection>(
    query: &mut QueryEngine<'_, C>,
    selector: &UserSelector,
) -> Result<UserRecord, ToolError> {
    let mut users = match selector {
        UserSelector::Login(login) => query.find_user_by_login(login)?,
        UserSelector::LifeNumber(number) => query.find_user_by_employee_id(number)?,
    };
    match users.len() {
        0 => Err(ToolError::UserNotFound(selector.clone())),
        1 => Ok(users.remove(0)),
        _ => Err(ToolError::UserNotUnique(selector.clone())),
    }
}

/// the users in a group, using an anonymous session
#[instrument(skip(connector, config, prompt))]
pub fn list_group_members<K: Connector>(
    connector: &K,
    config: &SessionConfig,
    prompt: &mut dyn CredentialPrompt,
    group: &str,
) -> Result<Vec<UserRecord>, ToolError> {
    let config = with_authentication(config, false);
    with_session(connector, &config, prompt, |session| -> Result<_, ToolError> {
        Ok(session.query().resolve_group_members(group)?.into_lenient())
    })
}

/// the members of several groups merged per login, using an anonymous session
#[instrument(skip(connector, config, prompt))]
pub fn list_access<K: Connector>(
    connector: &K,
    config: &SessionConfig,
    prompt: &mut dyn CredentialPrompt,
    groups: &[&str],
) -> Result<MembershipTable, ToolError> {
    let config = with_authentication(config, false);
    with_session(connector, &config, prompt, |session| -> Result<_, ToolError> {
        let table = session.query().resolve_membership_table(groups)?;
        for err in &table.unresolved {
            tracing::warn!("Skipping group member: {}", err);
        }
        Ok(table)
    })
}

/// users by name and account type, refusing to list everybody
#[instrument(skip(connector, config, prompt))]
pub fn search_users<K: Connector>(
    connector: &K,
    config: &SessionConfig,
    prompt: &mut dyn CredentialPrompt,
    surname: Option<&str>,
    given_name: Option<&str>,
    account_type: Option<AccountType>,
) -> Result<Vec<UserRecord>, ToolError> {
    if surname.is_none() && given_name.is_none() && account_type.is_none() {
        return Err(ToolError::UnboundedSearch);
    }
    let config = with_authentication(config, false);
    with_session(connector, &config, prompt, |session| -> Result<_, ToolError> {
        Ok(session.query().find_users_by_surname_given_name_type(
            surname,
            given_name,
            account_type.map(AccountType::code),
        )?)
    })
}

/// add the selected user to a group, using an authenticated session
#[instrument(skip(connector, config, prompt))]
pub fn add_user<K: Connector>(
    connector: &K,
    config: &SessionConfig,
    prompt: &mut dyn CredentialPrompt,
    group: &str,
    selector: &UserSelector,
) -> Result<(UserRecord, MembershipChange), ToolError> {
    let config = with_authentication(config, true);
    with_session(connector, &config, prompt, |session| -> Result<_, ToolError> {
        let mut query = session.query();
        let group = single_group(&mut query, group)?;
        let user = single_user(&mut query, selector)?;
        let change = session
            .mutator()
            .add_member(&group.distinguished_name, &user.distinguished_name)?;
        Ok((user, change))
    })
}

/// remove the selected user from a group, using an authenticated session
#[instrument(skip(connector, config, prompt))]
pub fn remove_user<K: Connector>(
    connector: &K,
    config: &SessionConfig,
    prompt: &mut dyn CredentialPrompt,
    group: &str,
    selector: &UserSelector,
) -> Result<(UserRecord, MembershipChange), ToolError> {
    let config = with_authentication(config, true);
    with_session(connector, &config, prompt, |session| -> Result<_, ToolError> {
        let mut query = session.query();
        let group = single_group(&mut query, group)?;
        let user = single_user(&mut query, selector)?;
        let change = session
            .mutator()
            .remove_member(&group.distinguished_name, &user.distinguished_name)?;
        Ok((user, change))
    })
}

/// remove every member of a group, using an authenticated session
///
/// `progress` gets each member's display name (or DN, for members which are
/// not resolvable users) before it is removed; the removed DNs are returned
#[instrument(skip(connector, config, prompt, progress))]
pub fn purge_users<K, F>(
    connector: &K,
    config: &SessionConfig,
    prompt: &mut dyn CredentialPrompt,
    group: &str,
    mut progress: F,
) -> Result<Vec<String>, ToolError>
where
    K: Connector,
    F: FnMut(&str),
{
    let config = with_authentication(config, true);
    with_session(connector, &config, prompt, |session| -> Result<_, ToolError> {
        let mut query = session.query();
        let group = single_group(&mut query, group)?;
        let names: BTreeMap<String, String> = query
            .resolve_group_members(&group.sam_account_name)?
            .users
            .into_iter()
            .map(|u| (u.distinguished_name, u.display_name))
            .collect();
        let member_dns: Vec<String> = group.members.iter().cloned().collect();
        let removed = session.mutator().purge_all_members_with(
            &group.distinguished_name,
            &member_dns,
            |dn| progress(names.get(dn).map(String::as_str).unwrap_or(dn)),
        )?;
        Ok(removed)
    })
}
