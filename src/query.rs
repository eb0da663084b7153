//! user and group lookups over a [DirectorySession]

use std::collections::BTreeMap;

use tracing::instrument;

use crate::connection::DirectoryConnection;
use crate::error::{DataIntegrityError, QueryError};
use crate::filter;
use crate::record::{GroupRecord, UserRecord, GROUP_ATTRIBUTES, USER_ATTRIBUTES};
use crate::session::DirectorySession;

/// builds filters, runs them and turns the entries into records
#[derive(Debug)]
pub struct QueryEngine<'a, C: DirectoryConnection> {
    /// the session searches go through
    session: &'a mut DirectorySession<C>,
}

/// the result of resolving the members of one group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMembers {
    /// the group, `None` if no group had the requested name
    pub group: Option<GroupRecord>,
    /// members which resolved to exactly one user
    pub users: Vec<UserRecord>,
    /// members which did not
    pub unresolved: Vec<DataIntegrityError>,
}

impl GroupMembers {
    /// true if every member DN resolved to exactly one user
    pub fn is_consistent(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// all users, or the first inconsistency found
    pub fn into_strict(self) -> Result<Vec<UserRecord>, QueryError> {
        match self.unresolved.into_iter().next() {
            Some(err) => Err(err.into()),
            None => Ok(self.users),
        }
    }

    /// the resolvable users, logging every inconsistency
    pub fn into_lenient(self) -> Vec<UserRecord> {
        for err in &self.unresolved {
            tracing::warn!("Skipping group member: {}", err);
        }
        self.users
    }
}

/// one user in a [MembershipTable]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRow {
    /// the user
    pub user: UserRecord,
    /// for each queried group whether the user is a direct member
    pub groups: BTreeMap<String, bool>,
}

/// the members of several groups, merged per login
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipTable {
    /// the queried group names, in query order
    pub groups: Vec<String>,
    /// one row per login
    pub rows: BTreeMap<String, MembershipRow>,
    /// members of any group which did not resolve to exactly one user
    pub unresolved: Vec<DataIntegrityError>,
}

impl<'a, C: DirectoryConnection> QueryEngine<'a, C> {
    /// create a query engine using the given session
    pub fn new(session: &'a mut DirectorySession<C>) -> Self {
        QueryEngine { session }
    }

    /// run a user search under the user base, skipping entries without a
    /// login such as contacts
    fn search_users(&mut self, filter: String) -> Result<Vec<UserRecord>, QueryError> {
        let base = self.session.user_search_base().to_string();
        tracing::debug!("User search under {} with filter {}", base, filter);
        let entries = self
            .session
            .connection()
            .search(&base, &filter, USER_ATTRIBUTES)
            .map_err(|source| QueryError::Search {
                base,
                filter,
                source,
            })?;
        Ok(entries
            .iter()
            .filter_map(|entry| match UserRecord::try_from(entry) {
                Ok(user) => Some(user),
                Err(err) => {
                    tracing::warn!("Skipping entry which is not a user account: {}", err);
                    None
                }
            })
            .collect())
    }

    /// run a group search under the group base
    fn search_groups(&mut self, filter: String) -> Result<Vec<GroupRecord>, QueryError> {
        let base = self.session.group_search_base().to_string();
        tracing::debug!("Group search under {} with filter {}", base, filter);
        let entries = self
            .session
            .connection()
            .search(&base, &filter, GROUP_ATTRIBUTES)
            .map_err(|source| QueryError::Search {
                base,
                filter,
                source,
            })?;
        entries.iter().map(GroupRecord::try_from).collect()
    }

    /// users with the given life or guest number
    #[instrument(skip(self))]
    pub fn find_user_by_employee_id(&mut self, id: &str) -> Result<Vec<UserRecord>, QueryError> {
        self.search_users(filter::equality("employeeID", id))
    }

    /// users with the given login
    #[instrument(skip(self))]
    pub fn find_user_by_login(&mut self, login: &str) -> Result<Vec<UserRecord>, QueryError> {
        self.search_users(filter::equality("sAMAccountName", login))
    }

    /// users with the given DN
    #[instrument(skip(self))]
    pub fn find_user_by_dn(&mut self, dn: &str) -> Result<Vec<UserRecord>, QueryError> {
        self.search_users(filter::equality("distinguishedName", dn))
    }

    /// users matching all given components, a missing component matches anything
    ///
    /// an all-`None` search returns every user below the user base
    #[instrument(skip(self))]
    pub fn find_users_by_surname_given_name_type(
        &mut self,
        surname: Option<&str>,
        given_name: Option<&str>,
        type_code: Option<&str>,
    ) -> Result<Vec<UserRecord>, QueryError> {
        self.search_users(filter::and([
            filter::equality_or_any("sn", surname),
            filter::equality_or_any("givenName", given_name),
            filter::equality_or_any("description", type_code),
        ]))
    }

    /// groups with the given login
    #[instrument(skip(self))]
    pub fn find_group_by_login(&mut self, login: &str) -> Result<Vec<GroupRecord>, QueryError> {
        self.search_groups(filter::equality("sAMAccountName", login))
    }

    /// resolve the direct members of a group to users
    ///
    /// a missing group or a group without members gives an empty result,
    /// members not resolving to exactly one user end up in
    /// [GroupMembers::unresolved] without stopping the others
    #[instrument(skip(self))]
    pub fn resolve_group_members(&mut self, login: &str) -> Result<GroupMembers, QueryError> {
        let mut groups = self.find_group_by_login(login)?;
        if groups.len() > 1 {
            tracing::warn!(
                "{} groups named {}, using the first one",
                groups.len(),
                login
            );
        }
        let group = match groups.drain(..).next() {
            Some(g) => g,
            None => {
                tracing::debug!("No group named {}", login);
                return Ok(GroupMembers::default());
            }
        };
        let mut users = Vec::with_capacity(group.members.len());
        let mut unresolved = Vec::new();
        for dn in &group.members {
            let mut found = self.find_user_by_dn(dn)?;
            if found.len() == 1 {
                users.extend(found.pop());
            } else {
                tracing::warn!("Member {} of {} matched {} users", dn, login, found.len());
                unresolved.push(DataIntegrityError {
                    dn: dn.clone(),
                    matches: found.len(),
                });
            }
        }
        Ok(GroupMembers {
            group: Some(group),
            users,
            unresolved,
        })
    }

    /// resolve several groups and merge their members per login
    #[instrument(skip(self))]
    pub fn resolve_membership_table(
        &mut self,
        groups: &[&str],
    ) -> Result<MembershipTable, QueryError> {
        let mut table = MembershipTable {
            groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        };
        for group in groups {
            let members = self.resolve_group_members(group)?;
            table.unresolved.extend(members.unresolved);
            for user in members.users {
                let row = table
                    .rows
                    .entry(user.sam_account_name.clone())
                    .or_insert_with(|| MembershipRow {
                        user,
                        groups: groups.iter().map(|g| (g.to_string(), false)).collect(),
                    });
                row.groups.insert(group.to_string(), true);
            }
        }
        Ok(table)
    }
}
