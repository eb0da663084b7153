//! adding and removing group members

use tracing::instrument;

use crate::connection::{member_mod, DirectoryConnection};
use crate::error::{
    result_code, MutationError, PurgeError, RC_ATTRIBUTE_OR_VALUE_EXISTS, RC_ENTRY_ALREADY_EXISTS,
    RC_NO_SUCH_ATTRIBUTE,
};
use crate::session::DirectorySession;

/// what a single membership change did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// the group was modified
    Applied,
    /// the directory reported the member as already present or already absent
    Unchanged,
}

/// applies `member` modifications over a [DirectorySession]
#[derive(Debug)]
pub struct GroupMembershipMutator<'a, C: DirectoryConnection> {
    /// the session modifications go through
    session: &'a mut DirectorySession<C>,
}

impl<'a, C: DirectoryConnection> GroupMembershipMutator<'a, C> {
    /// create a mutator using the given session
    pub fn new(session: &'a mut DirectorySession<C>) -> Self {
        GroupMembershipMutator { session }
    }

    /// add or delete one `member` value, `unchanged_rc` being the result codes
    /// meaning there was nothing to do
    fn change(
        &mut self,
        add: bool,
        group_dn: &str,
        member_dn: &str,
        unchanged_rc: &[u32],
    ) -> Result<MembershipChange, MutationError> {
        match self
            .session
            .connection()
            .modify(group_dn, vec![member_mod(add, member_dn)])
        {
            Ok(()) => Ok(MembershipChange::Applied),
            Err(err) if result_code(&err).is_some_and(|rc| unchanged_rc.contains(&rc)) => {
                tracing::info!("Directory reported nothing to change: {}", err);
                Ok(MembershipChange::Unchanged)
            }
            Err(err) => Err(MutationError::from_ldap(group_dn, member_dn, err)),
        }
    }

    /// add a user to a group
    #[instrument(skip(self))]
    pub fn add_member(
        &mut self,
        group_dn: &str,
        user_dn: &str,
    ) -> Result<MembershipChange, MutationError> {
        let change = self.change(
            true,
            group_dn,
            user_dn,
            &[RC_ATTRIBUTE_OR_VALUE_EXISTS, RC_ENTRY_ALREADY_EXISTS],
        )?;
        if change == MembershipChange::Applied {
            tracing::info!("Added {} to {}", user_dn, group_dn);
        }
        Ok(change)
    }

    /// remove a user from a group
    #[instrument(skip(self))]
    pub fn remove_member(
        &mut self,
        group_dn: &str,
        user_dn: &str,
    ) -> Result<MembershipChange, MutationError> {
        let change = self.change(false, group_dn, user_dn, &[RC_NO_SUCH_ATTRIBUTE])?;
        if change == MembershipChange::Applied {
            tracing::info!("Removed {} from {}", user_dn, group_dn);
        }
        Ok(change)
    }

    /// remove every given member, stopping at the first failure
    pub fn purge_all_members(
        &mut self,
        group_dn: &str,
        member_dns: &[String],
    ) -> Result<Vec<String>, PurgeError> {
        self.purge_all_members_with(group_dn, member_dns, |_| ())
    }

    /// like [GroupMembershipMutator::purge_all_members], calling `progress`
    /// with each DN before it is removed
    ///
    /// nothing is rolled back: on error the members removed so far stay
    /// removed and are listed in the [PurgeError]
    #[instrument(skip(self, member_dns, progress), fields(members = member_dns.len()))]
    pub fn purge_all_members_with<F>(
        &mut self,
        group_dn: &str,
        member_dns: &[String],
        mut progress: F,
    ) -> Result<Vec<String>, PurgeError>
    where
        F: FnMut(&str),
    {
        let mut removed = Vec::with_capacity(member_dns.len());
        for dn in member_dns {
            progress(dn);
            if let Err(source) = self.remove_member(group_dn, dn) {
                tracing::error!(
                    "Purge of {} stopped at {} after {} removal(s)",
                    group_dn,
                    dn,
                    removed.len()
                );
                return Err(PurgeError {
                    removed,
                    failed_dn: dn.clone(),
                    source,
                });
            }
            removed.push(dn.clone());
        }
        Ok(removed)
    }
}
