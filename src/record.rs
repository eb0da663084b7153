//! typed snapshots of directory entries

use std::collections::BTreeSet;

use ldap3::SearchEntry;

use crate::error::QueryError;

/// attributes requested for user searches
pub const USER_ATTRIBUTES: &[&str] = &[
    "sAMAccountName",
    "distinguishedName",
    "displayName",
    "employeeID",
    "mail",
    "description",
];

/// attributes requested for group searches
pub const GROUP_ATTRIBUTES: &[&str] = &["sAMAccountName", "distinguishedName", "member", "memberOf"];

/// a user account as returned by one search
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserRecord {
    /// short login name
    pub sam_account_name: String,
    /// full DN of the account
    pub distinguished_name: String,
    /// display name, empty if the directory has none
    pub display_name: String,
    /// life or guest number
    pub employee_id: Option<String>,
    /// e-mail address
    pub mail: Option<String>,
    /// account type code, e.g. `PS` for staff
    pub description: Option<String>,
}

/// a group as returned by one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    /// short group name
    pub sam_account_name: String,
    /// full DN of the group
    pub distinguished_name: String,
    /// DNs of the direct members
    pub members: BTreeSet<String>,
    /// DNs of the groups this group is a member of
    pub member_of: BTreeSet<String>,
}

/// either kind of record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryRecord {
    /// a user account
    User(UserRecord),
    /// a group
    Group(GroupRecord),
}

impl DirectoryRecord {
    /// the login name of either variant
    pub fn sam_account_name(&self) -> &str {
        match self {
            DirectoryRecord::User(u) => &u.sam_account_name,
            DirectoryRecord::Group(g) => &g.sam_account_name,
        }
    }

    /// the DN of either variant
    pub fn distinguished_name(&self) -> &str {
        match self {
            DirectoryRecord::User(u) => &u.distinguished_name,
            DirectoryRecord::Group(g) => &g.distinguished_name,
        }
    }
}

/// account type codes stored in the `description` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    /// facility guest
    Guest,
    /// facility staff
    Staff,
    /// CFN staff
    CfnStaff,
    /// CFN user
    CfnUser,
}

impl AccountType {
    /// the code as stored in the directory
    pub fn code(self) -> &'static str {
        match self {
            AccountType::Guest => "LT",
            AccountType::Staff => "PS",
            AccountType::CfnStaff => "NC",
            AccountType::CfnUser => "XX",
        }
    }
}

/// all values of an attribute, matching the name case-insensitively as AD does
fn values<'a>(entry: &'a SearchEntry, name: &str) -> &'a [String] {
    entry
        .attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_slice())
        .unwrap_or(&[])
}

/// first value of an attribute
fn first(entry: &SearchEntry, name: &str) -> Option<String> {
    values(entry, name).first().cloned()
}

/// the entry DN, preferring the `distinguishedName` attribute
fn dn_of(entry: &SearchEntry) -> String {
    first(entry, "distinguishedName").unwrap_or_else(|| entry.dn.clone())
}

/// the login name, which every record needs
fn login_of(entry: &SearchEntry) -> Result<String, QueryError> {
    first(entry, "sAMAccountName").ok_or_else(|| QueryError::MalformedEntry {
        dn: entry.dn.clone(),
        attribute: "sAMAccountName",
    })
}

impl TryFrom<&SearchEntry> for UserRecord {
    type Error = QueryError;

    fn try_from(entry: &SearchEntry) -> Result<Self, Self::Error> {
        Ok(UserRecord {
            sam_account_name: login_of(entry)?,
            distinguished_name: dn_of(entry),
            display_name: first(entry, "displayName").unwrap_or_default(),
            employee_id: first(entry, "employeeID"),
            mail: first(entry, "mail"),
            description: first(entry, "description"),
        })
    }
}

impl TryFrom<&SearchEntry> for GroupRecord {
    type Error = QueryError;

    fn try_from(entry: &SearchEntry) -> Result<Self, Self::Error> {
        Ok(GroupRecord {
            sam_account_name: login_of(entry)?,
            distinguished_name: dn_of(entry),
            members: values(entry, "member").iter().cloned().collect(),
            member_of: values(entry, "memberOf").iter().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> SearchEntry {
        SearchEntry {
            dn: dn.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect::<HashMap<_, _>>(),
            bin_attrs: HashMap::new(),
        }
    }

    #[test]
    fn user_attribute_names_are_case_insensitive() {
        let e = entry(
            "CN=Alice,OU=Users,DC=example",
            &[
                ("samaccountname", &["alice"]),
                ("DISPLAYNAME", &["Alice A."]),
                ("employeeID", &["12345"]),
            ],
        );
        let user = UserRecord::try_from(&e).unwrap();
        assert_eq!(user.sam_account_name, "alice");
        assert_eq!(user.distinguished_name, "CN=Alice,OU=Users,DC=example");
        assert_eq!(user.display_name, "Alice A.");
        assert_eq!(user.employee_id.as_deref(), Some("12345"));
        assert_eq!(user.mail, None);
    }

    #[test]
    fn group_without_members_has_empty_set() {
        let e = entry("CN=BL-STAFF,OU=Groups", &[("sAMAccountName", &["BL-STAFF"])]);
        let group = GroupRecord::try_from(&e).unwrap();
        assert!(group.members.is_empty());
        assert!(group.member_of.is_empty());
    }

    #[test]
    fn missing_login_is_malformed() {
        let e = entry("CN=ghost", &[("mail", &["ghost@example.org"])]);
        match UserRecord::try_from(&e) {
            Err(QueryError::MalformedEntry { dn, attribute }) => {
                assert_eq!(dn, "CN=ghost");
                assert_eq!(attribute, "sAMAccountName");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
