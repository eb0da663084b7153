//! error types shared by the session, query and mutation layers

use thiserror::Error;

/// LDAP result code for `noSuchAttribute`
pub const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
/// LDAP result code for `attributeOrValueExists`
pub const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
/// LDAP result code for `authMethodNotSupported`
pub const RC_AUTH_METHOD_NOT_SUPPORTED: u32 = 7;
/// LDAP result code for `invalidCredentials`
pub const RC_INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code for `insufficientAccessRights`
pub const RC_INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
/// LDAP result code for `entryAlreadyExists`, which AD uses for duplicate members
pub const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// the LDAP result code carried by an [ldap3::LdapError], if the error came
/// from a server response rather than the transport
pub fn result_code(err: &ldap3::LdapError) -> Option<u32> {
    match err {
        ldap3::LdapError::LdapResult { result } => Some(result.rc),
        _ => None,
    }
}

/// errors on the transport level, before any authentication happened
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// the CA certificate could not be read
    #[error("could not read CA certificate {path}: {source}")]
    CaCertificate {
        /// path of the CA certificate
        path: std::path::PathBuf,
        /// the underlying I/O error
        source: std::io::Error,
    },
    /// an error in the native_tls crate
    #[error("Native TLS error: {0}")]
    NativeTLSError(#[from] native_tls::Error),
    /// the server could not be reached or the connection broke down
    #[error("could not connect to {url}: {source}")]
    Unreachable {
        /// the LDAP URL we tried to connect to
        url: String,
        /// the error reported by ldap3
        source: ldap3::LdapError,
    },
}

/// none of the configured authentication mechanisms produced a bound connection
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// the server rejected the supplied credentials
    #[error("Unable to authenticate to server as {username}, please check credentials")]
    Rejected {
        /// the (domain prefixed) user name used for the bind
        username: String,
        /// the error reported by ldap3
        source: ldap3::LdapError,
    },
    /// username or password could not be read from the terminal
    #[error("could not read credentials: {0}")]
    Prompt(#[from] std::io::Error),
    /// a password bind was requested without a user name
    #[error("no username given, please enter a username")]
    EmptyUsername,
    /// every mechanism in the chain was unavailable
    #[error("no authentication mechanism available: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

/// errors which can happen while opening a [crate::session::DirectorySession]
#[derive(Debug, Error)]
pub enum SessionError {
    /// a transport level error
    #[error("{0}")]
    Connection(#[from] ConnectionError),
    /// an authentication error
    #[error("{0}")]
    Authentication(#[from] AuthenticationError),
}

/// a group member DN that does not resolve to exactly one user
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("member {dn} resolved to {matches} users instead of exactly one")]
pub struct DataIntegrityError {
    /// the member DN from the group
    pub dn: String,
    /// how many user entries the DN matched
    pub matches: usize,
}

/// errors from the query engine
#[derive(Debug, Error)]
pub enum QueryError {
    /// the search itself failed
    #[error("search for {filter} under {base} failed: {source}")]
    Search {
        /// search base
        base: String,
        /// the filter that was sent
        filter: String,
        /// the error reported by ldap3
        source: ldap3::LdapError,
    },
    /// an entry was missing an attribute every record needs
    #[error("entry {dn} has no {attribute} attribute")]
    MalformedEntry {
        /// DN of the offending entry
        dn: String,
        /// name of the missing attribute
        attribute: &'static str,
    },
    /// a directory inconsistency found while resolving group members
    #[error("{0}")]
    DataIntegrity(#[from] DataIntegrityError),
}

/// errors from group membership changes
#[derive(Debug, Error)]
pub enum MutationError {
    /// the bound identity may not change this group
    #[error("permission denied changing members of {group_dn} (member {member_dn}), check you have the correct permission")]
    Permission {
        /// DN of the group
        group_dn: String,
        /// DN of the member being added or removed
        member_dn: String,
        /// the error reported by ldap3
        source: ldap3::LdapError,
    },
    /// any other failure reported by the directory or the transport
    #[error("changing members of {group_dn} (member {member_dn}) failed: {source}")]
    Directory {
        /// DN of the group
        group_dn: String,
        /// DN of the member being added or removed
        member_dn: String,
        /// the error reported by ldap3
        source: ldap3::LdapError,
    },
}

impl MutationError {
    /// classify an ldap3 error from a `member` modification
    pub fn from_ldap(group_dn: &str, member_dn: &str, source: ldap3::LdapError) -> Self {
        if result_code(&source) == Some(RC_INSUFFICIENT_ACCESS_RIGHTS) {
            MutationError::Permission {
                group_dn: group_dn.to_string(),
                member_dn: member_dn.to_string(),
                source,
            }
        } else {
            MutationError::Directory {
                group_dn: group_dn.to_string(),
                member_dn: member_dn.to_string(),
                source,
            }
        }
    }

    /// true if this is a permission error
    pub fn is_permission(&self) -> bool {
        matches!(self, MutationError::Permission { .. })
    }
}

/// a purge that stopped part way through
///
/// members in `removed` stay removed, members after `failed_dn` were not touched
#[derive(Debug, Error)]
#[error("purge stopped at {failed_dn} after removing {} member(s): {source}", .removed.len())]
pub struct PurgeError {
    /// DNs removed before the failure, in order
    pub removed: Vec<String>,
    /// the DN whose removal failed
    pub failed_dn: String,
    /// the triggering error
    pub source: MutationError,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ldap_result_error(rc: u32) -> ldap3::LdapError {
        ldap3::LdapError::LdapResult {
            result: ldap3::LdapResult {
                rc,
                matched: String::new(),
                text: String::new(),
                refs: vec![],
                ctrls: vec![],
            },
        }
    }

    #[test]
    fn insufficient_access_is_permission() {
        let err = MutationError::from_ldap("cn=g", "cn=u", ldap_result_error(50));
        assert!(err.is_permission());
        let err = MutationError::from_ldap("cn=g", "cn=u", ldap_result_error(53));
        assert!(!err.is_permission());
    }

    #[test]
    fn transport_errors_have_no_result_code() {
        assert_eq!(result_code(&ldap3::LdapError::EndOfStream), None);
        assert_eq!(result_code(&ldap_result_error(49)), Some(49));
    }
}
