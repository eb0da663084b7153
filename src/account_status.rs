//! the UNIX side of an account, as reported by `adquery`

use std::path::PathBuf;
use std::process::Command;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::instrument;

/// default location of the adquery executable
pub const ADQUERY_PATH: &str = "/usr/bin/adquery";

/// the adquery options requesting the fields we parse
const ADQUERY_OPTIONS: &[&str] = &["enabled", "unixname", "samname", "uid", "locked", "disabled"];

lazy_static! {
    /// a `key:value` line with one of the keys we care about
    static ref STATUS_LINE: Regex = Regex::new(
        r"^(zoneEnabled|unixname|uid|samAccountName|accountLocked|accountDisabled):(.*)$"
    )
    .unwrap();
}

/// errors which can happen while querying the account status
#[derive(Debug, Error)]
pub enum AccountStatusError {
    /// the executable could not be started
    #[error("could not run {program}: {source}")]
    Spawn {
        /// the executable
        program: PathBuf,
        /// the underlying I/O error
        source: std::io::Error,
    },
    /// the query exited unsuccessfully
    #[error("adquery call for {login} failed with {status}")]
    Failed {
        /// the login queried
        login: String,
        /// exit status of the process
        status: std::process::ExitStatus,
    },
    /// the output was not UTF-8
    #[error("adquery output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// the recognized fields of the adquery output, all as reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountStatus {
    /// `zoneEnabled`, `true` if the account may log in here
    pub zone_enabled: Option<String>,
    /// `unixname`
    pub unix_name: Option<String>,
    /// `uid`
    pub uid: Option<String>,
    /// `samAccountName`
    pub sam_account_name: Option<String>,
    /// `accountLocked`
    pub locked: Option<String>,
    /// `accountDisabled`
    pub disabled: Option<String>,
}

impl AccountStatus {
    /// parse adquery output, ignoring lines with unknown keys
    pub fn parse(output: &str) -> Self {
        let mut status = AccountStatus::default();
        for line in output.lines() {
            if let Some(caps) = STATUS_LINE.captures(line) {
                let value = Some(caps[2].trim().to_string());
                match &caps[1] {
                    "zoneEnabled" => status.zone_enabled = value,
                    "unixname" => status.unix_name = value,
                    "uid" => status.uid = value,
                    "samAccountName" => status.sam_account_name = value,
                    "accountLocked" => status.locked = value,
                    "accountDisabled" => status.disabled = value,
                    _ => {}
                }
            }
        }
        status
    }

    /// true if the account is enabled for this zone
    pub fn can_login(&self) -> bool {
        self.zone_enabled.as_deref() == Some("true")
    }

    /// the numeric UID
    pub fn uid_number(&self) -> Option<u32> {
        self.uid.as_deref().and_then(|u| u.parse().ok())
    }
}

/// something that can tell the UNIX status of a login
pub trait AccountStatusSource {
    /// the status of `login`
    fn account_status(&self, login: &str) -> Result<AccountStatus, AccountStatusError>;
}

/// runs the adquery executable
#[derive(Debug, Clone)]
pub struct AdQuery {
    /// path of the executable
    program: PathBuf,
}

impl AdQuery {
    /// use the given executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        AdQuery {
            program: program.into(),
        }
    }
}

impl Default for AdQuery {
    fn default() -> Self {
        AdQuery::new(ADQUERY_PATH)
    }
}

impl AccountStatusSource for AdQuery {
    #[instrument(skip(self))]
    fn account_status(&self, login: &str) -> Result<AccountStatus, AccountStatusError> {
        let output = Command::new(&self.program)
            .arg("user")
            .args(ADQUERY_OPTIONS.iter().map(|o| format!("--{}", o)))
            .arg(login)
            .output()
            .map_err(|source| AccountStatusError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            tracing::debug!(
                "adquery stderr: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            return Err(AccountStatusError::Failed {
                login: login.to_string(),
                status: output.status,
            });
        }
        Ok(AccountStatus::parse(&String::from_utf8(output.stdout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys_only() {
        let status = AccountStatus::parse(
            "zoneEnabled:true\nunixname:alice\nuid:12345\nsamAccountName:alice\naccountLocked:false\naccountDisabled:false\nhomedir:/home/alice\n",
        );
        assert!(status.can_login());
        assert_eq!(status.unix_name.as_deref(), Some("alice"));
        assert_eq!(status.uid_number(), Some(12345));
        assert_eq!(status.locked.as_deref(), Some("false"));
    }

    #[test]
    fn missing_zone_flag_cannot_log_in() {
        let status = AccountStatus::parse("unixname:bob\n");
        assert!(!status.can_login());
        assert_eq!(status.zone_enabled, None);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_error() {
        let query = AdQuery::new("/bin/false");
        assert!(matches!(
            query.account_status("alice"),
            Err(AccountStatusError::Failed { .. })
        ));
    }

    #[test]
    fn missing_executable_is_an_error() {
        let query = AdQuery::new("/nonexistent/adquery");
        assert!(matches!(
            query.account_status("alice"),
            Err(AccountStatusError::Spawn { .. })
        ));
    }
}
