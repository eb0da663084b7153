//! the ordered chain of bind mechanisms tried when opening an authenticated
//! session

use std::io::Write;

use crate::connection::{BindError, DirectoryConnection};
use crate::error::{result_code, AuthenticationError, ConnectionError, SessionError};

/// the mechanism a session ended up bound with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    /// no credentials
    Anonymous,
    /// Kerberos with ambient credentials
    Gssapi,
    /// NTLM with a prompted password
    Ntlm,
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mechanism::Anonymous => write!(f, "anonymous"),
            Mechanism::Gssapi => write!(f, "GSSAPI"),
            Mechanism::Ntlm => write!(f, "NTLM"),
        }
    }
}

/// interactive source of credentials
pub trait CredentialPrompt {
    /// ask for a user name
    fn username(&mut self) -> std::io::Result<String>;

    /// ask for a password without echoing it
    fn password(&mut self, username: &str) -> std::io::Result<String>;
}

/// prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn username(&mut self) -> std::io::Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "\nUsername : ")?;
        stderr.flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn password(&mut self, _username: &str) -> std::io::Result<String> {
        rpassword::prompt_password("Password : ")
    }
}

/// what a single strategy did with the connection it was given
#[derive(Debug)]
pub enum AuthStep {
    /// the connection is bound
    Bound(Mechanism),
    /// the strategy does not apply, the connection was not touched
    NotApplicable,
    /// the mechanism failed softly, the connection must not be reused
    Unavailable(String),
}

/// mutable state shared by the strategies of one chain
pub struct AuthContext<'a> {
    /// user name supplied by the caller or collected by an earlier prompt
    pub username: Option<String>,
    /// host name of the server
    pub server_fqdn: String,
    /// prefix prepended as `PREFIX\user` for password binds
    pub domain_prefix: String,
    /// where to ask for missing credentials
    pub prompt: &'a mut dyn CredentialPrompt,
}

impl std::fmt::Debug for AuthContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("username", &self.username)
            .field("server_fqdn", &self.server_fqdn)
            .field("domain_prefix", &self.domain_prefix)
            .finish_non_exhaustive()
    }
}

/// one way of binding a connection
pub trait AuthStrategy<C: DirectoryConnection> {
    /// name for log messages
    fn name(&self) -> &'static str;

    /// try to bind `conn`; `Err` aborts the whole chain
    fn attempt(&self, conn: &mut C, ctx: &mut AuthContext<'_>) -> Result<AuthStep, SessionError>;
}

/// map an error that is not an LDAP result to a connection error
fn transport_error(server: &str, source: ldap3::LdapError) -> SessionError {
    SessionError::Connection(ConnectionError::Unreachable {
        url: server.to_string(),
        source,
    })
}

/// Kerberos bind, only tried when no user name was given
#[derive(Debug, Default)]
pub struct GssapiStrategy;

impl<C: DirectoryConnection> AuthStrategy<C> for GssapiStrategy {
    fn name(&self) -> &'static str {
        "GSSAPI"
    }

    fn attempt(&self, conn: &mut C, ctx: &mut AuthContext<'_>) -> Result<AuthStep, SessionError> {
        if ctx.username.is_some() {
            return Ok(AuthStep::NotApplicable);
        }
        match conn.gssapi_bind(&ctx.server_fqdn) {
            Ok(()) => Ok(AuthStep::Bound(Mechanism::Gssapi)),
            Err(BindError::Unsupported(reason)) => Ok(AuthStep::Unavailable(reason)),
            Err(BindError::LdapError(err)) => match err {
                ldap3::LdapError::Io { .. } | ldap3::LdapError::EndOfStream => {
                    Err(transport_error(&ctx.server_fqdn, err))
                }
                err => Ok(AuthStep::Unavailable(err.to_string())),
            },
        }
    }
}

/// NTLM bind with a prompted password, the last resort
#[derive(Debug, Default)]
pub struct NtlmStrategy;

impl<C: DirectoryConnection> AuthStrategy<C> for NtlmStrategy {
    fn name(&self) -> &'static str {
        "NTLM"
    }

    fn attempt(&self, conn: &mut C, ctx: &mut AuthContext<'_>) -> Result<AuthStep, SessionError> {
        let username = match &ctx.username {
            Some(u) => u.clone(),
            None => {
                let u = ctx.prompt.username().map_err(AuthenticationError::from)?;
                ctx.username = Some(u.clone());
                u
            }
        };
        if username.trim().is_empty() {
            return Err(AuthenticationError::EmptyUsername.into());
        }
        let password = ctx
            .prompt
            .password(&username)
            .map_err(AuthenticationError::from)?;
        let qualified = format!("{}\\{}", ctx.domain_prefix, username);
        match conn.ntlm_bind(&qualified, &password) {
            Ok(()) => Ok(AuthStep::Bound(Mechanism::Ntlm)),
            Err(BindError::Unsupported(reason)) => Ok(AuthStep::Unavailable(reason)),
            Err(BindError::LdapError(err)) if result_code(&err).is_some() => {
                Err(AuthenticationError::Rejected {
                    username: qualified,
                    source: err,
                }
                .into())
            }
            Err(BindError::LdapError(err)) => Err(transport_error(&ctx.server_fqdn, err)),
        }
    }
}

/// the default chain: Kerberos first, then NTLM
pub fn default_chain<C: DirectoryConnection>() -> Vec<Box<dyn AuthStrategy<C>>> {
    vec![Box::new(GssapiStrategy), Box::new(NtlmStrategy)]
}

/// unbind a connection no strategy bound
fn release<C: DirectoryConnection>(conn: &mut C) {
    if let Err(err) = conn.unbind() {
        tracing::debug!("Unbind of unused connection failed: {}", err);
    }
}

/// run the strategies in order, opening a fresh connection whenever a failed
/// attempt left the previous one in an unknown state
pub fn authenticate<C, F>(
    mut connect: F,
    strategies: &[Box<dyn AuthStrategy<C>>],
    ctx: &mut AuthContext<'_>,
) -> Result<(C, Mechanism), SessionError>
where
    C: DirectoryConnection,
    F: FnMut() -> Result<C, ConnectionError>,
{
    let mut conn: Option<C> = None;
    let mut failures = Vec::new();
    for strategy in strategies {
        let mut current = match conn.take() {
            Some(c) => c,
            None => connect()?,
        };
        let step = match strategy.attempt(&mut current, ctx) {
            Ok(step) => step,
            Err(err) => {
                release(&mut current);
                return Err(err);
            }
        };
        match step {
            AuthStep::Bound(mechanism) => {
                tracing::info!("Bound to {} using {}", ctx.server_fqdn, mechanism);
                return Ok((current, mechanism));
            }
            AuthStep::NotApplicable => {
                tracing::debug!("Skipping {} authentication", strategy.name());
                conn = Some(current);
            }
            AuthStep::Unavailable(reason) => {
                tracing::info!(
                    "{} authentication unavailable, falling back: {}",
                    strategy.name(),
                    reason
                );
                release(&mut current);
                failures.push(format!("{}: {}", strategy.name(), reason));
            }
        }
    }
    if let Some(mut current) = conn {
        release(&mut current);
    }
    Err(AuthenticationError::Exhausted(failures).into())
}
