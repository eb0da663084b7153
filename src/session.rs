//! one scoped, bound connection to the directory

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use tracing::instrument;

use crate::auth::{self, AuthContext, AuthStrategy, CredentialPrompt, Mechanism};
use crate::connection::{Connector, DirectoryConnection, LdapConnector, LdapDirectory};
use crate::error::SessionError;
use crate::mutate::GroupMembershipMutator;
use crate::query::QueryEngine;

/// the parameters needed to open a [DirectorySession]
#[derive(Debug, Clone, Builder)]
pub struct SessionConfig {
    /// server host name or LDAP URL, bare host names use `ldaps://`
    pub server: String,
    /// base DN for group searches
    pub group_search_base: String,
    /// base DN for user searches
    pub user_search_base: String,
    /// CA certificate path, certificates are not validated without one
    #[builder(default)]
    pub ca_cert_path: Option<PathBuf>,
    /// bind with credentials instead of anonymously
    pub authenticate: bool,
    /// user name for password binds, prompted for if needed and missing
    #[builder(default)]
    pub username: Option<String>,
    /// domain prepended to the user name for NTLM binds
    pub domain_prefix: String,
    /// transport connect timeout
    #[builder(default)]
    pub connect_timeout: Option<Duration>,
}

/// default domain prefix for password binds
pub const DEFAULT_DOMAIN_PREFIX: &str = "BNL";

/// fill the builder with hardcoded default parameters
///
/// there are no defaults for the server and the search bases
#[instrument(skip(builder))]
pub fn default_session_parameters(builder: &mut SessionConfigBuilder) -> &mut SessionConfigBuilder {
    if builder.domain_prefix.is_none() {
        builder.domain_prefix(DEFAULT_DOMAIN_PREFIX.to_string());
    }
    if builder.authenticate.is_none() {
        builder.authenticate(false);
    }
    builder
}

/// a bound connection plus the search bases it is used with
///
/// the connection is unbound exactly once, either by [DirectorySession::close]
/// or when the session is dropped
#[derive(Debug)]
pub struct DirectorySession<C: DirectoryConnection> {
    /// the underlying connection
    connection: C,
    /// set once unbind was attempted
    released: bool,
    /// base DN for group searches
    group_search_base: String,
    /// base DN for user searches
    user_search_base: String,
    /// how the connection was bound
    mechanism: Mechanism,
    /// result of the "who am I" query after an authenticated bind
    identity: Option<String>,
}

impl DirectorySession<LdapDirectory> {
    /// connect to the configured server with ldap3 and bind as configured
    pub fn open(
        config: &SessionConfig,
        prompt: &mut dyn CredentialPrompt,
    ) -> Result<Self, SessionError> {
        let connector = LdapConnector::new(
            &config.server,
            config.ca_cert_path.clone(),
            config.connect_timeout,
        );
        DirectorySession::establish(&connector, config, prompt)
    }
}

impl<C: DirectoryConnection> DirectorySession<C> {
    /// open a session through `connector` using the default mechanism chain
    pub fn establish<K>(
        connector: &K,
        config: &SessionConfig,
        prompt: &mut dyn CredentialPrompt,
    ) -> Result<Self, SessionError>
    where
        K: Connector<Connection = C>,
    {
        Self::establish_with(connector, config, prompt, &auth::default_chain())
    }

    /// open a session through `connector` trying the given mechanisms in order
    #[instrument(skip(connector, prompt, strategies), fields(server = %config.server, authenticate = config.authenticate))]
    pub fn establish_with<K>(
        connector: &K,
        config: &SessionConfig,
        prompt: &mut dyn CredentialPrompt,
        strategies: &[Box<dyn AuthStrategy<C>>],
    ) -> Result<Self, SessionError>
    where
        K: Connector<Connection = C>,
    {
        let (connection, mechanism, identity) = if config.authenticate {
            let mut ctx = AuthContext {
                username: config.username.clone(),
                server_fqdn: connector.server_fqdn().to_string(),
                domain_prefix: config.domain_prefix.clone(),
                prompt,
            };
            let (mut connection, mechanism) =
                auth::authenticate(|| connector.connect(), strategies, &mut ctx)?;
            let identity = match connection.who_am_i() {
                Ok(authzid) => {
                    tracing::info!("Authenticated as : {}", authzid);
                    Some(authzid)
                }
                Err(err) => {
                    tracing::warn!("Who am I query failed: {}", err);
                    None
                }
            };
            (connection, mechanism, identity)
        } else {
            let mut connection = connector.connect()?;
            if let Err(err) = connection.anonymous_bind() {
                tracing::warn!("Anonymous bind failed, continuing unbound: {}", err);
            }
            (connection, Mechanism::Anonymous, None)
        };
        Ok(DirectorySession {
            connection,
            released: false,
            group_search_base: config.group_search_base.clone(),
            user_search_base: config.user_search_base.clone(),
            mechanism,
            identity,
        })
    }

    /// base DN for group searches
    pub fn group_search_base(&self) -> &str {
        &self.group_search_base
    }

    /// base DN for user searches
    pub fn user_search_base(&self) -> &str {
        &self.user_search_base
    }

    /// the mechanism the connection was bound with
    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    /// the authorization identity reported by the server, if authenticated
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// raw access to the connection
    pub(crate) fn connection(&mut self) -> &mut C {
        &mut self.connection
    }

    /// searches over this session
    pub fn query(&mut self) -> QueryEngine<'_, C> {
        QueryEngine::new(self)
    }

    /// membership changes over this session
    pub fn mutator(&mut self) -> GroupMembershipMutator<'_, C> {
        GroupMembershipMutator::new(self)
    }

    /// unbind now, reporting the result
    pub fn close(mut self) -> ldap3::result::Result<()> {
        self.release()
    }

    /// unbind unless that already happened
    fn release(&mut self) -> ldap3::result::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        tracing::debug!("Unbinding");
        self.connection.unbind()
    }
}

impl<C: DirectoryConnection> Drop for DirectorySession<C> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!("Unbind failed: {}", err);
        }
    }
}

/// run `f` inside a session opened through `connector`, unbinding afterwards
/// no matter how `f` returned
pub fn with_session<C, K, F, T, E>(
    connector: &K,
    config: &SessionConfig,
    prompt: &mut dyn CredentialPrompt,
    f: F,
) -> Result<T, E>
where
    C: DirectoryConnection,
    K: Connector<Connection = C>,
    F: FnOnce(&mut DirectorySession<C>) -> Result<T, E>,
    E: From<SessionError>,
{
    let mut session = DirectorySession::establish(connector, config, prompt)?;
    let result = f(&mut session);
    if let Err(err) = session.close() {
        tracing::warn!("Unbind failed: {}", err);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_only_missing_values() {
        let mut builder = SessionConfigBuilder::default();
        builder
            .server("dc1.example.org".to_string())
            .group_search_base("OU=Groups,DC=example".to_string())
            .user_search_base("OU=Users,DC=example".to_string())
            .authenticate(true);
        let config = default_session_parameters(&mut builder).build().unwrap();
        assert!(config.authenticate);
        assert_eq!(config.domain_prefix, "BNL");
        assert_eq!(config.username, None);
        assert_eq!(config.ca_cert_path, None);
    }

    #[test]
    fn missing_server_fails_to_build() {
        let mut builder = SessionConfigBuilder::default();
        builder
            .group_search_base("OU=Groups".to_string())
            .user_search_base("OU=Users".to_string());
        assert!(default_session_parameters(&mut builder).build().is_err());
    }
}
