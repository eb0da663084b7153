//! the raw directory primitives a session is built on, and their ldap3
//! implementation

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use ldap3::exop::{WhoAmI, WhoAmIResp};
use ldap3::{LdapConn, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use thiserror::Error;
use tracing::instrument;

use crate::error::ConnectionError;

/// why a SASL bind did not produce a bound connection
#[derive(Debug, Error)]
pub enum BindError {
    /// the mechanism is not available in this build or environment
    #[error("mechanism unsupported: {0}")]
    Unsupported(String),
    /// the bind was attempted and failed
    #[error("ldap3 Ldap error: {0}")]
    LdapError(#[from] ldap3::LdapError),
}

/// one connection to a directory server
///
/// all operations block until the server answered
pub trait DirectoryConnection {
    /// bind without credentials
    fn anonymous_bind(&mut self) -> ldap3::result::Result<()>;

    /// bind with the ambient Kerberos credentials of the caller
    fn gssapi_bind(&mut self, server_fqdn: &str) -> Result<(), BindError>;

    /// bind with NTLM, `username` already carrying the domain prefix
    fn ntlm_bind(&mut self, username: &str, password: &str) -> Result<(), BindError>;

    /// the authorization identity of the bound connection
    fn who_am_i(&mut self) -> ldap3::result::Result<String>;

    /// subtree search returning all matching entries
    fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> ldap3::result::Result<Vec<SearchEntry>>;

    /// apply modifications to one entry
    fn modify(&mut self, dn: &str, mods: Vec<Mod<String>>) -> ldap3::result::Result<()>;

    /// unbind and close the connection
    fn unbind(&mut self) -> ldap3::result::Result<()>;
}

/// something which can open fresh connections to one server
pub trait Connector {
    /// the connection type produced
    type Connection: DirectoryConnection;

    /// open a new, unbound connection
    fn connect(&self) -> Result<Self::Connection, ConnectionError>;

    /// host name of the server, used as the Kerberos service principal host
    fn server_fqdn(&self) -> &str;
}

/// turn a configured server into an LDAP URL, defaulting to implicit TLS
pub fn server_url(server: &str) -> String {
    if server.contains("://") {
        server.to_string()
    } else {
        format!("ldaps://{}", server)
    }
}

/// the host part of a server address or LDAP URL
pub fn server_host(server: &str) -> &str {
    let rest = server.split_once("://").map(|(_, r)| r).unwrap_or(server);
    let rest = rest.split('/').next().unwrap_or(rest);
    match rest.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => rest,
    }
}

/// opens [LdapDirectory] connections using ldap3 with native TLS
#[derive(Debug, Clone)]
pub struct LdapConnector {
    /// the LDAP URL to connect to
    url: String,
    /// host name derived from the URL
    host: String,
    /// CA certificate to trust, certificate validation is disabled without one
    ca_cert_path: Option<PathBuf>,
    /// transport connect timeout
    connect_timeout: Option<Duration>,
}

impl LdapConnector {
    /// create a connector for the given server name or URL
    pub fn new(
        server: &str,
        ca_cert_path: Option<PathBuf>,
        connect_timeout: Option<Duration>,
    ) -> Self {
        LdapConnector {
            url: server_url(server),
            host: server_host(server).to_string(),
            ca_cert_path,
            connect_timeout,
        }
    }

    /// the ldap3 settings for this connector
    fn settings(&self) -> Result<LdapConnSettings, ConnectionError> {
        let mut settings = LdapConnSettings::new();
        if let Some(timeout) = self.connect_timeout {
            settings = settings.set_conn_timeout(timeout);
        }
        match &self.ca_cert_path {
            Some(path) => {
                let ca_cert_contents =
                    std::fs::read(path).map_err(|source| ConnectionError::CaCertificate {
                        path: path.clone(),
                        source,
                    })?;
                let ca_certificate = Certificate::from_pem(&ca_cert_contents)?;
                let connector = TlsConnector::builder()
                    .add_root_certificate(ca_certificate)
                    .build()?;
                Ok(settings.set_connector(connector))
            }
            None => {
                tracing::debug!("No CA certificate configured, not validating the server certificate");
                Ok(settings.set_no_tls_verify(true))
            }
        }
    }
}

impl Connector for LdapConnector {
    type Connection = LdapDirectory;

    #[instrument(skip(self), fields(url = %self.url))]
    fn connect(&self) -> Result<LdapDirectory, ConnectionError> {
        let settings = self.settings()?;
        let ldap = LdapConn::with_settings(settings, &self.url).map_err(|source| {
            ConnectionError::Unreachable {
                url: self.url.clone(),
                source,
            }
        })?;
        tracing::debug!("Connected to {}", self.url);
        Ok(LdapDirectory { ldap })
    }

    fn server_fqdn(&self) -> &str {
        &self.host
    }
}

/// a live ldap3 connection
pub struct LdapDirectory {
    /// the synchronous ldap3 handle
    ldap: LdapConn,
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory").finish_non_exhaustive()
    }
}

impl DirectoryConnection for LdapDirectory {
    fn anonymous_bind(&mut self) -> ldap3::result::Result<()> {
        self.ldap.simple_bind("", "")?.success()?;
        Ok(())
    }

    #[cfg(feature = "gssapi")]
    fn gssapi_bind(&mut self, server_fqdn: &str) -> Result<(), BindError> {
        self.ldap.sasl_gssapi_bind(server_fqdn)?.success()?;
        Ok(())
    }

    #[cfg(not(feature = "gssapi"))]
    fn gssapi_bind(&mut self, _server_fqdn: &str) -> Result<(), BindError> {
        Err(BindError::Unsupported(
            "built without the gssapi feature".to_string(),
        ))
    }

    fn ntlm_bind(&mut self, username: &str, password: &str) -> Result<(), BindError> {
        self.ldap.sasl_ntlm_bind(username, password)?.success()?;
        Ok(())
    }

    fn who_am_i(&mut self) -> ldap3::result::Result<String> {
        let (exop, _res) = self.ldap.extended(WhoAmI)?.success()?;
        let who_am_i: WhoAmIResp = exop.parse();
        Ok(who_am_i.authzid)
    }

    fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> ldap3::result::Result<Vec<SearchEntry>> {
        match self
            .ldap
            .search(base, Scope::Subtree, filter, attrs.to_vec())
            .and_then(|r| r.success())
        {
            Ok((rs, _res)) => Ok(rs.into_iter().map(SearchEntry::construct).collect()),
            Err(err) => {
                tracing::debug!(
                    "Error {} in LDAP query\n  base: {}\n  filter: {}\n  attrs: {:#?}",
                    err,
                    base,
                    filter,
                    attrs
                );
                tracing::debug!(
                    "ldapsearch -LLL -o ldif-wrap=no -b '{}' -s sub '{}' {}",
                    base,
                    filter,
                    itertools::join(attrs.iter(), " ")
                );
                Err(err)
            }
        }
    }

    fn modify(&mut self, dn: &str, mods: Vec<Mod<String>>) -> ldap3::result::Result<()> {
        self.ldap.modify(dn, mods)?.success()?;
        Ok(())
    }

    fn unbind(&mut self) -> ldap3::result::Result<()> {
        self.ldap.unbind()
    }
}

/// a single-valued `member` modification
pub fn member_mod(add: bool, member_dn: &str) -> Mod<String> {
    let values = HashSet::from([member_dn.to_string()]);
    if add {
        Mod::Add("member".to_string(), values)
    } else {
        Mod::Delete("member".to_string(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_ldaps_scheme() {
        assert_eq!(server_url("dc1.example.org"), "ldaps://dc1.example.org");
        assert_eq!(server_url("ldap://dc1:389"), "ldap://dc1:389");
    }

    #[test]
    fn host_is_extracted_from_urls() {
        assert_eq!(server_host("dc1.example.org"), "dc1.example.org");
        assert_eq!(server_host("ldaps://dc1.example.org:636"), "dc1.example.org");
        assert_eq!(server_host("ldaps://dc1.example.org/"), "dc1.example.org");
    }

    #[test]
    fn member_mods() {
        match member_mod(true, "CN=a") {
            Mod::Add(attr, values) => {
                assert_eq!(attr, "member");
                assert!(values.contains("CN=a"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(member_mod(false, "CN=a"), Mod::Delete(_, _)));
    }

    #[test]
    fn missing_ca_certificate_is_a_connection_error() {
        let connector = LdapConnector::new(
            "dc1.example.org",
            Some(PathBuf::from("/nonexistent/ca.crt")),
            None,
        );
        assert!(matches!(
            connector.connect(),
            Err(ConnectionError::CaCertificate { .. })
        ));
    }
}
