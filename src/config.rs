//! the layered TOML configuration of the command line tools

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::home_dir;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::session::{SessionConfigBuilder, SessionConfigBuilderError};

/// system wide configuration file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/n2sn_tools.toml";

/// per user configuration file, relative to the home directory
pub const USER_CONFIG_PATH: &str = ".config/n2sn_tools.toml";

/// error which can happen while reading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// an I/O error
    #[error("I/O error reading {path}: {source}")]
    IOError {
        /// the file being read
        path: PathBuf,
        /// the underlying error
        source: std::io::Error,
    },
    /// an error deserializing a TOML file
    #[error("Toml deserialization error in {path}: {source}")]
    TomlError {
        /// the file being read
        path: PathBuf,
        /// the underlying error
        source: toml::de::Error,
    },
    /// the merged configuration does not have the expected shape
    #[error("Invalid configuration: {0}")]
    Invalid(#[source] toml::de::Error),
    /// no `[common]` section in any file
    #[error("Section 'common' missing from config file.")]
    MissingCommon,
    /// a required key of the `[common]` section is missing
    #[error("'{0}' not defined in section 'common' of the config file.")]
    MissingKey(&'static str),
    /// no instrument given and none configured as default
    #[error("'default_instrument' not defined in config file. Please specify on command line")]
    NoDefaultInstrument,
    /// the requested instrument has no section
    #[error("instrument '{0}' is not defined in the config file.")]
    UnknownInstrument(String),
    /// the session parameters are incomplete
    #[error("Session parameters builder error: {0}")]
    SessionParameters(#[from] SessionConfigBuilderError),
}

/// the `[common]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonConfig {
    /// directory server host name or LDAP URL
    pub server: Option<String>,
    /// base DN for group searches
    pub group_search: Option<String>,
    /// base DN for user searches
    pub user_search: Option<String>,
    /// instrument used when none is given on the command line
    pub default_instrument: Option<String>,
    /// CA certificate for validating the server
    pub ca_cert: Option<PathBuf>,
    /// domain prefix for password binds
    pub domain_prefix: Option<String>,
    /// path of the adquery executable
    pub adquery: Option<PathBuf>,
    /// transport connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// one instrument section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstrumentConfig {
    /// display name of the instrument
    pub name: String,
    /// group listing the users allowed on the instrument
    pub user_group: String,
    /// group listing the instrument staff
    pub staff_group: String,
}

/// the complete configuration, every section other than `common` describing
/// an instrument
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolConfig {
    /// shared settings
    pub common: Option<CommonConfig>,
    /// instruments by section name
    #[serde(flatten)]
    pub instruments: BTreeMap<String, InstrumentConfig>,
}

/// the default configuration files, in the order they are applied
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
    if let Some(mut d) = home_dir() {
        d.push(USER_CONFIG_PATH);
        paths.push(d);
    }
    paths
}

/// merge `overlay` into `base`, section by section, later keys winning
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(section) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => existing.extend(section),
                _ => {
                    base.insert(key, toml::Value::Table(section));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// read and merge all existing files among `paths`
#[instrument]
pub fn load_config(paths: &[PathBuf]) -> Result<ToolConfig, ConfigError> {
    let mut merged = toml::Table::new();
    for path in paths {
        if !path.exists() {
            tracing::debug!("No config file at {:?}", path);
            continue;
        }
        tracing::debug!("Using config file at {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IOError {
            path: path.clone(),
            source,
        })?;
        let table: toml::Table = content.parse().map_err(|source| ConfigError::TomlError {
            path: path.clone(),
            source,
        })?;
        merge_tables(&mut merged, table);
    }
    toml::Value::Table(merged)
        .try_into::<ToolConfig>()
        .map_err(ConfigError::Invalid)
}

/// remove one pair of surrounding double quotes
pub fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// a required value from the common section
fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, ConfigError> {
    value.as_deref().ok_or(ConfigError::MissingKey(key))
}

impl ToolConfig {
    /// the `[common]` section
    pub fn common(&self) -> Result<&CommonConfig, ConfigError> {
        self.common.as_ref().ok_or(ConfigError::MissingCommon)
    }

    /// the named instrument, or the default one
    pub fn instrument(&self, name: Option<&str>) -> Result<&InstrumentConfig, ConfigError> {
        let name = match name {
            Some(n) => n,
            None => self
                .common()?
                .default_instrument
                .as_deref()
                .ok_or(ConfigError::NoDefaultInstrument)?,
        };
        self.instruments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInstrument(name.to_string()))
    }

    /// a session builder seeded from the common section
    pub fn session_builder(&self) -> Result<SessionConfigBuilder, ConfigError> {
        let common = self.common()?;
        let mut builder = SessionConfigBuilder::default();
        builder
            .server(required(&common.server, "server")?.to_string())
            .group_search_base(
                strip_quotes(required(&common.group_search, "group_search")?).to_string(),
            )
            .user_search_base(strip_quotes(required(&common.user_search, "user_search")?).to_string())
            .ca_cert_path(common.ca_cert.clone())
            .connect_timeout(common.connect_timeout_secs.map(Duration::from_secs));
        if let Some(prefix) = &common.domain_prefix {
            builder.domain_prefix(prefix.clone());
        }
        Ok(builder)
    }

    /// the adquery executable to use
    pub fn adquery_path(&self) -> &Path {
        self.common
            .as_ref()
            .and_then(|c| c.adquery.as_deref())
            .unwrap_or_else(|| Path::new(crate::account_status::ADQUERY_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::default_session_parameters;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const SYSTEM: &str = r#"
[common]
server = "dc1.example.org"
group_search = '"OU=Groups,DC=example,DC=org"'
user_search = "OU=Users,DC=example,DC=org"
default_instrument = "xpd"

[xpd]
name = "xpd"
user_group = "XPD-USERS"
staff_group = "XPD-STAFF"
"#;

    #[test]
    fn later_files_override_keys() {
        let dir = tempfile::tempdir().unwrap();
        let system = write_config(&dir, "system.toml", SYSTEM);
        let user = write_config(
            &dir,
            "user.toml",
            r#"
[common]
default_instrument = "chx"

[chx]
name = "chx"
user_group = "CHX-USERS"
staff_group = "CHX-STAFF"
"#,
        );
        let missing = dir.path().join("missing.toml");
        let config = load_config(&[system, missing, user]).unwrap();
        let common = config.common().unwrap();
        assert_eq!(common.server.as_deref(), Some("dc1.example.org"));
        assert_eq!(config.instrument(None).unwrap().user_group, "CHX-USERS");
        assert_eq!(config.instrument(Some("xpd")).unwrap().staff_group, "XPD-STAFF");
    }

    #[test]
    fn session_builder_strips_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let system = write_config(&dir, "system.toml", SYSTEM);
        let config = load_config(&[system]).unwrap();
        let mut builder = config.session_builder().unwrap();
        let session = default_session_parameters(&mut builder).build().unwrap();
        assert_eq!(session.group_search_base, "OU=Groups,DC=example,DC=org");
        assert_eq!(session.domain_prefix, "BNL");
        assert!(!session.authenticate);
    }

    #[test]
    fn missing_sections_are_reported() {
        let config = load_config(&[]).unwrap();
        assert!(matches!(config.common(), Err(ConfigError::MissingCommon)));

        let dir = tempfile::tempdir().unwrap();
        let system = write_config(&dir, "system.toml", SYSTEM);
        let config = load_config(&[system]).unwrap();
        assert!(matches!(
            config.instrument(Some("nope")),
            Err(ConfigError::UnknownInstrument(name)) if name == "nope"
        ));
    }

    #[test]
    fn broken_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write_config(&dir, "broken.toml", "[common\nserver = 1");
        match load_config(&[broken.clone()]) {
            Err(ConfigError::TomlError { path, .. }) => assert_eq!(path, broken),
            other => panic!("unexpected {:?}", other),
        }
    }
}
