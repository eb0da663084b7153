#![deny(unknown_lints)]
#![deny(renamed_and_removed_lints)]
#![forbid(unsafe_code)]
#![deny(deprecated)]
#![forbid(non_fmt_panics)]
#![deny(unreachable_code)]
#![deny(unreachable_patterns)]
#![forbid(unused_doc_comments)]
#![forbid(unused_must_use)]
#![deny(while_true)]
#![deny(unused_parens)]
#![deny(redundant_semicolons)]
#![deny(non_ascii_idents)]
#![deny(confusable_idents)]
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(clippy::cargo_common_metadata)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_debug_implementations)]
#![deny(clippy::mod_module_files)]
#![doc = include_str!("../README.md")]

pub mod account_status;
pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod filter;
pub mod mutate;
pub mod query;
pub mod record;
pub mod session;
pub mod table;
pub mod tools;

pub use auth::{CredentialPrompt, Mechanism, TerminalPrompt};
pub use connection::{Connector, DirectoryConnection, LdapConnector, LdapDirectory};
pub use error::{
    AuthenticationError, ConnectionError, DataIntegrityError, MutationError, PurgeError,
    QueryError, SessionError,
};
pub use mutate::{GroupMembershipMutator, MembershipChange};
pub use query::{GroupMembers, MembershipTable, QueryEngine};
pub use record::{AccountType, DirectoryRecord, GroupRecord, UserRecord};
pub use session::{with_session, DirectorySession, SessionConfig, SessionConfigBuilder};
