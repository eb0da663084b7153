//! command line interface for managing instrument access groups

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use n2sn_user_tools::account_status::AdQuery;
use n2sn_user_tools::config::{default_config_paths, load_config, ConfigError, ToolConfig};
use n2sn_user_tools::mutate::MembershipChange;
use n2sn_user_tools::session::default_session_parameters;
use n2sn_user_tools::table::{membership_table, user_table};
use n2sn_user_tools::tools::{self, ToolError, UserSelector};
use n2sn_user_tools::{AccountType, LdapConnector, SessionConfig, TerminalPrompt};

/// manage the user access lists of an instrument
#[derive(Debug, Parser)]
#[command(name = "n2sn-tools", version, about)]
struct Opt {
    /// additional configuration file, read after the default ones
    #[arg(short, long, global = true)]
    config: Vec<PathBuf>,
    /// more log output, repeat for even more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// the operation
    #[command(subcommand)]
    command: Command,
}

/// the operations
#[derive(Debug, Subcommand)]
enum Command {
    /// list current enabled users for an instrument
    ListUsers(InstrumentOpt),
    /// list current staff for an instrument
    ListStaff(InstrumentOpt),
    /// list users and staff of an instrument in one table
    ListAccess(InstrumentOpt),
    /// search users by name and account type
    SearchUser(SearchOpt),
    /// add a user to the instrument users list
    AddUser(ChangeOpt),
    /// remove a user from the instrument users list
    RemoveUser(RemoveOpt),
}

/// instrument selection
#[derive(Debug, Args)]
struct InstrumentOpt {
    /// name of the instrument, defaults to the configured one
    #[arg(short, long, visible_alias = "beamline")]
    instrument: Option<String>,
}

/// search restrictions
#[derive(Debug, Args)]
struct SearchOpt {
    /// surname of the user
    #[arg(long)]
    surname: Option<String>,
    /// given name (forename) of the user
    #[arg(long)]
    givenname: Option<String>,
    /// account type
    #[command(flatten)]
    account_type: AccountTypeOpt,
}

/// mutually exclusive account type flags
#[derive(Debug, Args)]
#[group(multiple = false)]
struct AccountTypeOpt {
    /// limit to accounts that are facility guests
    #[arg(long)]
    guest: bool,
    /// limit to accounts that are facility staff
    #[arg(long)]
    staff: bool,
    /// limit to accounts that are CFN staff
    #[arg(long)]
    cfn: bool,
    /// limit to accounts that are CFN users
    #[arg(long)]
    cfn_user: bool,
}

impl AccountTypeOpt {
    /// the selected account type
    fn account_type(&self) -> Option<AccountType> {
        if self.guest {
            Some(AccountType::Guest)
        } else if self.staff {
            Some(AccountType::Staff)
        } else if self.cfn {
            Some(AccountType::CfnStaff)
        } else if self.cfn_user {
            Some(AccountType::CfnUser)
        } else {
            None
        }
    }
}

/// the user to add
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct UserOpt {
    /// login (username) of the user
    #[arg(short, long)]
    login: Option<String>,
    /// life number or guest number of the user
    #[arg(short = 'n', long)]
    life_number: Option<String>,
}

/// options for adding a user
#[derive(Debug, Args)]
struct ChangeOpt {
    /// instrument
    #[command(flatten)]
    instrument: InstrumentOpt,
    /// username to use for authentication
    #[arg(short, long)]
    username: Option<String>,
    /// the user
    #[command(flatten)]
    user: UserOpt,
}

/// the user to remove, or all of them
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct RemoveTargetOpt {
    /// login (username) of the user
    #[arg(short, long)]
    login: Option<String>,
    /// life number or guest number of the user
    #[arg(short = 'n', long)]
    life_number: Option<String>,
    /// purge all users from the group
    #[arg(long)]
    purge: bool,
}

/// options for removing users
#[derive(Debug, Args)]
struct RemoveOpt {
    /// instrument
    #[command(flatten)]
    instrument: InstrumentOpt,
    /// username to use for authentication
    #[arg(short, long)]
    username: Option<String>,
    /// the user
    #[command(flatten)]
    target: RemoveTargetOpt,
}

/// set up logging to stderr
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// the session parameters from the configuration
fn session_config(
    config: &ToolConfig,
    username: Option<String>,
) -> Result<SessionConfig, ConfigError> {
    let mut builder = config.session_builder()?;
    builder.username(username);
    Ok(default_session_parameters(&mut builder).build()?)
}

/// print the users or the staff of an instrument
fn list_members(
    config: &ToolConfig,
    status: &AdQuery,
    prompt: &mut TerminalPrompt,
    opt: InstrumentOpt,
    staff: bool,
) -> Result<(), ToolError> {
    let instrument = config.instrument(opt.instrument.as_deref())?;
    let session = session_config(config, None)?;
    let connector = connector(&session);
    let (message, group) = if staff {
        ("Current instrument staff", &instrument.staff_group)
    } else {
        ("Current users enabled", &instrument.user_group)
    };
    let users = tools::list_group_members(&connector, &session, prompt, group)?;
    println!(
        "\n{} for instrument {}\n",
        message,
        instrument.name.to_uppercase()
    );
    println!("{}", user_table(&users, status));
    Ok(())
}

/// run the selected command
fn run(opt: Opt) -> Result<(), ToolError> {
    let mut paths = default_config_paths();
    paths.extend(opt.config);
    let config = load_config(&paths)?;
    let status = AdQuery::new(config.adquery_path());
    let mut prompt = TerminalPrompt;

    match opt.command {
        Command::ListUsers(i) => list_members(&config, &status, &mut prompt, i, false)?,
        Command::ListStaff(i) => list_members(&config, &status, &mut prompt, i, true)?,
        Command::ListAccess(i) => {
            let instrument = config.instrument(i.instrument.as_deref())?;
            let session = session_config(&config, None)?;
            let connector = connector(&session);
            let groups = [instrument.user_group.as_str(), instrument.staff_group.as_str()];
            let table = tools::list_access(&connector, &session, &mut prompt, &groups)?;
            println!(
                "\nAccess list for instrument {}\n",
                instrument.name.to_uppercase()
            );
            println!("{}", membership_table(&table, &["User", "Staff"], &status));
        }
        Command::SearchUser(s) => {
            let session = session_config(&config, None)?;
            let connector = connector(&session);
            let users = tools::search_users(
                &connector,
                &session,
                &mut prompt,
                s.surname.as_deref(),
                s.givenname.as_deref(),
                s.account_type.account_type(),
            )?;
            println!("{}", user_table(&users, &status));
        }
        Command::AddUser(c) => {
            let instrument = config.instrument(c.instrument.instrument.as_deref())?;
            let session = session_config(&config, c.username)?;
            let connector = connector(&session);
            let selector = UserSelector::from_options(c.user.login, c.user.life_number)?;
            let (user, change) = tools::add_user(
                &connector,
                &session,
                &mut prompt,
                &instrument.user_group,
                &selector,
            )?;
            match change {
                MembershipChange::Applied => println!(
                    "\nSuccessfully added user \"{}\" to list of users for instrument {}\n",
                    user.display_name,
                    instrument.name.to_uppercase()
                ),
                MembershipChange::Unchanged => println!(
                    "\nUser \"{}\" is already on the list of users for instrument {}\n",
                    user.display_name,
                    instrument.name.to_uppercase()
                ),
            }
        }
        Command::RemoveUser(r) => {
            let instrument = config.instrument(r.instrument.instrument.as_deref())?;
            let session = session_config(&config, r.username)?;
            let connector = connector(&session);
            if r.target.purge {
                println!();
                let removed = tools::purge_users(
                    &connector,
                    &session,
                    &mut prompt,
                    &instrument.user_group,
                    |name| println!("Removing user : {}", name),
                )?;
                println!(
                    "\nSuccessfully removed all {} users for instrument {}\n",
                    removed.len(),
                    instrument.name.to_uppercase()
                );
            } else {
                let selector =
                    UserSelector::from_options(r.target.login, r.target.life_number)?;
                let (user, change) = tools::remove_user(
                    &connector,
                    &session,
                    &mut prompt,
                    &instrument.user_group,
                    &selector,
                )?;
                match change {
                    MembershipChange::Applied => println!(
                        "\nSuccessfully removed user \"{}\" from list of users for instrument {}\n",
                        user.display_name,
                        instrument.name.to_uppercase()
                    ),
                    MembershipChange::Unchanged => println!(
                        "\nUser \"{}\" was not on the list of users for instrument {}\n",
                        user.display_name,
                        instrument.name.to_uppercase()
                    ),
                }
            }
        }
    }
    Ok(())
}

/// the ldap3 connector for the session parameters
fn connector(session: &SessionConfig) -> LdapConnector {
    LdapConnector::new(
        &session.server,
        session.ca_cert_path.clone(),
        session.connect_timeout,
    )
}

/// parse the command line and run, reporting errors on stderr
fn main() -> ExitCode {
    let opt = Opt::parse();
    init_logging(opt.verbose);
    match run(opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
