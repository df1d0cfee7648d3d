use clap::{Parser, Subcommand};

/// Keep the user table at a fixed size by periodically deleting the
/// most recently registered accounts.
#[derive(Debug, Parser)]
#[command(name = "userlimit", version, about)]
pub struct Cli {
    /// Config file (default: $USERLIMIT_CONFIG or ~/.userlimit/userlimit.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler and eviction worker until interrupted.
    Serve,
    /// Write default settings (if absent) and schedule the eviction job.
    Activate,
    /// Cancel the eviction job and remove the settings.
    Deactivate,
    /// Print a setting (retention_count | schedule_interval).
    Get { key: String },
    /// Change a setting. Changing the interval reschedules the job.
    Set { key: String, value: String },
    /// Show the settings and the scheduled job.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the accepted schedule intervals.
    Intervals,
    /// Run one eviction pass now.
    RunOnce,
    /// Inspect or add user accounts.
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum UsersCommand {
    /// List users, oldest registration first.
    List,
    /// Create a user.
    Add {
        #[arg(long)]
        login: String,
        #[arg(long, default_value = "")]
        email: String,
        /// RFC 3339 timestamp; defaults to now.
        #[arg(long)]
        registered_at: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_set_with_global_config() {
        let cli = Cli::parse_from(["userlimit", "set", "schedule_interval", "daily", "--config", "/tmp/u.toml"]);
        assert_eq!(cli.config.as_deref(), Some("/tmp/u.toml"));
        match cli.command {
            Command::Set { key, value } => {
                assert_eq!(key, "schedule_interval");
                assert_eq!(value, "daily");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_users_add() {
        let cli = Cli::parse_from([
            "userlimit", "users", "add", "--login", "alice", "--registered-at", "2023-01-01T00:00:00Z",
        ]);
        match cli.command {
            Command::Users {
                command: UsersCommand::Add { login, registered_at, email },
            } => {
                assert_eq!(login, "alice");
                assert_eq!(email, "");
                assert_eq!(registered_at.as_deref(), Some("2023-01-01T00:00:00Z"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
