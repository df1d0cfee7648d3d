use clap::Parser;
use tracing::info;
use userlimit_core::time::parse_ts;
use userlimit_core::types::{OptionKey, ScheduleInterval};
use userlimit_core::UserLimitConfig;
use userlimit_users::NewUser;

mod app;
mod cli;
mod serve;

use cli::{Cli, Command, UsersCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "userlimit=info,userlimit_retention=info,userlimit_scheduler=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // load config: --config > USERLIMIT_CONFIG env > ~/.userlimit/userlimit.toml
    let config = UserLimitConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        UserLimitConfig::default()
    });

    let app = app::App::open(config)?;
    match cli.command {
        Command::Serve => serve::serve(app).await?,
        Command::Activate => {
            app.limiter.on_activate()?;
            print_status(&app, false)?;
        }
        Command::Deactivate => {
            app.limiter.on_deactivate()?;
            println!("deactivated: eviction job cancelled, settings removed");
        }
        Command::Get { key } => {
            let key: OptionKey = key.parse().map_err(anyhow::Error::msg)?;
            println!("{}", app.limiter.options().get(key));
        }
        Command::Set { key, value } => {
            let change = app.limiter.update_option(&key, &value)?;
            if change.changed {
                println!(
                    "{}: {} -> {}",
                    change.key,
                    change.old.as_deref().unwrap_or("(unset)"),
                    change.new
                );
            } else {
                println!("{}: unchanged ({})", change.key, change.new);
            }
        }
        Command::Status { json } => print_status(&app, json)?,
        Command::Intervals => print_intervals(),
        Command::RunOnce => {
            let result = app.limiter.run_now()?;
            if result.skipped {
                println!("skipped: no users to retain (keep count {})", result.keep_count);
            } else {
                println!(
                    "kept {} user(s), deleted {} (keep count {})",
                    result.retained_count, result.deleted_count, result.keep_count
                );
            }
        }
        Command::Users { command } => match command {
            UsersCommand::List => {
                for user in app.users.list_users()? {
                    println!(
                        "{:>6}  {:<24}  {:<32}  {}",
                        user.id,
                        user.login,
                        user.email,
                        userlimit_core::time::format_ts(user.registered_at)
                    );
                }
            }
            UsersCommand::Add {
                login,
                email,
                registered_at,
            } => {
                let mut new = NewUser::new(login).email(email);
                if let Some(at) = registered_at {
                    new = new.registered_at(parse_ts(&at)?);
                }
                let user = app.users.create_user(new)?;
                info!(id = user.id, login = %user.login, "user added");
                println!("{}", user.id);
            }
        },
    }
    Ok(())
}

fn print_status(app: &app::App, json: bool) -> anyhow::Result<()> {
    let status = app.limiter.status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    println!("active:            {}", status.active);
    println!("retention_count:   {}", status.settings.keep_count);
    println!("schedule_interval: {}", status.settings.schedule_interval);
    match status.job {
        Some(job) => {
            println!("job:               {} ({})", job.id, job.interval.display_name());
            println!("next_run:          {}", job.next_run);
            println!(
                "last_run:          {}",
                job.last_run.map(|t| t.to_string()).unwrap_or_else(|| "never".into())
            );
            println!("run_count:         {}", job.run_count);
        }
        None => println!("job:               not scheduled"),
    }
    Ok(())
}

fn print_intervals() {
    for interval in ScheduleInterval::ALL {
        println!(
            "{:<14} {:<22} {}s",
            interval.as_str(),
            interval.display_name(),
            interval.as_secs()
        );
    }
}
