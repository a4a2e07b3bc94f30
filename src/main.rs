//! CLI entry point for the coursefetch tool.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;

use cli::{Args, Command};
use commands::{CommandContext, PullRequest, SetupRequest};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Args carries the password; only the command is logged.
    debug!(command = ?args.command, "CLI arguments parsed");

    let context = CommandContext {
        config_path: args.config,
        cookie_dir: args.cookie_dir,
        password: args.password,
    };

    match args.command {
        Command::Setup {
            username,
            home_url,
            idp,
            organisation,
        } => commands::run_setup_command(
            &context,
            SetupRequest {
                username,
                home_url,
                idp,
                organisation,
            },
        ),
        Command::Login => commands::run_login_command(&context).await,
        Command::Logout => commands::run_logout_command(&context).await,
        Command::Courses => commands::run_courses_command(&context).await,
        Command::Init {
            course_url,
            name,
            dir,
        } => commands::run_init_command(&course_url, name, &dir),
        Command::Pull {
            dir,
            workers,
            timeout,
            all,
        } => {
            commands::run_pull_command(
                &context,
                PullRequest {
                    dir,
                    workers,
                    timeout: Duration::from_secs(timeout),
                    all,
                },
            )
            .await
        }
        Command::AddCtype { ctypes, dir } => commands::run_add_ctype_command(&dir, &ctypes),
        Command::RmCtype { ctypes, dir } => commands::run_rm_ctype_command(&dir, &ctypes),
        Command::Dump { dir } => commands::run_dump_command(&dir),
    }
}
