//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use coursefetch_core::crawl::DEFAULT_WORKERS;

/// Pull course resources from a federated-login learning platform.
///
/// Credentials and the platform descriptor live in the global config; each
/// course directory holds a `.coursefetch` file naming its course page.
#[derive(Parser, Debug)]
#[command(name = "coursefetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Global config file (defaults to $XDG_CONFIG_HOME/coursefetch/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the session cookie file (defaults to the system temp dir)
    #[arg(long, global = true)]
    pub cookie_dir: Option<PathBuf>,

    /// Password, overriding the stored one
    #[arg(long, env = "COURSEFETCH_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write the global config: credentials and platform
    Setup {
        /// Platform login name
        #[arg(long)]
        username: String,
        /// Platform root URL
        #[arg(long)]
        home_url: String,
        /// Identity-provider root URL
        #[arg(long)]
        idp: String,
        /// Organisation name (also names the cookie file)
        #[arg(long)]
        organisation: String,
    },

    /// Sign in and store the session cookies
    Login,

    /// Sign out and forget the stored session
    Logout,

    /// List enrolled courses
    Courses,

    /// Bind a directory to a course page
    Init {
        /// Course page URL
        course_url: String,
        /// Course display name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
        /// Course directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Download new resources of the course bound to a directory
    Pull {
        /// Course directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
        /// Concurrent resolver tasks
        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        /// Seconds each resource may take once collection starts
        #[arg(short, long, default_value_t = 15)]
        timeout: u64,
        /// Accept every content type, ignoring the configured ones
        #[arg(long)]
        all: bool,
    },

    /// Accept more content types or extensions
    AddCtype {
        /// Content types or extensions, e.g. `pdf` or `text/plain`
        #[arg(required = true)]
        ctypes: Vec<String>,
        /// Course directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Stop accepting content types or extensions
    RmCtype {
        /// Content types or extensions to drop
        #[arg(required = true)]
        ctypes: Vec<String>,
        /// Course directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Print the course config of a directory
    Dump {
        /// Course directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}
