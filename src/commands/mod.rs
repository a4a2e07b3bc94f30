//! CLI command handlers.

mod account;
mod course;
mod ctype;
mod session;

pub use account::{run_login_command, run_logout_command, run_setup_command, SetupRequest};
pub use course::{run_courses_command, run_init_command, run_pull_command, PullRequest};
pub use ctype::{run_add_ctype_command, run_dump_command, run_rm_ctype_command};
pub use session::CommandContext;
