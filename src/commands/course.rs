//! Course command handlers: listing, binding a directory, pulling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use coursefetch_core::config::LocalConfig;
use coursefetch_core::crawl::{
    ContentFilter, CourseCrawler, DirectorySink, LoggingErrorHandler, ResultAggregator,
};
use tracing::{debug, info};

use super::ctype::{load_local, save_local};
use super::session::{CommandContext, PlatformSession};

/// Values for `coursefetch pull`.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub dir: PathBuf,
    pub workers: usize,
    pub timeout: Duration,
    pub all: bool,
}

pub async fn run_courses_command(context: &CommandContext) -> Result<()> {
    let platform = PlatformSession::connect(context).await?;
    let crawler = CourseCrawler::with_default_workers(Arc::clone(&platform.session))?;
    let courses = crawler
        .list_courses()
        .await
        .context("Failed to list courses")?;
    platform.close();

    if courses.is_empty() {
        info!("No enrolled courses found");
    }
    for (title, url) in &courses {
        println!("{title}\t{url}");
    }
    Ok(())
}

pub fn run_init_command(course_url: &str, name: Option<String>, dir: &Path) -> Result<()> {
    if LocalConfig::path_in(dir).exists() {
        bail!(
            "'{}' is already bound to a course; edit or remove {} first",
            dir.display(),
            LocalConfig::path_in(dir).display()
        );
    }
    let name = match name {
        Some(name) => name,
        None => default_course_name(dir)?,
    };
    let config = LocalConfig::new(name, course_url);
    config.validate().context("Invalid course URL")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create '{}'", dir.display()))?;
    save_local(&config, dir)?;
    info!(course = %config.course, dir = %dir.display(), "Course directory initialised");
    Ok(())
}

pub async fn run_pull_command(context: &CommandContext, request: PullRequest) -> Result<()> {
    let mut local = load_local(&request.dir)?;
    let filter = if request.all {
        ContentFilter::any()
    } else {
        ContentFilter::new(local.ctypes.iter().cloned())
    };

    let platform = PlatformSession::connect(context).await?;
    let crawler = CourseCrawler::new(Arc::clone(&platform.session), request.workers)?;
    let sink = Arc::new(
        DirectorySink::new(&request.dir, filter).with_known(local.downloaded.iter().cloned()),
    );

    info!(course = %local.course, url = %local.course_url, "Pulling course");
    let batch = crawler
        .crawl(&local.course_url, sink.clone(), Arc::new(LoggingErrorHandler))
        .await
        .with_context(|| format!("Failed to crawl '{}'", local.course_url))?;
    let (resources, stats) = ResultAggregator::new(request.timeout)
        .collect_with_stats(batch)
        .await;
    platform.close();

    for (name, url) in &resources {
        debug!(name, url, "resource resolved");
    }
    let written = sink.written();
    info!(
        found = resources.len(),
        written = written.len(),
        empty = stats.empty,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "Pull complete"
    );
    for name in &written {
        println!("{name}");
    }

    if !written.is_empty() {
        local.record_downloaded(written);
        save_local(&local, &request.dir)?;
    }
    Ok(())
}

fn default_course_name(dir: &Path) -> Result<String> {
    let absolute = std::path::absolute(dir)
        .with_context(|| format!("Failed to resolve '{}'", dir.display()))?;
    absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("Cannot derive a course name from the directory; pass --name")
}
