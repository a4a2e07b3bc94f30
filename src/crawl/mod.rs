//! Course crawling: link classification, embed resolution, concurrent
//! fan-out and result collection.
//!
//! A crawl runs in three stages:
//!
//! 1. [`CourseCrawler::crawl`] fetches a course page and spawns one resolver
//!    task per candidate link.
//! 2. Each task runs [`ResourceResolver::resolve`], following embed pages to
//!    the file behind them and handing it to a [`ResourceSink`].
//! 3. [`ResultAggregator::collect`] waits on the tasks and maps resource
//!    names to their final URLs.

mod aggregator;
mod classifier;
mod crawler;
mod filename;
mod resolver;
mod sink;

pub use aggregator::{CollectStats, DEFAULT_TASK_TIMEOUT, ResultAggregator};
pub use classifier::{
    course_links, find_embedded_target, find_embedded_target_in, has_logout_marker,
    hidden_fields, is_candidate_href, main_content_links,
};
pub use crawler::{
    CourseCrawler, CrawlBatch, CrawlError, DEFAULT_WORKERS, MIN_WORKERS, PendingTask,
};
pub use filename::{extension_of, resource_name, sanitize_file_name};
pub use resolver::{
    MAX_EMBED_DEPTH, ResolveError, ResolveOutcome, ResourceReference, ResourceResolver,
};
pub use sink::{
    ContentFilter, DirectorySink, DiscardSink, ErrorHandler, LoggingErrorHandler, ResourceSink,
    SinkError,
};
