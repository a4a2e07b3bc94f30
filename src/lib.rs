//! Coursefetch Core Library
//!
//! Signs in to a federated-login course platform and pulls the resources a
//! course page links to, including files hidden behind redirects and
//! embedded viewers.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`http`] - Shared HTTP session with connection caps and streaming bodies
//! - [`auth`] - Cookie jar, its persistence, and the three-step form login
//! - [`crawl`] - Course page crawling, embed resolution and result collection
//! - [`config`] - Platform descriptor, global and per-course configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod crawl;
pub mod http;

mod user_agent;

// Re-export commonly used types
pub use auth::{
    AuthCredential, AuthError, ConnectOutcome, CookieJarStore, FormAuthenticator,
    SessionCookieJar,
};
pub use config::{GlobalConfig, LocalConfig, PlatformLinks};
pub use crawl::{
    CollectStats, ContentFilter, CourseCrawler, CrawlBatch, CrawlError, DirectorySink,
    ErrorHandler, ResourceSink, ResultAggregator,
};
pub use http::{HttpSession, PoolLimits, SessionError};
