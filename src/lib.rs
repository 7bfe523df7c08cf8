#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod comments;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod model;
pub mod reaction;
pub mod report;
pub mod session;
pub mod timeline;
pub mod viewport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
pub use error::TimelineError;
pub use feed::FeedCursor;
pub use reaction::{ReactionToggler, RollbackPolicy};
pub use timeline::{Timeline, TimelineEvent};
