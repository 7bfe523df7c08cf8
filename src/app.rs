use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

use crate::api;
use crate::comments::{PostThread, ThreadEvent, ThreadOptions};
use crate::config::{self, Config};
use crate::data::{self, CommentService, FeedService, PostService, ReactionService};
use crate::model::{Comment, Post, ReactionKind};
use crate::reaction::ToggleOutcome;
use crate::report::{ErrorReporter, LogReporter};
use crate::session::Actor;
use crate::timeline::{self, Timeline, TimelineEvent};

const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Feed { pages: usize },
    Post { texts: String },
    Like { post_id: String },
    Comments { post_id: String },
    SignIn { uuid: String, name: String },
}

impl Default for Command {
    fn default() -> Self {
        Command::Feed { pages: 1 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub command: Command,
    pub offline: bool,
    pub config_file: Option<PathBuf>,
}

struct Services {
    feed: Arc<dyn FeedService>,
    reaction: Arc<dyn ReactionService>,
    post: Arc<dyn PostService>,
    comment: Arc<dyn CommentService>,
}

impl Services {
    fn build(cfg: &Config, offline: bool) -> Result<Self> {
        if offline {
            log::info!("using built-in sample timeline");
            let backend = Arc::new(data::MockBackend::default());
            return Ok(Self {
                feed: backend.clone(),
                reaction: backend.clone(),
                post: backend.clone(),
                comment: backend,
            });
        }

        let client = api::Client::new(api::ClientConfig {
            user_agent: cfg.api.user_agent.clone(),
            base_url: Some(cfg.api.base_url.clone()),
            timeout: Some(cfg.api.timeout),
            http_client: None,
        })
        .context("build api client")?;
        let client = Arc::new(client);
        log::info!("using timeline api at {}", client.base_url());

        Ok(Self {
            feed: Arc::new(data::ApiFeedService::new(client.clone())),
            reaction: Arc::new(data::ApiReactionService::new(client.clone())),
            post: Arc::new(data::ApiPostService::new(client.clone())),
            comment: Arc::new(data::ApiCommentService::new(client)),
        })
    }
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let services = || Services::build(&cfg, options.offline);
    let reporter: Arc<dyn ErrorReporter> = Arc::new(LogReporter);
    let deadline = cfg.api.timeout + Duration::from_secs(5);

    match options.command {
        Command::Feed { pages } => {
            let mut timeline = open_timeline(&cfg, &services()?, reporter);
            let shown = load_pages(&mut timeline, pages.max(1), deadline)?;
            print_posts(shown);
            if timeline.is_exhausted() {
                println!("-- end of timeline --");
            }
        }
        Command::Post { texts } => {
            let mut timeline = open_timeline(&cfg, &services()?, reporter);
            timeline.submit_post(&texts)?;
            let events = drive(&mut timeline, deadline, |event| {
                matches!(
                    event,
                    TimelineEvent::PostSubmitted | TimelineEvent::PostFailed { .. }
                )
            })?;
            if let Some(TimelineEvent::PostFailed { message }) = events.last() {
                bail!("post rejected: {message}");
            }
            println!("Posted.");
            if timeline.items().is_empty() {
                drive(&mut timeline, deadline, is_page_result)?;
            }
            print_posts(timeline.items());
        }
        Command::Like { post_id } => {
            let mut timeline = open_timeline(&cfg, &services()?, reporter);
            while timeline.items().iter().all(|post| post.post_id != post_id) {
                if timeline.is_exhausted() {
                    bail!("post {post_id} is not on the timeline");
                }
                load_pages(&mut timeline, 1, deadline)?;
            }
            let ToggleOutcome::Pending { reacted } =
                timeline.toggle_reaction(&post_id, ReactionKind::Like)?
            else {
                bail!("post {post_id} is not on the timeline");
            };
            let events = drive(&mut timeline, deadline, |event| {
                matches!(
                    event,
                    TimelineEvent::ReactionConfirmed { .. } | TimelineEvent::ReactionFailed { .. }
                )
            })?;
            if let Some(TimelineEvent::ReactionFailed { .. }) = events.last() {
                bail!("reaction was not saved");
            }
            println!("{} {post_id}.", if reacted { "Liked" } else { "Removed like from" });
        }
        Command::Comments { post_id } => {
            let services = services()?;
            let mut thread = PostThread::open(ThreadOptions {
                post_id,
                post_service: services.post.clone(),
                comment_service: services.comment.clone(),
                reporter,
                actor: cfg.session.actor(),
                scroll_threshold: cfg.feed.scroll_threshold,
            });
            settle_thread(&mut thread, deadline)?;
            let post = thread
                .post()
                .ok_or_else(|| anyhow!("post {} could not be loaded", thread.post_id()))?;
            print_posts(std::slice::from_ref(post));
            print_comments(thread.comments());
        }
        Command::SignIn { uuid, name } => {
            let saved = config::save_session(options.config_file, &Actor::new(uuid, name.clone()))?;
            println!("Signed in as {name}; saved to {}", saved.display());
        }
    }
    Ok(())
}

fn open_timeline(cfg: &Config, services: &Services, reporter: Arc<dyn ErrorReporter>) -> Timeline {
    Timeline::new(timeline::Options {
        feed_service: services.feed.clone(),
        reaction_service: services.reaction.clone(),
        post_service: services.post.clone(),
        reporter,
        actor: cfg.session.actor(),
        rollback: cfg.feed.rollback,
        scroll_threshold: cfg.feed.scroll_threshold,
    })
}

fn is_page_result(event: &TimelineEvent) -> bool {
    matches!(
        event,
        TimelineEvent::PageLoaded { .. } | TimelineEvent::PageFailed { .. }
    )
}

/// Loads up to `pages` more pages and returns the posts they added.
fn load_pages(timeline: &mut Timeline, pages: usize, deadline: Duration) -> Result<&[Post]> {
    let start = timeline.items().len();
    for _ in 0..pages {
        if !timeline.request_next_page() {
            break;
        }
        let events = drive(timeline, deadline, is_page_result)?;
        if let Some(TimelineEvent::PageFailed { message }) = events.last() {
            bail!("timeline unavailable: {message}");
        }
    }
    Ok(&timeline.items()[start..])
}

fn drive(
    timeline: &mut Timeline,
    deadline: Duration,
    mut done: impl FnMut(&TimelineEvent) -> bool,
) -> Result<Vec<TimelineEvent>> {
    let started = Instant::now();
    let mut seen = Vec::new();
    while started.elapsed() < deadline {
        for event in timeline.wait(WAIT_SLICE) {
            let stop = done(&event);
            seen.push(event);
            if stop {
                return Ok(seen);
            }
        }
    }
    bail!("timed out after {}", humantime::format_duration(deadline))
}

fn settle_thread(thread: &mut PostThread, deadline: Duration) -> Result<()> {
    let started = Instant::now();
    while started.elapsed() < deadline {
        for event in thread.wait(WAIT_SLICE) {
            if let ThreadEvent::CommentsFailed { message } = event {
                bail!("comments unavailable: {message}");
            }
        }
        if !thread.is_loading_post() && !thread.is_fetching_comments() {
            return Ok(());
        }
    }
    bail!("timed out after {}", humantime::format_duration(deadline))
}

fn print_posts(posts: &[Post]) {
    for post in posts {
        let when = post
            .created_at()
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "[{}] {} at {} | likes {} | comments {}",
            post.post_id,
            post.user_name,
            when,
            post.reaction_count(ReactionKind::Like),
            post.comment_count
        );
        for line in post.texts.lines() {
            println!("    {line}");
        }
    }
}

fn print_comments(comments: &[Comment]) {
    if comments.is_empty() {
        println!("  (no comments yet)");
    }
    for comment in comments {
        println!("  - {}: {}", comment.user_name, comment.texts);
    }
}
