//! The timeline view's state and the only way to change it.
//!
//! Remote calls run on worker threads and report back over a channel; the
//! owner applies them in [`Timeline::poll`] or [`Timeline::wait`], so every
//! mutation happens on the thread that owns the view. After [`Timeline::close`]
//! late answers are dropped on the floor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::data::{FeedService, PostService, ReactionService};
use crate::error::{self, TimelineError};
use crate::feed::{Completion, FeedCursor};
use crate::model::{Cursor, Page, Post, ReactionKind};
use crate::reaction::{ReactionToggler, RollbackPolicy, ToggleOutcome, ToggleTicket};
use crate::report::{self, ErrorReporter};
use crate::session::{self, Actor, SessionError};
use crate::viewport::{ScrollMetrics, ScrollSubscription, DEFAULT_SCROLL_THRESHOLD};

pub struct Options {
    pub feed_service: Arc<dyn FeedService>,
    pub reaction_service: Arc<dyn ReactionService>,
    pub post_service: Arc<dyn PostService>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub actor: Option<Actor>,
    pub rollback: RollbackPolicy,
    pub scroll_threshold: f64,
}

impl Options {
    pub fn new<S>(service: Arc<S>, reporter: Arc<dyn ErrorReporter>) -> Self
    where
        S: FeedService + ReactionService + PostService + 'static,
    {
        Self {
            feed_service: service.clone(),
            reaction_service: service.clone(),
            post_service: service,
            reporter,
            actor: None,
            rollback: RollbackPolicy::default(),
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    PageLoaded { appended: usize, exhausted: bool },
    PageFailed { message: String },
    ReactionConfirmed { post_id: String, kind: ReactionKind },
    ReactionFailed {
        post_id: String,
        kind: ReactionKind,
        rolled_back: bool,
    },
    PostSubmitted,
    PostFailed { message: String },
}

enum Response {
    Page {
        request_id: u64,
        result: Result<Page<Post>>,
    },
    Reaction {
        ticket: ToggleTicket,
        result: Result<()>,
    },
    Submitted {
        result: Result<()>,
    },
}

pub struct Timeline {
    feed: FeedCursor<Post>,
    feed_service: Arc<dyn FeedService>,
    post_service: Arc<dyn PostService>,
    toggler: Option<ReactionToggler>,
    actor: Option<Actor>,
    reporter: Arc<dyn ErrorReporter>,
    scroll_threshold: f64,
    submitting: bool,
    last_error: Option<String>,
    closed: Arc<AtomicBool>,
    response_tx: Sender<Response>,
    response_rx: Receiver<Response>,
}

impl Timeline {
    pub fn new(options: Options) -> Self {
        let toggler = ReactionToggler::new(
            options.reaction_service,
            options.actor.clone(),
            options.rollback,
        )
        .ok();
        let (response_tx, response_rx) = unbounded();
        Self {
            feed: FeedCursor::new(),
            feed_service: options.feed_service,
            post_service: options.post_service,
            toggler,
            actor: options.actor,
            reporter: options.reporter,
            scroll_threshold: options.scroll_threshold,
            submitting: false,
            last_error: None,
            closed: Arc::new(AtomicBool::new(false)),
            response_tx,
            response_rx,
        }
    }

    pub fn items(&self) -> &[Post] {
        self.feed.items()
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.feed.cursor()
    }

    pub fn is_exhausted(&self) -> bool {
        self.feed.is_exhausted()
    }

    pub fn is_fetching(&self) -> bool {
        self.feed.is_fetching()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    /// Message of the last failed fetch, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Starts loading the next page. Returns false when the call was a
    /// no-op: a fetch is already outstanding, the feed is exhausted, or the
    /// view is closed.
    pub fn request_next_page(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        let Some(ticket) = self.feed.begin_fetch() else {
            return false;
        };

        log::debug!(
            "timeline: fetching page {} (cursor {:?})",
            ticket.request_id,
            ticket.cursor
        );
        let tx = self.response_tx.clone();
        let closed = Arc::clone(&self.closed);
        let service = Arc::clone(&self.feed_service);
        thread::spawn(move || {
            if closed.load(Ordering::SeqCst) {
                return;
            }
            let result = service.load_page(ticket.cursor.as_ref());
            if closed.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Page {
                request_id: ticket.request_id,
                result,
            });
        });
        true
    }

    /// Drops everything fetched so far and loads the first page again.
    pub fn reset(&mut self) {
        self.feed.reset();
        self.last_error = None;
        self.request_next_page();
    }

    /// Feeds one scroll sample; fetches when it is near the end.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        if self.feed.is_exhausted() || !metrics.near_end(self.scroll_threshold) {
            return false;
        }
        self.request_next_page()
    }

    pub fn pump_scroll(&mut self, subscription: &ScrollSubscription) -> bool {
        let mut started = false;
        for metrics in subscription.drain() {
            started |= self.on_scroll(metrics);
        }
        started
    }

    pub fn toggle_reaction(
        &mut self,
        post_id: &str,
        kind: ReactionKind,
    ) -> Result<ToggleOutcome, TimelineError> {
        if self.is_closed() {
            return Err(TimelineError::Closed);
        }
        let Some(toggler) = &self.toggler else {
            return Err(SessionError::SignInRequired.into());
        };
        let tx = self.response_tx.clone();
        let closed = Arc::clone(&self.closed);
        let outcome = toggler.toggle(&mut self.feed, post_id, kind, move |ticket, result| {
            if closed.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Reaction { ticket, result });
        });
        Ok(outcome)
    }

    /// Validates and sends a new post. The feed resets once it is accepted.
    pub fn submit_post(&mut self, texts: &str) -> Result<(), TimelineError> {
        if self.is_closed() {
            return Err(TimelineError::Closed);
        }
        let actor = session::require(self.actor.as_ref())?;
        error::validate_texts(texts)?;
        if self.submitting {
            return Err(TimelineError::Busy);
        }
        let draft = actor.draft(texts);
        self.submitting = true;

        let tx = self.response_tx.clone();
        let closed = Arc::clone(&self.closed);
        let service = Arc::clone(&self.post_service);
        thread::spawn(move || {
            let result = service.create_post(&draft);
            if closed.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Submitted { result });
        });
        Ok(())
    }

    /// Applies every finished request without blocking.
    pub fn poll(&mut self) -> Vec<TimelineEvent> {
        let mut events = Vec::new();
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle(message, &mut events);
        }
        events
    }

    /// Blocks up to `timeout` for the next finished request, then applies it
    /// together with anything else already waiting.
    pub fn wait(&mut self, timeout: Duration) -> Vec<TimelineEvent> {
        if self.is_closed() {
            return Vec::new();
        }
        match self.response_rx.recv_timeout(timeout) {
            Ok(message) => {
                let mut events = Vec::new();
                self.handle(message, &mut events);
                events.extend(self.poll());
                events
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Vec::new(),
        }
    }

    /// Ends the view's lifetime. Requests still running finish on their
    /// threads but their results are discarded.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        while self.response_rx.try_recv().is_ok() {}
    }

    fn handle(&mut self, message: Response, events: &mut Vec<TimelineEvent>) {
        if self.is_closed() {
            return;
        }
        match message {
            Response::Page { request_id, result } => match self.feed.complete(request_id, result) {
                Completion::Applied {
                    appended,
                    exhausted,
                } => {
                    self.last_error = None;
                    events.push(TimelineEvent::PageLoaded {
                        appended,
                        exhausted,
                    });
                }
                Completion::Failed(err) => {
                    self.reporter.report(&err, report::TIMELINE_LOAD_FAILED);
                    let message = format!("{err:#}");
                    self.last_error = Some(message.clone());
                    events.push(TimelineEvent::PageFailed { message });
                }
                Completion::Stale => {
                    log::debug!("timeline: dropping stale page {request_id}");
                }
            },
            Response::Reaction { ticket, result } => {
                let Some(toggler) = &self.toggler else {
                    return;
                };
                if let Err(err) = &result {
                    self.reporter.report(err, report::REACTION_FAILED);
                }
                let resolution = toggler.reconcile(&mut self.feed, ticket, &result);
                let ToggleTicket { post_id, kind, .. } = resolution.ticket;
                if resolution.confirmed {
                    events.push(TimelineEvent::ReactionConfirmed { post_id, kind });
                } else {
                    events.push(TimelineEvent::ReactionFailed {
                        post_id,
                        kind,
                        rolled_back: resolution.rolled_back,
                    });
                }
            }
            Response::Submitted { result } => {
                self.submitting = false;
                match result {
                    Ok(()) => {
                        events.push(TimelineEvent::PostSubmitted);
                        self.reset();
                    }
                    Err(err) => {
                        self.reporter.report(&err, report::POST_SUBMIT_FAILED);
                        events.push(TimelineEvent::PostFailed {
                            message: format!("{err:#}"),
                        });
                    }
                }
            }
        }
    }
}

impl Drop for Timeline {
    fn drop(&mut self) {
        self.close();
    }
}
