use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::data::{CommentService, PostService};
use crate::error::{self, TimelineError};
use crate::feed::{Completion, FeedCursor};
use crate::model::{Comment, Page, Post};
use crate::report::{self, ErrorReporter};
use crate::session::{self, Actor};
use crate::viewport::{ScrollMetrics, DEFAULT_SCROLL_THRESHOLD};

pub struct ThreadOptions {
    pub post_id: String,
    pub post_service: Arc<dyn PostService>,
    pub comment_service: Arc<dyn CommentService>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub actor: Option<Actor>,
    pub scroll_threshold: f64,
}

impl ThreadOptions {
    pub fn new<S>(
        post_id: impl Into<String>,
        service: Arc<S>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self
    where
        S: PostService + CommentService + 'static,
    {
        Self {
            post_id: post_id.into(),
            post_service: service.clone(),
            comment_service: service,
            reporter,
            actor: None,
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEvent {
    PostLoaded,
    PostFailed { message: String },
    CommentsLoaded { appended: usize, exhausted: bool },
    CommentsFailed { message: String },
    CommentSubmitted,
    CommentFailed { message: String },
}

enum Response {
    Post {
        request_id: u64,
        result: Result<Post>,
    },
    Comments {
        request_id: u64,
        result: Result<Page<Comment>>,
    },
    Submitted {
        result: Result<()>,
    },
}

/// A single post with its comment list, as shown on the post's own page.
pub struct PostThread {
    post_id: String,
    post: Option<Post>,
    post_request: Option<u64>,
    next_post_request: u64,
    comments: FeedCursor<Comment>,
    post_service: Arc<dyn PostService>,
    comment_service: Arc<dyn CommentService>,
    reporter: Arc<dyn ErrorReporter>,
    actor: Option<Actor>,
    scroll_threshold: f64,
    submitting: bool,
    closed: Arc<AtomicBool>,
    response_tx: Sender<Response>,
    response_rx: Receiver<Response>,
}

impl PostThread {
    pub fn new(options: ThreadOptions) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            post_id: options.post_id,
            post: None,
            post_request: None,
            next_post_request: 1,
            comments: FeedCursor::new(),
            post_service: options.post_service,
            comment_service: options.comment_service,
            reporter: options.reporter,
            actor: options.actor,
            scroll_threshold: options.scroll_threshold,
            submitting: false,
            closed: Arc::new(AtomicBool::new(false)),
            response_tx,
            response_rx,
        }
    }

    /// Loads the post and the first page of comments.
    pub fn open(options: ThreadOptions) -> Self {
        let mut view = Self::new(options);
        view.load_post();
        view.request_more_comments();
        view
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn post(&self) -> Option<&Post> {
        self.post.as_ref()
    }

    pub fn comments(&self) -> &[Comment] {
        self.comments.items()
    }

    pub fn is_loading_post(&self) -> bool {
        self.post_request.is_some()
    }

    pub fn is_fetching_comments(&self) -> bool {
        self.comments.is_fetching()
    }

    pub fn is_exhausted(&self) -> bool {
        self.comments.is_exhausted()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fetches the post again; only the newest request is applied.
    pub fn load_post(&mut self) {
        if self.is_closed() {
            return;
        }
        let request_id = self.next_post_request;
        self.next_post_request = self.next_post_request.wrapping_add(1);
        self.post_request = Some(request_id);

        let tx = self.response_tx.clone();
        let closed = Arc::clone(&self.closed);
        let service = Arc::clone(&self.post_service);
        let post_id = self.post_id.clone();
        thread::spawn(move || {
            let result = service.load_post(&post_id);
            if closed.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Post { request_id, result });
        });
    }

    pub fn request_more_comments(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        let Some(ticket) = self.comments.begin_fetch() else {
            return false;
        };

        let tx = self.response_tx.clone();
        let closed = Arc::clone(&self.closed);
        let service = Arc::clone(&self.comment_service);
        let post_id = self.post_id.clone();
        thread::spawn(move || {
            let result = service.load_comments(&post_id, ticket.cursor.as_ref());
            if closed.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Comments {
                request_id: ticket.request_id,
                result,
            });
        });
        true
    }

    pub fn reset_comments(&mut self) {
        self.comments.reset();
        self.request_more_comments();
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        if self.comments.is_exhausted() || !metrics.near_end(self.scroll_threshold) {
            return false;
        }
        self.request_more_comments()
    }

    pub fn submit_comment(&mut self, texts: &str) -> Result<(), TimelineError> {
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
        let service = Arc::clone(&self.comment_service);
        let post_id = self.post_id.clone();
        thread::spawn(move || {
            let result = service.create_comment(&post_id, &draft);
            if closed.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(Response::Submitted { result });
        });
        Ok(())
    }

    pub fn poll(&mut self) -> Vec<ThreadEvent> {
        let mut events = Vec::new();
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle(message, &mut events);
        }
        events
    }

    pub fn wait(&mut self, timeout: Duration) -> Vec<ThreadEvent> {
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
            Err(_) => Vec::new(),
        }
    }

    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        while self.response_rx.try_recv().is_ok() {}
    }

    fn handle(&mut self, message: Response, events: &mut Vec<ThreadEvent>) {
        if self.is_closed() {
            return;
        }
        match message {
            Response::Post { request_id, result } => {
                if self.post_request != Some(request_id) {
                    return;
                }
                self.post_request = None;
                match result {
                    Ok(post) => {
                        self.post = Some(post);
                        events.push(ThreadEvent::PostLoaded);
                    }
                    Err(err) => {
                        self.reporter.report(&err, report::POST_LOAD_FAILED);
                        events.push(ThreadEvent::PostFailed {
                            message: format!("{err:#}"),
                        });
                    }
                }
            }
            Response::Comments { request_id, result } => {
                match self.comments.complete(request_id, result) {
                    Completion::Applied {
                        appended,
                        exhausted,
                    } => events.push(ThreadEvent::CommentsLoaded {
                        appended,
                        exhausted,
                    }),
                    Completion::Failed(err) => {
                        self.reporter.report(&err, report::COMMENTS_LOAD_FAILED);
                        events.push(ThreadEvent::CommentsFailed {
                            message: format!("{err:#}"),
                        });
                    }
                    Completion::Stale => {}
                }
            }
            Response::Submitted { result } => {
                self.submitting = false;
                match result {
                    Ok(()) => {
                        events.push(ThreadEvent::CommentSubmitted);
                        self.load_post();
                        self.reset_comments();
                    }
                    Err(err) => {
                        self.reporter.report(&err, report::COMMENT_SUBMIT_FAILED);
                        events.push(ThreadEvent::CommentFailed {
                            message: format!("{err:#}"),
                        });
                    }
                }
            }
        }
    }
}

impl Drop for PostThread {
    fn drop(&mut self) {
        self.close();
    }
}
