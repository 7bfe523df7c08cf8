use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;

use crate::api;
use crate::model::{Comment, Cursor, Draft, Entry, Page, Post, ReactionKind, Reactions};

pub trait FeedService: Send + Sync {
    fn load_page(&self, cursor: Option<&Cursor>) -> Result<Page<Post>>;
}

pub trait ReactionService: Send + Sync {
    fn toggle(&self, post_id: &str, actor_id: &str, kind: ReactionKind) -> Result<()>;
}

pub trait PostService: Send + Sync {
    fn load_post(&self, post_id: &str) -> Result<Post>;
    fn create_post(&self, draft: &Draft) -> Result<()>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, post_id: &str, cursor: Option<&Cursor>) -> Result<Page<Comment>>;
    fn create_comment(&self, post_id: &str, draft: &Draft) -> Result<()>;
}

pub struct ApiFeedService {
    client: Arc<api::Client>,
}

impl ApiFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for ApiFeedService {
    fn load_page(&self, cursor: Option<&Cursor>) -> Result<Page<Post>> {
        self.client
            .timeline_page(cursor)
            .context("fetch timeline page")
    }
}

pub struct ApiReactionService {
    client: Arc<api::Client>,
}

impl ApiReactionService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl ReactionService for ApiReactionService {
    fn toggle(&self, post_id: &str, actor_id: &str, kind: ReactionKind) -> Result<()> {
        self.client
            .put_reaction(post_id, actor_id, kind)
            .context("submit reaction")
    }
}

pub struct ApiPostService {
    client: Arc<api::Client>,
}

impl ApiPostService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl PostService for ApiPostService {
    fn load_post(&self, post_id: &str) -> Result<Post> {
        self.client.post(post_id).context("fetch post")
    }

    fn create_post(&self, draft: &Draft) -> Result<()> {
        self.client.create_post(draft).context("create post")
    }
}

pub struct ApiCommentService {
    client: Arc<api::Client>,
}

impl ApiCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for ApiCommentService {
    fn load_comments(&self, post_id: &str, cursor: Option<&Cursor>) -> Result<Page<Comment>> {
        self.client
            .comment_page(post_id, cursor)
            .context("fetch comments")
    }

    fn create_comment(&self, post_id: &str, draft: &Draft) -> Result<()> {
        self.client
            .create_comment(post_id, draft)
            .context("create comment")
    }
}

/// In-memory backend for offline browsing. Pages are served newest first,
/// cursored by the last item of the previous page, like the real API.
pub struct MockBackend {
    page_size: usize,
    posts: Mutex<Vec<Post>>,
    comments: Mutex<Vec<Comment>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(2)
    }
}

impl MockBackend {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            posts: Mutex::new(sample_posts()),
            comments: Mutex::new(sample_comments()),
        }
    }

    fn next_stamp(&self) -> i64 {
        let posts = self.posts.lock();
        let comments = self.comments.lock();
        posts
            .iter()
            .map(Entry::timestamp)
            .chain(comments.iter().map(Entry::timestamp))
            .max()
            .unwrap_or(0)
            + 1
    }
}

fn paginate<T: Entry + Clone>(items: &[T], cursor: Option<&Cursor>, page_size: usize) -> Page<T> {
    let start = match cursor {
        Some(cursor) => items
            .iter()
            .position(|item| item.id() == cursor.id)
            .map_or(items.len(), |index| index + 1),
        None => 0,
    };
    let end = (start + page_size).min(items.len());
    let slice = items[start..end].to_vec();
    if end < items.len() {
        let last = slice.last().map(Entry::cursor);
        Page {
            items: slice,
            next_cursor: last,
        }
    } else {
        Page::last(slice)
    }
}

impl FeedService for MockBackend {
    fn load_page(&self, cursor: Option<&Cursor>) -> Result<Page<Post>> {
        let mut posts = self.posts.lock().clone();
        posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(paginate(&posts, cursor, self.page_size))
    }
}

impl ReactionService for MockBackend {
    fn toggle(&self, post_id: &str, actor_id: &str, kind: ReactionKind) -> Result<()> {
        let mut posts = self.posts.lock();
        let Some(post) = posts.iter_mut().find(|post| post.post_id == post_id) else {
            bail!("mock: post {post_id} not found");
        };
        post.toggle_reaction(actor_id, kind);
        Ok(())
    }
}

impl PostService for MockBackend {
    fn load_post(&self, post_id: &str) -> Result<Post> {
        let posts = self.posts.lock();
        match posts.iter().find(|post| post.post_id == post_id) {
            Some(post) => Ok(post.clone()),
            None => bail!("mock: post {post_id} not found"),
        }
    }

    fn create_post(&self, draft: &Draft) -> Result<()> {
        let timestamp = self.next_stamp();
        let mut posts = self.posts.lock();
        let post_id = format!("post-{}", posts.len() + 1);
        posts.push(Post {
            post_id,
            uuid: draft.uuid.clone(),
            user_name: draft.user_name.clone(),
            user_profile_img_url: draft.user_profile_img_url.clone(),
            texts: draft.texts.clone(),
            timestamp,
            comment_count: 0,
            reactions: Reactions::new(),
        });
        Ok(())
    }
}

impl CommentService for MockBackend {
    fn load_comments(&self, post_id: &str, cursor: Option<&Cursor>) -> Result<Page<Comment>> {
        let mut comments: Vec<Comment> = self
            .comments
            .lock()
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(paginate(&comments, cursor, self.page_size))
    }

    fn create_comment(&self, post_id: &str, draft: &Draft) -> Result<()> {
        let timestamp = self.next_stamp();
        {
            let mut posts = self.posts.lock();
            let Some(post) = posts.iter_mut().find(|post| post.post_id == post_id) else {
                bail!("mock: post {post_id} not found");
            };
            post.comment_count += 1;
        }
        let mut comments = self.comments.lock();
        let comment_id = format!("comment-{}", comments.len() + 1);
        comments.push(Comment {
            comment_id,
            post_id: post_id.to_string(),
            uuid: draft.uuid.clone(),
            user_name: draft.user_name.clone(),
            user_profile_img_url: draft.user_profile_img_url.clone(),
            texts: draft.texts.clone(),
            timestamp,
        });
        Ok(())
    }
}

fn sample_posts() -> Vec<Post> {
    let entries = [
        (
            "welcome",
            "staff",
            "Terakoya",
            "Welcome to the Terakoya timeline!",
            1_700_000_500,
        ),
        (
            "tuesday",
            "u-aoi",
            "Aoi",
            "Tuesday study session starts at 17:00.",
            1_700_000_400,
        ),
        (
            "math",
            "u-ren",
            "Ren",
            "Does anyone have notes on quadratic equations?",
            1_700_000_300,
        ),
        (
            "thanks",
            "u-mei",
            "Mei",
            "Thank you for the help with my essay last week.",
            1_700_000_200,
        ),
        (
            "saturday",
            "staff",
            "Terakoya",
            "Saturday sessions move to the Shibuya room.",
            1_700_000_100,
        ),
    ];
    entries
        .into_iter()
        .map(|(id, uuid, name, texts, timestamp)| Post {
            post_id: id.to_string(),
            uuid: uuid.to_string(),
            user_name: name.to_string(),
            user_profile_img_url: String::new(),
            texts: texts.to_string(),
            timestamp,
            comment_count: if id == "math" { 1 } else { 0 },
            reactions: Reactions::new(),
        })
        .collect()
}

fn sample_comments() -> Vec<Comment> {
    vec![Comment {
        comment_id: "math-1".into(),
        post_id: "math".into(),
        uuid: "u-aoi".into(),
        user_name: "Aoi".into(),
        user_profile_img_url: String::new(),
        texts: "I can share mine on Tuesday.".into(),
        timestamp: 1_700_000_350,
    }]
}
