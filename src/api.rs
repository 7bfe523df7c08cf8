use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::{Comment, Cursor, Draft, Page, Post, ReactionKind};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api: client user agent required");
        }
        let mut base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("api: parse base url {base}"))?;
        if base_url.cannot_be_a_base() {
            bail!("api: base url {base} cannot carry paths");
        }
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeline_page(&self, cursor: Option<&Cursor>) -> Result<Page<Post>> {
        self.fetch_page(&["timeline"], cursor)
    }

    pub fn post(&self, post_id: &str) -> Result<Post> {
        let resp = self.request(Method::GET, &["timeline", post_id], &[], None::<&()>)?;
        resp.json().context("api: decode post")
    }

    pub fn create_post(&self, draft: &Draft) -> Result<()> {
        self.request(Method::POST, &["timeline"], &[], Some(draft))?;
        Ok(())
    }

    pub fn put_reaction(&self, post_id: &str, actor_id: &str, kind: ReactionKind) -> Result<()> {
        if post_id.trim().is_empty() {
            bail!("api: reaction target is required");
        }
        let body = ReactionBody {
            uuid: actor_id.to_string(),
            kind,
        };
        self.request(Method::PUT, &["timeline", post_id, "reaction"], &[], Some(&body))?;
        Ok(())
    }

    pub fn comment_page(&self, post_id: &str, cursor: Option<&Cursor>) -> Result<Page<Comment>> {
        self.fetch_page(&["timeline", post_id, "comment"], cursor)
    }

    pub fn create_comment(&self, post_id: &str, draft: &Draft) -> Result<()> {
        self.request(Method::POST, &["timeline", post_id, "comment"], &[], Some(draft))?;
        Ok(())
    }

    fn fetch_page<T>(&self, segments: &[&str], cursor: Option<&Cursor>) -> Result<Page<T>>
    where
        T: DeserializeOwned,
    {
        let mut params = Vec::new();
        if let Some(cursor) = cursor {
            params.push((
                "last_evaluated_timestamp".to_string(),
                cursor.timestamp.to_string(),
            ));
            params.push(("last_evaluated_id".to_string(), cursor.id.clone()));
        }
        let resp = self.request(Method::GET, segments, &params, None::<&()>)?;
        let envelope: PageEnvelope<T> = resp.json().context("api: decode page")?;
        Ok(envelope.into())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("api: base url cannot carry paths"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request<B>(
        &self,
        method: Method,
        segments: &[&str],
        params: &[(String, String)],
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let mut url = self.endpoint(segments)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        log::debug!("api: {} {}", method, url);
        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        req = req.header(ACCEPT, "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            match status.as_u16() {
                400 => Err(anyhow!("api: bad request: {}", body)),
                401 => Err(anyhow!("api: unauthorized")),
                403 => Err(anyhow!("api: forbidden")),
                404 => Err(anyhow!("api: not found")),
                429 => Err(anyhow!("api: rate limited: {}", body)),
                _ => Err(anyhow!("api: server error {}: {}", status, body)),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PageEnvelope<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    last_evaluated_timestamp: Option<i64>,
    #[serde(default)]
    last_evaluated_id: Option<String>,
}

impl<T> From<PageEnvelope<T>> for Page<T> {
    fn from(envelope: PageEnvelope<T>) -> Self {
        Page {
            items: envelope.items,
            next_cursor: Cursor::from_parts(
                envelope.last_evaluated_timestamp,
                envelope.last_evaluated_id,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ReactionBody {
    uuid: String,
    #[serde(rename = "type")]
    kind: ReactionKind,
}
