use std::sync::Arc;
use std::thread;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::data::ReactionService;
use crate::feed::FeedCursor;
use crate::model::{Post, ReactionKind};
use crate::session::{self, Actor, SessionError};

/// What to do with the optimistic flip when the backend rejects a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RollbackPolicy {
    /// Leave the local state as flipped; the user retries by hand.
    #[default]
    Keep,
    /// Flip the membership back once.
    Revert,
}

impl RollbackPolicy {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "keep" => Some(RollbackPolicy::Keep),
            "revert" | "rollback" => Some(RollbackPolicy::Revert),
            _ => None,
        }
    }
}

/// One optimistic flip waiting for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleTicket {
    pub post_id: String,
    pub actor_id: String,
    pub kind: ReactionKind,
    /// Membership after the optimistic flip.
    pub reacted: bool,
    /// Feed generation the flip was applied to.
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The post is not in the list; nothing was flipped or sent.
    NotFound,
    Pending { reacted: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub ticket: ToggleTicket,
    pub confirmed: bool,
    pub rolled_back: bool,
}

pub struct ReactionToggler {
    service: Arc<dyn ReactionService>,
    actor: Actor,
    policy: RollbackPolicy,
}

impl ReactionToggler {
    pub fn new(
        service: Arc<dyn ReactionService>,
        actor: Option<Actor>,
        policy: RollbackPolicy,
    ) -> Result<Self, SessionError> {
        let actor = session::require(actor.as_ref())?.clone();
        Ok(Self {
            service,
            actor,
            policy,
        })
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn policy(&self) -> RollbackPolicy {
        self.policy
    }

    /// Flips membership in `items` right away, then sends the toggle on a
    /// worker thread. `done` runs on that thread with the backend's answer.
    /// Repeated calls are not serialized; each one flips and sends again.
    pub fn toggle<F>(
        &self,
        feed: &mut FeedCursor<Post>,
        post_id: &str,
        kind: ReactionKind,
        done: F,
    ) -> ToggleOutcome
    where
        F: FnOnce(ToggleTicket, Result<()>) + Send + 'static,
    {
        let generation = feed.generation();
        let Some(post) = feed.find_mut(post_id) else {
            log::debug!("reaction: {post_id} not in the list, skipping toggle");
            return ToggleOutcome::NotFound;
        };
        let reacted = post.toggle_reaction(&self.actor.uuid, kind);
        let ticket = ToggleTicket {
            post_id: post_id.to_string(),
            actor_id: self.actor.uuid.clone(),
            kind,
            reacted,
            generation,
        };

        let service = Arc::clone(&self.service);
        thread::spawn(move || {
            let result = service.toggle(&ticket.post_id, &ticket.actor_id, ticket.kind);
            done(ticket, result);
        });

        ToggleOutcome::Pending { reacted }
    }

    /// Applies the rollback policy to a finished toggle. Success needs no
    /// change: the backend performed exactly the flip already shown. After a
    /// reset the list holds refetched posts the flip never touched, so
    /// nothing is reverted.
    pub fn reconcile(
        &self,
        feed: &mut FeedCursor<Post>,
        ticket: ToggleTicket,
        result: &Result<()>,
    ) -> Resolution {
        if result.is_ok() {
            return Resolution {
                ticket,
                confirmed: true,
                rolled_back: false,
            };
        }

        let mut rolled_back = false;
        if self.policy == RollbackPolicy::Revert && ticket.generation == feed.generation() {
            if let Some(post) = feed.find_mut(&ticket.post_id) {
                // Undoing one flip is one more flip, even when later toggles
                // are layered on top.
                post.toggle_reaction(&ticket.actor_id, ticket.kind);
                rolled_back = true;
            }
        }
        Resolution {
            ticket,
            confirmed: false,
            rolled_back,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Page, Reactions};
    use anyhow::anyhow;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    struct FixedReaction {
        fail: bool,
    }

    impl ReactionService for FixedReaction {
        fn toggle(&self, _post_id: &str, _actor_id: &str, _kind: ReactionKind) -> Result<()> {
            if self.fail {
                Err(anyhow!("backend down"))
            } else {
                Ok(())
            }
        }
    }

    fn post(id: &str) -> Post {
        Post {
            post_id: id.into(),
            uuid: "author".into(),
            user_name: "Author".into(),
            user_profile_img_url: String::new(),
            texts: "hello timeline".into(),
            timestamp: 100,
            comment_count: 0,
            reactions: Reactions::new(),
        }
    }

    fn feed() -> FeedCursor<Post> {
        let mut feed = FeedCursor::new();
        let ticket = feed.begin_fetch().unwrap();
        feed.complete(ticket.request_id, Ok(Page::last(vec![post("p1")])));
        feed
    }

    fn toggler(fail: bool, policy: RollbackPolicy) -> ReactionToggler {
        ReactionToggler::new(
            Arc::new(FixedReaction { fail }),
            Some(Actor::new("u1", "Hanako")),
            policy,
        )
        .unwrap()
    }

    fn flipped(feed: &mut FeedCursor<Post>) -> ToggleTicket {
        feed.find_mut("p1").unwrap().toggle_reaction("u1", ReactionKind::Like);
        ToggleTicket {
            post_id: "p1".into(),
            actor_id: "u1".into(),
            kind: ReactionKind::Like,
            reacted: true,
            generation: feed.generation(),
        }
    }

    fn liked(feed: &FeedCursor<Post>) -> bool {
        feed.items()[0].has_reacted("u1", ReactionKind::Like)
    }

    #[test]
    fn requires_signed_in_actor() {
        let result = ReactionToggler::new(
            Arc::new(FixedReaction { fail: false }),
            None,
            RollbackPolicy::Keep,
        );
        assert_eq!(result.err(), Some(SessionError::SignInRequired));
    }

    #[test]
    fn flips_before_backend_answers() {
        let toggler = toggler(false, RollbackPolicy::Keep);
        let mut feed = feed();
        let (tx, rx) = unbounded();
        let outcome = toggler.toggle(&mut feed, "p1", ReactionKind::Like, move |ticket, result| {
            let _ = tx.send((ticket, result.is_ok()));
        });
        assert_eq!(outcome, ToggleOutcome::Pending { reacted: true });
        assert!(liked(&feed));

        let (ticket, ok) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(ok);
        assert_eq!(ticket.post_id, "p1");
        assert!(ticket.reacted);
        assert_eq!(ticket.generation, feed.generation());
    }

    #[test]
    fn missing_post_is_ignored() {
        let toggler = toggler(false, RollbackPolicy::Keep);
        let mut feed = feed();
        let outcome = toggler.toggle(&mut feed, "gone", ReactionKind::Like, |_, _| {
            panic!("nothing should be sent");
        });
        assert_eq!(outcome, ToggleOutcome::NotFound);
        assert!(feed.items()[0].reactions.is_empty());
    }

    #[test]
    fn keep_policy_leaves_flip_after_failure() {
        let toggler = toggler(true, RollbackPolicy::Keep);
        let mut feed = feed();
        let ticket = flipped(&mut feed);
        let resolution = toggler.reconcile(&mut feed, ticket, &Err(anyhow!("backend down")));
        assert!(!resolution.confirmed);
        assert!(!resolution.rolled_back);
        assert!(liked(&feed));
    }

    #[test]
    fn revert_policy_undoes_flip_after_failure() {
        let toggler = toggler(true, RollbackPolicy::Revert);
        let mut feed = feed();
        let ticket = flipped(&mut feed);
        let resolution = toggler.reconcile(&mut feed, ticket, &Err(anyhow!("backend down")));
        assert!(resolution.rolled_back);
        assert!(!liked(&feed));
    }

    #[test]
    fn revert_skips_posts_refetched_after_reset() {
        let toggler = toggler(true, RollbackPolicy::Revert);
        let mut feed = feed();
        let ticket = flipped(&mut feed);

        feed.reset();
        let refetch = feed.begin_fetch().unwrap();
        feed.complete(refetch.request_id, Ok(Page::last(vec![post("p1")])));

        let resolution = toggler.reconcile(&mut feed, ticket, &Err(anyhow!("backend down")));
        assert!(!resolution.confirmed);
        assert!(!resolution.rolled_back);
        assert!(!liked(&feed));
    }

    #[test]
    fn policy_keys() {
        assert_eq!(RollbackPolicy::from_key("Revert"), Some(RollbackPolicy::Revert));
        assert_eq!(RollbackPolicy::from_key("keep"), Some(RollbackPolicy::Keep));
        assert_eq!(RollbackPolicy::from_key("maybe"), None);
    }
}
