//! Cursor pagination over an append-only list.
//!
//! [`FeedCursor`] is the pure state machine behind the infinite-scroll feed
//! and the comment list: it decides whether a fetch may start, remembers
//! which request is outstanding, and folds pages into the list. It never
//! performs I/O itself; the owning view dispatches the fetch and hands the
//! result back through [`FeedCursor::complete`].

use anyhow::Error;

use crate::model::{Cursor, Entry, Page};

/// Handed out when a fetch is allowed to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub request_id: u64,
    pub cursor: Option<Cursor>,
}

#[derive(Debug)]
pub enum Completion {
    Applied { appended: usize, exhausted: bool },
    Failed(Error),
    /// The result belonged to a request that was reset or replaced.
    Stale,
}

#[derive(Debug, Clone)]
pub struct FeedCursor<T> {
    items: Vec<T>,
    cursor: Option<Cursor>,
    exhausted: bool,
    in_flight: Option<u64>,
    next_request_id: u64,
    generation: u64,
}

impl<T> Default for FeedCursor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FeedCursor<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            cursor: None,
            exhausted: false,
            in_flight: None,
            next_request_id: 1,
            generation: 0,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Bumped by every [`FeedCursor::reset`]. Items seen under an older
    /// generation have since been replaced by a fresh fetch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a fetch unless one is outstanding or the feed is exhausted.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        if self.exhausted || self.in_flight.is_some() {
            return None;
        }
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.in_flight = Some(request_id);
        Some(FetchTicket {
            request_id,
            cursor: self.cursor.clone(),
        })
    }

    pub fn complete(&mut self, request_id: u64, result: anyhow::Result<Page<T>>) -> Completion {
        if self.in_flight != Some(request_id) {
            return Completion::Stale;
        }
        self.in_flight = None;

        match result {
            Ok(page) => {
                let appended = page.items.len();
                self.items.extend(page.items);
                self.exhausted = page.next_cursor.is_none();
                self.cursor = page.next_cursor;
                Completion::Applied {
                    appended,
                    exhausted: self.exhausted,
                }
            }
            Err(err) => Completion::Failed(err),
        }
    }

    /// Back to the freshly mounted state. An outstanding request is
    /// forgotten, so its result completes as [`Completion::Stale`].
    pub fn reset(&mut self) {
        self.items.clear();
        self.cursor = None;
        self.exhausted = false;
        self.in_flight = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

impl<T: Entry> FeedCursor<T> {
    pub fn find_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: &'static str,
        ts: i64,
    }

    impl Entry for Row {
        fn id(&self) -> &str {
            self.id
        }

        fn timestamp(&self) -> i64 {
            self.ts
        }
    }

    fn row(id: &'static str, ts: i64) -> Row {
        Row { id, ts }
    }

    fn ids(feed: &FeedCursor<Row>) -> Vec<&'static str> {
        feed.items().iter().map(|row| row.id).collect()
    }

    #[test]
    fn second_begin_is_suppressed_while_in_flight() {
        let mut feed = FeedCursor::<Row>::new();
        let ticket = feed.begin_fetch().unwrap();
        assert!(ticket.cursor.is_none());
        assert!(feed.begin_fetch().is_none());
        assert!(feed.is_fetching());
    }

    #[test]
    fn pages_append_in_arrival_order() {
        let mut feed = FeedCursor::new();
        let first = feed.begin_fetch().unwrap();
        feed.complete(
            first.request_id,
            Ok(Page::with_cursor(vec![row("a", 4), row("b", 3)], Cursor::new(3, "b"))),
        );
        let second = feed.begin_fetch().unwrap();
        assert_eq!(second.cursor, Some(Cursor::new(3, "b")));
        feed.complete(
            second.request_id,
            Ok(Page::with_cursor(vec![row("c", 2), row("d", 1)], Cursor::new(1, "d"))),
        );
        assert_eq!(ids(&feed), vec!["a", "b", "c", "d"]);
        assert!(!feed.is_exhausted());
    }

    #[test]
    fn empty_last_page_exhausts() {
        let mut feed = FeedCursor::new();
        let first = feed.begin_fetch().unwrap();
        feed.complete(
            first.request_id,
            Ok(Page::with_cursor(vec![row("p1", 100)], Cursor::new(100, "p1"))),
        );
        let second = feed.begin_fetch().unwrap();
        assert_eq!(second.cursor, Some(Cursor::new(100, "p1")));
        let completion = feed.complete(second.request_id, Ok(Page::last(vec![])));
        assert!(matches!(
            completion,
            Completion::Applied {
                appended: 0,
                exhausted: true
            }
        ));
        assert_eq!(ids(&feed), vec!["p1"]);
        for _ in 0..3 {
            assert!(feed.begin_fetch().is_none());
        }
    }

    #[test]
    fn failure_keeps_items_and_cursor() {
        let mut feed = FeedCursor::new();
        let first = feed.begin_fetch().unwrap();
        feed.complete(
            first.request_id,
            Ok(Page::with_cursor(vec![row("a", 2)], Cursor::new(2, "a"))),
        );
        let second = feed.begin_fetch().unwrap();
        let completion = feed.complete(second.request_id, Err(anyhow!("offline")));
        assert!(matches!(completion, Completion::Failed(_)));
        assert!(!feed.is_fetching());
        assert_eq!(ids(&feed), vec!["a"]);

        let retry = feed.begin_fetch().unwrap();
        assert_eq!(retry.cursor, Some(Cursor::new(2, "a")));
    }

    #[test]
    fn reset_discards_late_result() {
        let mut feed = FeedCursor::new();
        let first = feed.begin_fetch().unwrap();
        feed.complete(
            first.request_id,
            Ok(Page::with_cursor(vec![row("old", 9)], Cursor::new(9, "old"))),
        );
        let pending = feed.begin_fetch().unwrap();
        feed.reset();
        let fresh = feed.begin_fetch().unwrap();
        assert!(fresh.cursor.is_none());

        let late = feed.complete(pending.request_id, Ok(Page::last(vec![row("late", 1)])));
        assert!(matches!(late, Completion::Stale));
        feed.complete(
            fresh.request_id,
            Ok(Page::with_cursor(vec![row("new", 10)], Cursor::new(10, "new"))),
        );
        assert_eq!(ids(&feed), vec!["new"]);
        assert!(!feed.is_exhausted());
    }

    #[test]
    fn reset_matches_fresh_feed_shape() {
        let page = || Page::with_cursor(vec![row("a", 2), row("b", 1)], Cursor::new(1, "b"));

        let mut fresh = FeedCursor::new();
        let ticket = fresh.begin_fetch().unwrap();
        fresh.complete(ticket.request_id, Ok(page()));

        let mut reused = FeedCursor::new();
        let ticket = reused.begin_fetch().unwrap();
        reused.complete(ticket.request_id, Ok(Page::last(vec![row("z", 5)])));
        reused.reset();
        let ticket = reused.begin_fetch().unwrap();
        reused.complete(ticket.request_id, Ok(page()));

        assert_eq!(fresh.items(), reused.items());
        assert_eq!(fresh.cursor(), reused.cursor());
        assert_eq!(fresh.is_exhausted(), reused.is_exhausted());
        assert_eq!(fresh.generation() + 1, reused.generation());
    }

    #[test]
    fn find_mut_edits_in_place() {
        let mut feed = FeedCursor::new();
        let ticket = feed.begin_fetch().unwrap();
        feed.complete(ticket.request_id, Ok(Page::last(vec![row("a", 2), row("b", 1)])));

        feed.find_mut("b").unwrap().ts = 7;
        assert!(feed.find_mut("missing").is_none());
        assert_eq!(feed.items()[1], row("b", 7));
    }
}
