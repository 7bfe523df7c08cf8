use parking_lot::Mutex;

pub const TIMELINE_LOAD_FAILED: &str = "Failed to load the timeline.";
pub const POST_LOAD_FAILED: &str = "Failed to load the post.";
pub const COMMENTS_LOAD_FAILED: &str = "Failed to load comments.";
pub const POST_SUBMIT_FAILED: &str = "Failed to submit the post.";
pub const COMMENT_SUBMIT_FAILED: &str = "Failed to submit the comment.";
pub const REACTION_FAILED: &str = "Failed to update the reaction.";

/// Receives remote failures for display. The core never renders anything.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &anyhow::Error, message: &str);
}

#[derive(Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &anyhow::Error, message: &str) {
        log::error!("{message} ({error:#})");
    }
}

/// Keeps every report in memory; handy for callers that render a list of
/// notices after the fact.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &anyhow::Error, message: &str) {
        self.entries
            .lock()
            .push((message.to_string(), format!("{error:#}")));
    }
}
