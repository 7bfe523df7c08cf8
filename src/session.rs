use serde::{Deserialize, Serialize};

use crate::model::Draft;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("sign in is required for this action")]
    SignInRequired,
}

/// The signed-in member on whose behalf reactions and posts are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub profile_img_url: String,
}

impl Actor {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            profile_img_url: String::new(),
        }
    }

    pub fn draft(&self, texts: &str) -> Draft {
        Draft {
            uuid: self.uuid.clone(),
            user_name: self.name.clone(),
            user_profile_img_url: self.profile_img_url.clone(),
            texts: texts.to_string(),
        }
    }
}

/// Fails fast when no actor is signed in.
pub fn require(actor: Option<&Actor>) -> Result<&Actor, SessionError> {
    match actor {
        Some(actor) if !actor.uuid.trim().is_empty() => Ok(actor),
        _ => Err(SessionError::SignInRequired),
    }
}
