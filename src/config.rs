//! Client configuration

use crate::error::{CollabError, Result};
use serde::{Deserialize, Serialize};

/// Default number of records fetched per page during history restore
pub const DEFAULT_RESTORE_PAGE_SIZE: usize = 50;

/// Options for a collaboration client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Identity stamped on submissions and used to recognise own records
    pub user_id: String,

    /// Records requested per page when restoring older history
    pub restore_page_size: usize,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            restore_page_size: DEFAULT_RESTORE_PAGE_SIZE,
        }
    }
}

impl CollabConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CollabConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.is_empty() {
            return Err(CollabError::Config("user_id must not be empty".to_string()));
        }
        if self.restore_page_size == 0 {
            return Err(CollabError::Config(
                "restore_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
