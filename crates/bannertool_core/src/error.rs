use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::BannerDates;

/// Failures raised while reconstructing banner histories.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The page carries no usable version signal. Recovered by dropping the page.
    #[error("could not determine version from page `{title}`: {reason}")]
    VersionUnresolved { title: String, reason: String },

    /// Raw page text could not be fetched. Recovered by caching empty content.
    #[error("failed to fetch content for page {page_id}: {message}")]
    ContentFetchFailed { page_id: i64, message: String },
}

impl EngineError {
    pub(crate) fn unresolved(title: &str, reason: impl Into<String>) -> Self {
        Self::VersionUnresolved {
            title: title.to_string(),
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Non-fatal findings collected during a parse run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    SkippedPage {
        title: String,
        reason: String,
    },
    VersionDateCountMismatch {
        name: String,
        versions: Vec<String>,
        dates: Vec<BannerDates>,
    },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedPage { title, reason } => {
                write!(f, "skipped page `{title}`: {reason}")
            }
            Self::VersionDateCountMismatch {
                name,
                versions,
                dates,
            } => write!(
                f,
                "version and dates length mismatch for {name}: {} versions, {} date ranges",
                versions.len(),
                dates.len()
            ),
        }
    }
}
