//! Banner history reconstruction over MediaWiki category data.
//!
//! The engine (`classify`, `resolver`, `chronicled`, `history`) is pure and
//! single-threaded; `mediawiki`, `output` and `pipeline` connect it to a live
//! wiki and the filesystem.

pub mod chronicled;
pub mod classify;
pub mod config;
pub mod content;
pub mod error;
pub mod history;
pub mod mediawiki;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod resolver;
pub mod version;

pub use error::{EngineError, EngineResult, ParseWarning};
pub use history::{BannerParser, ParseOutcome};
pub use model::{BannerDataset, BannerDates, BannerHistory, Page, QueryResult};
pub use profile::{GameProfile, ProfileSettings};
