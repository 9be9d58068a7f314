use std::collections::HashMap;
use std::collections::hash_map::Entry;

use anyhow::Result;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Supplies the raw wikitext of a page by id.
pub trait PageContentSource {
    fn fetch_page_content(&mut self, page_id: i64) -> Result<String>;
}

impl<S: PageContentSource + ?Sized> PageContentSource for &mut S {
    fn fetch_page_content(&mut self, page_id: i64) -> Result<String> {
        (**self).fetch_page_content(page_id)
    }
}

/// Source for runs that must not touch the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPageContent;

impl PageContentSource for NoPageContent {
    fn fetch_page_content(&mut self, _page_id: i64) -> Result<String> {
        Ok(String::new())
    }
}

/// Per-run page content cache. Each page id is fetched at most once; a failed
/// fetch is remembered as empty content.
pub struct PageContentCache<S> {
    source: S,
    entries: HashMap<i64, String>,
    fetches: usize,
    failures: usize,
}

impl<S: PageContentSource> PageContentCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: HashMap::new(),
            fetches: 0,
            failures: 0,
        }
    }

    pub fn get(&mut self, page_id: i64) -> &str {
        match self.entries.entry(page_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.fetches += 1;
                debug!(page_id, "fetching page content");
                let content = match self.source.fetch_page_content(page_id) {
                    Ok(content) => content,
                    Err(error) => {
                        self.failures += 1;
                        let failure = EngineError::ContentFetchFailed {
                            page_id,
                            message: format!("{error:#}"),
                        };
                        warn!("{failure}");
                        String::new()
                    }
                };
                entry.insert(content)
            }
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn failure_count(&self) -> usize {
        self.failures
    }
}
