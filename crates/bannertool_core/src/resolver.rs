use tracing::{debug, warn};

use crate::classify::{is_bare_version, is_event_instance, last_breadcrumb};
use crate::content::{PageContentCache, PageContentSource};
use crate::error::{EngineError, EngineResult, ParseWarning};
use crate::model::{Page, QueryResult};
use crate::profile::GameProfile;

/// Works out which release version an event instance page belongs to.
pub struct VersionResolver<'p, S> {
    profile: &'p GameProfile,
    cache: PageContentCache<S>,
}

impl<'p, S: PageContentSource> VersionResolver<'p, S> {
    pub fn new(profile: &'p GameProfile, source: S) -> Self {
        Self {
            profile,
            cache: PageContentCache::new(source),
        }
    }

    pub fn profile(&self) -> &'p GameProfile {
        self.profile
    }

    pub fn cache(&self) -> &PageContentCache<S> {
        &self.cache
    }

    /// Resolution order: version category, then a bare `N.M` breadcrumb when the
    /// category count is not exactly one, then the change-history marker in the
    /// page text.
    pub fn resolve_version(&mut self, page: &Page) -> EngineResult<String> {
        let Some(categories) = page.categories.as_ref() else {
            return Err(EngineError::unresolved(&page.title, "page has no categories"));
        };

        let prefix = self.profile.settings().version_category_prefix.as_str();
        let versions: Vec<&str> = categories
            .iter()
            .filter_map(|category| category.strip_prefix(prefix))
            .collect();

        let breadcrumb = last_breadcrumb(page);
        if versions.len() != 1 && is_bare_version(breadcrumb) {
            return Ok(breadcrumb.to_string());
        }

        match versions.first() {
            Some(version) => {
                if versions.len() > 1 {
                    debug!(
                        title = %page.title,
                        count = versions.len(),
                        "page has several version categories, using the first"
                    );
                }
                Ok((*version).to_string())
            }
            None => {
                let pattern = self.profile.change_history_pattern();
                let content = self.cache.get(page.id);
                pattern
                    .captures(content)
                    .and_then(|captures| captures.get(1))
                    .map(|version| version.as_str().to_string())
                    .ok_or_else(|| {
                        EngineError::unresolved(
                            &page.title,
                            "no version category and no change history marker",
                        )
                    })
            }
        }
    }

    /// Keeps only event instance pages whose version resolves. Entity pages are
    /// dropped silently; unresolvable event pages are logged and reported.
    pub fn filter_valid(&mut self, pool: &QueryResult) -> (QueryResult, Vec<ParseWarning>) {
        let mut filtered = QueryResult::new();
        let mut warnings = Vec::new();

        for page in pool.pages() {
            if !is_event_instance(page) {
                continue;
            }
            match self.resolve_version(page) {
                Ok(_) => filtered.merge_page(page.clone()),
                Err(error) => {
                    warn!("Skipping page due to version error: {error}");
                    warnings.push(ParseWarning::SkippedPage {
                        title: page.title.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        (filtered, warnings)
    }
}
