use std::cmp::Ordering;

use tracing::{info, warn};

use crate::classify::{
    UNDATED_SORT_KEY, banner_date, display_title, has_feature_category, is_event_instance,
    is_weapon, valid_date_or_blank,
};
use crate::content::PageContentSource;
use crate::error::{EngineResult, ParseWarning};
use crate::model::{BannerDataset, BannerDates, BannerHistory, Page, QueryResult};
use crate::profile::GameProfile;
use crate::resolver::VersionResolver;
use crate::version::{INVALID_VERSION, parse_version, sort_versions};

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub dataset: BannerDataset,
    pub warnings: Vec<ParseWarning>,
    /// Page bodies fetched to resolve versions.
    pub content_fetches: usize,
}

/// Rebuilds per-entity banner timelines from an event page pool.
pub struct BannerParser<'p, S> {
    resolver: VersionResolver<'p, S>,
}

impl<'p, S: PageContentSource> BannerParser<'p, S> {
    pub fn new(profile: &'p GameProfile, source: S) -> Self {
        Self {
            resolver: VersionResolver::new(profile, source),
        }
    }

    pub fn resolver(&self) -> &VersionResolver<'p, S> {
        &self.resolver
    }

    fn profile(&self) -> &'p GameProfile {
        self.resolver.profile()
    }

    /// `event_pool` must already contain any merged chronicled pages.
    pub fn parse(
        &mut self,
        event_pool: &QueryResult,
        five_star_characters: &QueryResult,
        four_star_characters: &QueryResult,
        five_star_weapons: &QueryResult,
        four_star_weapons: &QueryResult,
    ) -> ParseOutcome {
        let (filtered, mut warnings) = self.resolver.filter_valid(event_pool);
        info!(
            kept = filtered.len(),
            skipped = warnings.len(),
            "filtered event pages"
        );

        let dataset = BannerDataset {
            five_star_characters: self.banner_history(&filtered, five_star_characters, &mut warnings),
            four_star_characters: self.banner_history(&filtered, four_star_characters, &mut warnings),
            five_star_weapons: self.banner_history(&filtered, five_star_weapons, &mut warnings),
            four_star_weapons: self.banner_history(&filtered, four_star_weapons, &mut warnings),
        };

        ParseOutcome {
            dataset,
            warnings,
            content_fetches: self.resolver.cache().fetch_count(),
        }
    }

    /// One record per entity with at least one resolved version, ordered by
    /// first version. Entities with equal first versions keep title order.
    pub fn banner_history(
        &mut self,
        event_pool: &QueryResult,
        entities: &QueryResult,
        warnings: &mut Vec<ParseWarning>,
    ) -> Vec<BannerHistory> {
        let profile = self.profile();
        let mut entity_pages: Vec<&Page> = entities.pages().collect();
        entity_pages.sort_by(|left, right| title_order(&left.title, &right.title));

        let mut result = Vec::with_capacity(entity_pages.len());
        for page in entity_pages {
            let name = display_title(page, profile);
            let versions = self.featured_versions(event_pool, &name);
            let dates = self.featured_dates(event_pool, &name);

            if versions.len() != dates.len() {
                warn!(
                    "Version and dates length mismatch for {name} - versions: {versions:?}, dates: {dates:?}"
                );
                warnings.push(ParseWarning::VersionDateCountMismatch {
                    name: name.clone(),
                    versions: versions.clone(),
                    dates: dates.clone(),
                });
            }

            result.push(BannerHistory {
                name,
                versions,
                dates,
            });
        }

        result.retain(|history| !history.versions.is_empty());
        result.sort_by_key(|history| {
            history
                .versions
                .first()
                .map(|version| parse_version(version))
                .unwrap_or(INVALID_VERSION)
        });
        result
    }

    /// `<version>.<minor>` for every event page featuring `featured`, sorted.
    pub fn featured_versions(&mut self, event_pool: &QueryResult, featured: &str) -> Vec<String> {
        let profile = self.profile();
        let mut result: Vec<String> = Vec::new();

        for page in event_pool.pages() {
            if !has_feature_category(page, profile, featured) {
                continue;
            }
            let full_version = match self.resolver.resolve_version(page) {
                Ok(version) => self
                    .minor_version(event_pool, &version, featured, is_weapon(page, profile))
                    .map(|minor| format!("{version}.{minor}")),
                Err(error) => Err(error),
            };
            match full_version {
                Ok(version) => {
                    if !result.contains(&version) {
                        result.push(version);
                    }
                }
                Err(error) => {
                    warn!("Error getting version for {}: {error}", page.title);
                }
            }
        }

        sort_versions(&mut result);
        result
    }

    /// Start/end pairs for every event page featuring `featured`. A banner ends
    /// when the next banner of the same kind starts.
    pub fn featured_dates(&self, event_pool: &QueryResult, featured: &str) -> Vec<BannerDates> {
        let profile = self.profile();
        let mut result: Vec<BannerDates> = Vec::new();

        for page in event_pool
            .pages()
            .filter(|page| has_feature_category(page, profile, featured))
        {
            let start = valid_date_or_blank(banner_date(page));
            let end = if start.is_empty() {
                ""
            } else {
                next_banner_date(event_pool, profile, banner_date(page), is_weapon(page, profile))
                    .map(valid_date_or_blank)
                    .unwrap_or("")
            };

            let dates = BannerDates::new(start, end);
            if !result.contains(&dates) {
                result.push(dates);
            }
        }

        result.sort_by(|left, right| start_order(&left.start, &right.start));
        result
    }

    /// 1-based position of the first banner featuring `featured` among the
    /// distinct start dates of its version.
    fn minor_version(
        &mut self,
        event_pool: &QueryResult,
        version: &str,
        featured: &str,
        weapon: bool,
    ) -> EngineResult<u32> {
        let profile = self.profile();
        let pages = self.pages_of_version(event_pool, version, weapon)?;

        let mut minor = 0;
        let mut start_date = "";
        for page in pages {
            let date = banner_date(page);
            if date != start_date {
                start_date = date;
                minor += 1;
            }
            if has_feature_category(page, profile, featured) {
                break;
            }
        }
        Ok(minor)
    }

    fn pages_of_version<'a>(
        &mut self,
        event_pool: &'a QueryResult,
        version: &str,
        weapon: bool,
    ) -> EngineResult<Vec<&'a Page>> {
        let profile = self.profile();
        let mut pages = Vec::new();
        for page in event_pool.pages() {
            if !is_event_instance(page) || is_weapon(page, profile) != weapon {
                continue;
            }
            if self.resolver.resolve_version(page)? == version {
                pages.push(page);
            }
        }
        pages.sort_by(|left, right| date_sort_key(left).cmp(date_sort_key(right)));
        Ok(pages)
    }
}

fn next_banner_date<'a>(
    event_pool: &'a QueryResult,
    profile: &GameProfile,
    start_date: &str,
    weapon: bool,
) -> Option<&'a str> {
    event_pool
        .pages()
        .filter(|page| is_event_instance(page) && is_weapon(page, profile) == weapon)
        .map(banner_date)
        .filter(|date| *date > start_date)
        .min()
}

fn date_sort_key(page: &Page) -> &str {
    match valid_date_or_blank(banner_date(page)) {
        "" => UNDATED_SORT_KEY,
        date => date,
    }
}

fn start_order(left: &str, right: &str) -> Ordering {
    (left.is_empty(), left).cmp(&(right.is_empty(), right))
}

fn title_order(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
}
