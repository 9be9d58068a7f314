use std::path::PathBuf;
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::chronicled::merge_chronicled;
use crate::config::{DEFAULT_IMAGE_DELAY_MS, DEFAULT_IMAGE_SIZE, DEFAULT_MIN_DATA_SIZE};
use crate::content::PageContentSource;
use crate::error::ParseWarning;
use crate::history::{BannerParser, ParseOutcome};
use crate::mediawiki::{IconSource, MediaWikiClient, MediaWikiClientConfig, WikiQueryApi};
use crate::model::QueryResult;
use crate::output::{ImageOptions, write_data, write_images};
use crate::profile::GameProfile;

/// The six category pools one run reads.
#[derive(Debug, Clone, Default)]
pub struct InputPools {
    pub event: QueryResult,
    pub chronicled: Option<QueryResult>,
    pub five_star_characters: QueryResult,
    pub four_star_characters: QueryResult,
    pub five_star_weapons: QueryResult,
    pub four_star_weapons: QueryResult,
    /// HTTP requests spent across all pool fetches.
    pub requests: usize,
}

impl InputPools {
    /// Event pool with the chronicled pool folded in.
    pub fn merged_event_pool(&self, profile: &GameProfile) -> QueryResult {
        let mut event_pool = self.event.clone();
        if let Some(chronicled) = &self.chronicled {
            merge_chronicled(
                &mut event_pool,
                chronicled,
                &self.five_star_characters,
                &self.five_star_weapons,
                profile,
            );
        }
        event_pool
    }
}

#[derive(Debug, Clone)]
pub struct PullOptions {
    pub output: PathBuf,
    /// `None` skips icon downloads.
    pub image_dir: Option<PathBuf>,
    pub force: bool,
    pub min_data_size: usize,
    pub image_size: u32,
    pub image_delay: Duration,
}

impl PullOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            image_dir: None,
            force: false,
            min_data_size: DEFAULT_MIN_DATA_SIZE,
            image_size: DEFAULT_IMAGE_SIZE,
            image_delay: Duration::from_millis(DEFAULT_IMAGE_DELAY_MS),
        }
    }

    fn image_options(&self) -> ImageOptions {
        ImageOptions {
            force: self.force,
            size: self.image_size,
            delay: self.image_delay,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PullReport {
    pub game: String,
    pub event_pages: usize,
    pub records: usize,
    pub data_size: usize,
    pub images_downloaded: usize,
    pub skipped_pages: usize,
    pub mismatches: usize,
    pub content_fetches: usize,
    pub requests: usize,
}

/// Fetches every pool concurrently, one API handle per thread.
pub fn fetch_pools<A, F>(profile: &GameProfile, make_api: F) -> Result<InputPools>
where
    A: WikiQueryApi,
    F: Fn() -> Result<A> + Sync,
{
    let settings = profile.settings();
    let fetch = |category: &str, include_categories: bool| -> Result<(QueryResult, usize)> {
        let mut api = make_api()?;
        let result = api
            .query_category_pages(category, include_categories)
            .with_context(|| format!("failed to fetch {category}"))?;
        info!(
            category,
            pages = result.len(),
            fetches = result.total_fetches,
            "fetched category"
        );
        Ok((result, api.request_count()))
    };
    let fetch = &fetch;

    thread::scope(|scope| -> Result<InputPools> {
        let event = scope.spawn(move || fetch(&settings.event_category, true));
        let chronicled = settings
            .chronicled_category
            .as_deref()
            .map(|category| scope.spawn(move || fetch(category, true)));
        let five_star_characters =
            scope.spawn(move || fetch(&settings.five_star_characters_category, false));
        let four_star_characters =
            scope.spawn(move || fetch(&settings.four_star_characters_category, false));
        let five_star_weapons =
            scope.spawn(move || fetch(&settings.five_star_weapons_category, false));
        let four_star_weapons =
            scope.spawn(move || fetch(&settings.four_star_weapons_category, false));

        let mut requests = 0;
        let mut take = |handle: PoolHandle<'_>| -> Result<QueryResult> {
            let (pool, spent) = join(handle)?;
            requests += spent;
            Ok(pool)
        };
        let event = take(event)?;
        let chronicled = chronicled.map(&mut take).transpose()?;
        let five_star_characters = take(five_star_characters)?;
        let four_star_characters = take(four_star_characters)?;
        let five_star_weapons = take(five_star_weapons)?;
        let four_star_weapons = take(four_star_weapons)?;

        Ok(InputPools {
            event,
            chronicled,
            five_star_characters,
            four_star_characters,
            five_star_weapons,
            four_star_weapons,
            requests,
        })
    })
}

type PoolHandle<'scope> = ScopedJoinHandle<'scope, Result<(QueryResult, usize)>>;

fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("category fetch thread panicked"))?
}

/// Merges the chronicled pool and runs the history builder.
pub fn build_dataset<S: PageContentSource>(
    profile: &GameProfile,
    pools: &InputPools,
    source: S,
) -> ParseOutcome {
    let event_pool = pools.merged_event_pool(profile);
    let mut parser = BannerParser::new(profile, source);
    parser.parse(
        &event_pool,
        &pools.five_star_characters,
        &pools.four_star_characters,
        &pools.five_star_weapons,
        &pools.four_star_weapons,
    )
}

pub fn pull_banners(
    profile: &GameProfile,
    client_config: &MediaWikiClientConfig,
    options: &PullOptions,
) -> Result<PullReport> {
    pull_banners_with(
        profile,
        || MediaWikiClient::new(client_config.clone()),
        options,
    )
}

/// Full pull: fetch, parse, write YAML, then icons when `image_dir` is set.
pub fn pull_banners_with<A, F>(
    profile: &GameProfile,
    make_api: F,
    options: &PullOptions,
) -> Result<PullReport>
where
    A: WikiQueryApi + PageContentSource + IconSource,
    F: Fn() -> Result<A> + Sync,
{
    let pools = fetch_pools(profile, &make_api)?;
    let mut api = make_api()?;
    let outcome = build_dataset(profile, &pools, &mut api);

    let data_size = write_data(&outcome.dataset, &options.output, options.min_data_size)?;
    let images_downloaded = match &options.image_dir {
        Some(dir) => write_images(
            &outcome.dataset,
            dir,
            profile,
            &mut api,
            &options.image_options(),
        )?,
        None => 0,
    };

    let report = PullReport {
        game: profile.id().to_string(),
        event_pages: pools.event.len(),
        records: outcome.dataset.record_count(),
        data_size,
        images_downloaded,
        skipped_pages: count_warnings(&outcome.warnings, |warning| {
            matches!(warning, ParseWarning::SkippedPage { .. })
        }),
        mismatches: count_warnings(&outcome.warnings, |warning| {
            matches!(warning, ParseWarning::VersionDateCountMismatch { .. })
        }),
        content_fetches: outcome.content_fetches,
        requests: pools.requests + api.request_count(),
    };
    info!(
        game = %report.game,
        records = report.records,
        data_size = report.data_size,
        images = report.images_downloaded,
        "pull complete"
    );
    Ok(report)
}

fn count_warnings(warnings: &[ParseWarning], predicate: impl Fn(&ParseWarning) -> bool) -> usize {
    warnings.iter().filter(|warning| predicate(warning)).count()
}
