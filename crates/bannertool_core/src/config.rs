use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::profile::{BUILTIN_GAMES, GameProfile, ProfileSettings};

pub const DEFAULT_CONFIG_FILE: &str = "bannertool.toml";
pub const DEFAULT_USER_AGENT: &str = "bannertool/0.1";
pub const DEFAULT_MIN_DATA_SIZE: usize = 40_000;
pub const DEFAULT_IMAGE_SIZE: u32 = 80;
pub const DEFAULT_IMAGE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BannerConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub games: BTreeMap<String, ProfileOverrides>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct OutputSection {
    pub min_data_size: Option<usize>,
    pub image_size: Option<u32>,
    pub image_delay_ms: Option<u64>,
}

/// `[games.<id>]` table. Unset keys keep the built-in value. A game id with
/// no built-in profile must name one in `base`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverrides {
    pub base: Option<String>,
    pub name: Option<String>,
    pub api_url: Option<String>,
    pub event_category: Option<String>,
    /// Empty string disables the chronicled pool.
    pub chronicled_category: Option<String>,
    pub five_star_characters_category: Option<String>,
    pub four_star_characters_category: Option<String>,
    pub five_star_weapons_category: Option<String>,
    pub four_star_weapons_category: Option<String>,
    pub weapon_title_pattern: Option<String>,
    /// Empty string removes the keyword requirement.
    pub weapon_title_keyword: Option<String>,
    pub weapon_banner_title: Option<String>,
    pub version_category_prefix: Option<String>,
    pub featured_category_prefix: Option<String>,
    pub chronicled_category_prefix: Option<String>,
    pub change_history_pattern: Option<String>,
    #[serde(default)]
    pub display_name_overrides: BTreeMap<String, String>,
    pub character_icon_file: Option<String>,
    pub weapon_icon_file: Option<String>,
    pub character_image_dir: Option<String>,
    pub weapon_image_dir: Option<String>,
}

impl ProfileOverrides {
    pub fn apply(&self, settings: &mut ProfileSettings) {
        replace(&mut settings.name, &self.name);
        replace(&mut settings.api_url, &self.api_url);
        replace(&mut settings.event_category, &self.event_category);
        replace_optional(&mut settings.chronicled_category, &self.chronicled_category);
        replace(
            &mut settings.five_star_characters_category,
            &self.five_star_characters_category,
        );
        replace(
            &mut settings.four_star_characters_category,
            &self.four_star_characters_category,
        );
        replace(
            &mut settings.five_star_weapons_category,
            &self.five_star_weapons_category,
        );
        replace(
            &mut settings.four_star_weapons_category,
            &self.four_star_weapons_category,
        );
        replace(&mut settings.weapon_title_pattern, &self.weapon_title_pattern);
        replace_optional(&mut settings.weapon_title_keyword, &self.weapon_title_keyword);
        replace(&mut settings.weapon_banner_title, &self.weapon_banner_title);
        replace(
            &mut settings.version_category_prefix,
            &self.version_category_prefix,
        );
        replace(
            &mut settings.featured_category_prefix,
            &self.featured_category_prefix,
        );
        replace(
            &mut settings.chronicled_category_prefix,
            &self.chronicled_category_prefix,
        );
        replace(&mut settings.change_history_pattern, &self.change_history_pattern);
        settings
            .display_name_overrides
            .extend(self.display_name_overrides.clone());
        replace(&mut settings.character_icon_file, &self.character_icon_file);
        replace(&mut settings.weapon_icon_file, &self.weapon_icon_file);
        replace(&mut settings.character_image_dir, &self.character_image_dir);
        replace(&mut settings.weapon_image_dir, &self.weapon_image_dir);
    }
}

impl BannerConfig {
    /// Resolve user agent: env BANNERTOOL_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Ok(value) = env::var("BANNERTOOL_USER_AGENT") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.wiki
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn min_data_size(&self) -> usize {
        self.output.min_data_size.unwrap_or(DEFAULT_MIN_DATA_SIZE)
    }

    pub fn image_size(&self) -> u32 {
        self.output.image_size.unwrap_or(DEFAULT_IMAGE_SIZE)
    }

    pub fn image_delay(&self) -> Duration {
        Duration::from_millis(self.output.image_delay_ms.unwrap_or(DEFAULT_IMAGE_DELAY_MS))
    }

    /// Built-in profile for `game` with its `[games.<id>]` overrides applied.
    pub fn resolve_profile(&self, game: &str) -> Result<GameProfile> {
        let game = game.trim();
        let overrides = self.games.get(game).or_else(|| {
            ProfileSettings::builtin(game).and_then(|builtin| self.games.get(&builtin.id))
        });

        let base = overrides
            .and_then(|overrides| overrides.base.as_deref())
            .unwrap_or(game);
        let mut settings = ProfileSettings::builtin(base).ok_or_else(|| {
            anyhow::anyhow!(
                "unsupported game: {game} (expected one of: {}, or a [games.{game}] table with `base`)",
                BUILTIN_GAMES.join(", ")
            )
        })?;

        if let Some(overrides) = overrides {
            if overrides.base.is_some() {
                settings.id = game.to_string();
            }
            overrides.apply(&mut settings);
        }

        GameProfile::compile(settings).with_context(|| format!("invalid profile for {game}"))
    }
}

/// Load and parse a BannerConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BannerConfig> {
    if !config_path.exists() {
        return Ok(BannerConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BannerConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn replace(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn replace_optional(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *target = Some(value.clone()).filter(|value| !value.trim().is_empty());
    }
}
