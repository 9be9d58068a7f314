use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const GENSHIN_API_URL: &str = "https://genshin-impact.fandom.com/api.php";
pub const STAR_RAIL_API_URL: &str = "https://honkai-star-rail.fandom.com/api.php";

pub const DEFAULT_VERSION_CATEGORY_PREFIX: &str = "Category:Released in Version ";
pub const DEFAULT_FEATURED_CATEGORY_PREFIX: &str = "Category:Features ";
pub const DEFAULT_CHRONICLED_CATEGORY_PREFIX: &str = "Category:Wish Pool Includes ";
pub const DEFAULT_CHANGE_HISTORY_PATTERN: &str = r"\{\{Change History\|(\d+\.\d+)\}\}";

pub const BUILTIN_GAMES: &[&str] = &["gi", "hsr"];

/// Plain-data description of how one game's wiki is laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub id: String,
    pub name: String,
    pub api_url: String,
    pub event_category: String,
    pub chronicled_category: Option<String>,
    pub five_star_characters_category: String,
    pub four_star_characters_category: String,
    pub five_star_weapons_category: String,
    pub four_star_weapons_category: String,
    pub weapon_title_pattern: String,
    pub weapon_title_keyword: Option<String>,
    pub weapon_banner_title: String,
    pub version_category_prefix: String,
    pub featured_category_prefix: String,
    pub chronicled_category_prefix: String,
    pub change_history_pattern: String,
    #[serde(default)]
    pub display_name_overrides: BTreeMap<String, String>,
    /// `{name}` is replaced with the entity's display name.
    pub character_icon_file: String,
    pub weapon_icon_file: String,
    pub character_image_dir: String,
    pub weapon_image_dir: String,
}

impl ProfileSettings {
    pub fn genshin() -> Self {
        Self {
            id: "gi".to_string(),
            name: "Genshin Impact".to_string(),
            api_url: GENSHIN_API_URL.to_string(),
            event_category: "Category:Event_Wishes".to_string(),
            chronicled_category: Some("Category:Chronicled_Wishes".to_string()),
            five_star_characters_category: "Category:5-Star_Characters".to_string(),
            four_star_characters_category: "Category:4-Star_Characters".to_string(),
            five_star_weapons_category: "Category:5-Star_Weapons".to_string(),
            four_star_weapons_category: "Category:4-Star_Weapons".to_string(),
            weapon_title_pattern: "Epitome Invocation".to_string(),
            weapon_title_keyword: None,
            weapon_banner_title: "Epitome Invocation".to_string(),
            version_category_prefix: DEFAULT_VERSION_CATEGORY_PREFIX.to_string(),
            featured_category_prefix: DEFAULT_FEATURED_CATEGORY_PREFIX.to_string(),
            chronicled_category_prefix: DEFAULT_CHRONICLED_CATEGORY_PREFIX.to_string(),
            change_history_pattern: DEFAULT_CHANGE_HISTORY_PATTERN.to_string(),
            display_name_overrides: BTreeMap::new(),
            character_icon_file: "{name} Icon.png".to_string(),
            weapon_icon_file: "Weapon {name}.png".to_string(),
            character_image_dir: "characters".to_string(),
            weapon_image_dir: "weapons".to_string(),
        }
    }

    pub fn star_rail() -> Self {
        Self {
            id: "hsr".to_string(),
            name: "Honkai: Star Rail".to_string(),
            api_url: STAR_RAIL_API_URL.to_string(),
            event_category: "Category:Event_Warps".to_string(),
            chronicled_category: None,
            five_star_characters_category: "Category:5-Star_Characters".to_string(),
            four_star_characters_category: "Category:4-Star_Characters".to_string(),
            five_star_weapons_category: "Category:5-Star_Light_Cones".to_string(),
            four_star_weapons_category: "Category:4-Star_Light_Cones".to_string(),
            weapon_title_pattern: "Event Warp".to_string(),
            weapon_title_keyword: Some("Light Cone".to_string()),
            weapon_banner_title: "Event Warp".to_string(),
            version_category_prefix: DEFAULT_VERSION_CATEGORY_PREFIX.to_string(),
            featured_category_prefix: DEFAULT_FEATURED_CATEGORY_PREFIX.to_string(),
            chronicled_category_prefix: DEFAULT_CHRONICLED_CATEGORY_PREFIX.to_string(),
            change_history_pattern: DEFAULT_CHANGE_HISTORY_PATTERN.to_string(),
            display_name_overrides: BTreeMap::from([(
                "Topaz & Numby".to_string(),
                "Topaz and Numby".to_string(),
            )]),
            character_icon_file: "Character {name} Icon.png".to_string(),
            weapon_icon_file: "Light Cone {name} Icon.png".to_string(),
            character_image_dir: "hsr-characters".to_string(),
            weapon_image_dir: "lightcones".to_string(),
        }
    }

    pub fn builtin(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "gi" | "genshin" => Some(Self::genshin()),
            "hsr" | "starrail" => Some(Self::star_rail()),
            _ => None,
        }
    }
}

/// Compiled per-game configuration consumed by the parser.
#[derive(Debug, Clone)]
pub struct GameProfile {
    settings: ProfileSettings,
    weapon_title_pattern: Regex,
    change_history_pattern: Regex,
}

impl GameProfile {
    pub fn compile(settings: ProfileSettings) -> Result<Self> {
        let weapon_title_pattern = Regex::new(&settings.weapon_title_pattern).with_context(|| {
            format!(
                "invalid weapon_title_pattern for {}: {}",
                settings.id, settings.weapon_title_pattern
            )
        })?;
        let change_history_pattern =
            Regex::new(&settings.change_history_pattern).with_context(|| {
                format!(
                    "invalid change_history_pattern for {}: {}",
                    settings.id, settings.change_history_pattern
                )
            })?;
        if change_history_pattern.captures_len() < 2 {
            bail!(
                "change_history_pattern for {} must capture the version in group 1",
                settings.id
            );
        }
        Ok(Self {
            settings,
            weapon_title_pattern,
            change_history_pattern,
        })
    }

    pub fn builtin(id: &str) -> Result<Self> {
        let settings = ProfileSettings::builtin(id).ok_or_else(|| {
            anyhow::anyhow!(
                "unsupported game: {id} (expected one of: {})",
                BUILTIN_GAMES.join(", ")
            )
        })?;
        Self::compile(settings)
    }

    pub fn settings(&self) -> &ProfileSettings {
        &self.settings
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn weapon_title_pattern(&self) -> &Regex {
        &self.weapon_title_pattern
    }

    pub fn change_history_pattern(&self) -> &Regex {
        &self.change_history_pattern
    }

    /// Base wiki URL derived from the API endpoint.
    pub fn wiki_url(&self) -> String {
        derive_wiki_url(&self.settings.api_url)
    }

    pub fn icon_file(&self, name: &str, is_character: bool) -> String {
        let template = if is_character {
            &self.settings.character_icon_file
        } else {
            &self.settings.weapon_icon_file
        };
        template.replace("{name}", name)
    }

    pub fn image_dir(&self, is_character: bool) -> &str {
        if is_character {
            &self.settings.character_image_dir
        } else {
            &self.settings.weapon_image_dir
        }
    }
}

/// Strip `/api.php` or `/w/api.php` from an API endpoint.
pub fn derive_wiki_url(api_url: &str) -> String {
    let trimmed = api_url.trim();
    trimmed
        .strip_suffix("/api.php")
        .or_else(|| trimmed.strip_suffix("/w/api.php"))
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}
