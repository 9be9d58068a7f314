//! Folds "chronicled" event pages into the primary "Features" category scheme.
//!
//! Chronicled pages list their pool with `Wish Pool Includes <X>` categories.
//! The functions here add a matching `Features <X>` category for every `<X>`
//! that is a known entity, so the history builder treats them like any other
//! event page.

use std::collections::BTreeSet;

use crate::classify::{banner_date, is_event_instance};
use crate::model::{Page, QueryResult};
use crate::profile::GameProfile;

/// Character variant: page ids and titles are kept as they are.
pub fn coerce_chronicled_to_char_banner(
    chronicled: &QueryResult,
    characters: &QueryResult,
    profile: &GameProfile,
) -> QueryResult {
    let known = characters.titles();
    let mut result = QueryResult::new();

    for page in chronicled.pages().filter(|page| is_event_instance(page)) {
        let mut coerced = page.clone();
        add_featured_categories(&mut coerced, page, &known, profile);
        result.merge_page(coerced);
    }

    result
}

/// Weapon variant: ids are negated so they never collide with primary event
/// pages, and titles move onto the weapon banner series with the same date.
pub fn coerce_chronicled_to_weapon_banner(
    chronicled: &QueryResult,
    weapons: &QueryResult,
    profile: &GameProfile,
) -> QueryResult {
    let known = weapons.titles();
    let mut result = QueryResult::new();

    for page in chronicled.pages().filter(|page| is_event_instance(page)) {
        let mut coerced = Page {
            id: -page.id,
            title: format!(
                "{}/{}",
                profile.settings().weapon_banner_title,
                banner_date(page)
            ),
            categories: page.categories.clone(),
        };
        add_featured_categories(&mut coerced, page, &known, profile);
        result.merge_page(coerced);
    }

    result
}

/// Unions both coerced variants of `chronicled` into `event_pool`.
pub fn merge_chronicled(
    event_pool: &mut QueryResult,
    chronicled: &QueryResult,
    five_star_characters: &QueryResult,
    five_star_weapons: &QueryResult,
    profile: &GameProfile,
) {
    event_pool.absorb(coerce_chronicled_to_char_banner(
        chronicled,
        five_star_characters,
        profile,
    ));
    event_pool.absorb(coerce_chronicled_to_weapon_banner(
        chronicled,
        five_star_weapons,
        profile,
    ));
}

fn add_featured_categories(
    target: &mut Page,
    source: &Page,
    known: &BTreeSet<&str>,
    profile: &GameProfile,
) {
    let settings = profile.settings();
    let included: Vec<&str> = source
        .category_titles()
        .filter_map(|category| category.strip_prefix(settings.chronicled_category_prefix.as_str()))
        .filter(|name| known.contains(name))
        .collect();
    for name in included {
        target.add_category(format!("{}{name}", settings.featured_category_prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> GameProfile {
        GameProfile::builtin("gi").expect("profile")
    }

    fn weapons() -> QueryResult {
        QueryResult::from_pages([
            Page::new(100, "Aquila Favonia"),
            Page::new(101, "Skyward Harp"),
            Page::new(102, "Wolf's Gravestone"),
        ])
    }

    fn characters() -> QueryResult {
        QueryResult::from_pages([Page::new(200, "Albedo"), Page::new(201, "Klee")])
    }

    fn chronicled() -> QueryResult {
        QueryResult::from_pages([
            Page::with_categories(
                20,
                "Chronicled Wish/2024-03-13",
                [
                    "Category:Released in Version 4.5",
                    "Category:Wish Pool Includes Aquila Favonia",
                    "Category:Wish Pool Includes Skyward Harp",
                    "Category:Wish Pool Includes Albedo",
                    "Category:Wish Pool Includes Mona",
                ],
            ),
            Page::with_categories(21, "Chronicled Wish", ["Category:Chronicled Wishes"]),
        ])
    }

    fn category_count(page: &Page, category: &str) -> usize {
        page.category_titles().filter(|title| *title == category).count()
    }

    #[test]
    fn weapon_variant_negates_id_and_uses_weapon_banner_title() {
        let result = coerce_chronicled_to_weapon_banner(&chronicled(), &weapons(), &profile());

        assert_eq!(result.len(), 1);
        let page = result.get(-20).expect("negated id");
        assert_eq!(page.title, "Epitome Invocation/2024-03-13");
        assert_eq!(category_count(page, "Category:Features Aquila Favonia"), 1);
        assert_eq!(category_count(page, "Category:Features Skyward Harp"), 1);
        assert_eq!(category_count(page, "Category:Features Albedo"), 0);
        assert_eq!(category_count(page, "Category:Released in Version 4.5"), 1);
    }

    #[test]
    fn character_variant_keeps_identity() {
        let result = coerce_chronicled_to_char_banner(&chronicled(), &characters(), &profile());

        let page = result.get(20).expect("same id");
        assert_eq!(page.title, "Chronicled Wish/2024-03-13");
        assert_eq!(category_count(page, "Category:Features Albedo"), 1);
        assert_eq!(category_count(page, "Category:Features Mona"), 0);
        assert!(result.get(21).is_none());
    }

    #[test]
    fn double_merge_does_not_duplicate_feature_categories() {
        let profile = profile();
        let chronicled = chronicled();
        let mut pool = QueryResult::from_pages([Page::with_categories(
            5,
            "Epitome Invocation/2024-02-28",
            ["Category:Released in Version 4.4"],
        )]);

        merge_chronicled(&mut pool, &chronicled, &characters(), &weapons(), &profile);
        let once = pool.clone();
        merge_chronicled(&mut pool, &chronicled, &characters(), &weapons(), &profile);
        assert_eq!(pool, once);

        let recoerced = coerce_chronicled_to_char_banner(&pool, &characters(), &profile);
        pool.absorb(recoerced);
        for page in pool.pages() {
            let titles: Vec<&str> = page.category_titles().collect();
            let unique: BTreeSet<&str> = titles.iter().copied().collect();
            assert_eq!(titles.len(), unique.len(), "duplicates on {}", page.title);
        }
        assert_eq!(pool.len(), 3);
    }
}
