use chrono::NaiveDate;

use crate::model::Page;
use crate::profile::GameProfile;

/// Year-month-day placeholder that sorts after every real banner date.
pub const UNDATED_SORT_KEY: &str = "9999-99-99";

/// Event instance pages carry a `Title/YYYY-MM-DD` breadcrumb.
pub fn is_event_instance(page: &Page) -> bool {
    page.title.contains('/')
}

/// The second breadcrumb segment, expected to be a `YYYY-MM-DD` start date.
pub fn banner_date(page: &Page) -> &str {
    page.title.split('/').nth(1).unwrap_or("")
}

/// Everything after the first `/`, or the whole title when there is none.
pub fn last_breadcrumb(page: &Page) -> &str {
    match page.title.split_once('/') {
        Some((_, rest)) => rest,
        None => &page.title,
    }
}

/// `date` when it is a real `YYYY-MM-DD` calendar date, otherwise `""`.
pub fn valid_date_or_blank(date: &str) -> &str {
    if is_well_formed_date(date) { date } else { "" }
}

pub fn is_well_formed_date(date: &str) -> bool {
    let bytes = date.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    shape_ok && NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}

/// Bare `N.M` version, as used by breadcrumb-versioned pages.
pub fn is_bare_version(value: &str) -> bool {
    match value.split_once('.') {
        Some((major, minor)) => is_digits(major) && is_digits(minor),
        None => false,
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
}

pub fn is_weapon(page: &Page, profile: &GameProfile) -> bool {
    if !profile.weapon_title_pattern().is_match(&page.title) {
        return false;
    }
    match &profile.settings().weapon_title_keyword {
        Some(keyword) => page.title.contains(keyword.as_str()),
        None => true,
    }
}

pub fn has_feature_category(page: &Page, profile: &GameProfile, featured: &str) -> bool {
    let prefix = &profile.settings().featured_category_prefix;
    page.category_titles().any(|category| {
        category
            .strip_prefix(prefix.as_str())
            .is_some_and(|name| name == featured)
    })
}

/// `"A/B"` becomes `"A (B)"`, then the profile's name corrections apply.
pub fn display_title(page: &Page, profile: &GameProfile) -> String {
    let title = specialization_title(&page.title);
    match profile.settings().display_name_overrides.get(&title) {
        Some(corrected) => corrected.clone(),
        None => title,
    }
}

fn specialization_title(title: &str) -> String {
    let mut parts = title.split('/');
    match (parts.next(), parts.next()) {
        (Some(base), Some(variant)) => format!("{base} ({variant})"),
        _ => title.to_string(),
    }
}
