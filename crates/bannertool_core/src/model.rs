use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One wiki page as returned by a category query.
///
/// `categories` is `None` when the API returned no category data for the page,
/// which is distinct from an empty membership list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub title: String,
    pub categories: Option<Vec<String>>,
}

impl Page {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            categories: None,
        }
    }

    pub fn with_categories<I, C>(id: i64, title: impl Into<String>, categories: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let mut page = Self::new(id, title);
        page.merge_categories(Some(categories.into_iter().map(Into::into).collect()));
        page
    }

    /// Adds a category unless the page already carries it. Returns `true` when added.
    pub fn add_category(&mut self, category: impl Into<String>) -> bool {
        let category = category.into();
        let categories = self.categories.get_or_insert_with(Vec::new);
        if categories.iter().any(|existing| *existing == category) {
            return false;
        }
        categories.push(category);
        true
    }

    /// Union of the current categories with `incoming`, keeping first-seen order.
    /// Absent incoming data never clears what is already known.
    pub fn merge_categories(&mut self, incoming: Option<Vec<String>>) {
        let Some(incoming) = incoming else {
            return;
        };
        self.categories.get_or_insert_with(Vec::new);
        for category in incoming {
            self.add_category(category);
        }
    }

    pub fn category_titles(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().flatten().map(String::as_str)
    }
}

/// Accumulated result of one paginated category query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pages: BTreeMap<i64, Page>,
    pub continuation: Option<BTreeMap<String, String>>,
    pub total_fetches: usize,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pages(pages: impl IntoIterator<Item = Page>) -> Self {
        let mut result = Self::new();
        for page in pages {
            result.merge_page(page);
        }
        result
    }

    /// Insert a page, or merge its categories into the page already stored under the same id.
    pub fn merge_page(&mut self, page: Page) {
        match self.pages.get_mut(&page.id) {
            Some(existing) => existing.merge_categories(page.categories),
            None => {
                self.pages.insert(page.id, page);
            }
        }
    }

    /// Union every page of `other` into this result.
    pub fn absorb(&mut self, other: QueryResult) {
        for page in other.pages.into_values() {
            self.merge_page(page);
        }
    }

    pub fn get(&self, id: i64) -> Option<&Page> {
        self.pages.get(&id)
    }

    pub fn pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.values()
    }

    pub fn titles(&self) -> BTreeSet<&str> {
        self.pages.values().map(|page| page.title.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerDates {
    pub start: String,
    pub end: String,
}

impl BannerDates {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Reconstructed release history of one character or weapon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerHistory {
    pub name: String,
    pub versions: Vec<String>,
    pub dates: Vec<BannerDates>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerDataset {
    pub five_star_characters: Vec<BannerHistory>,
    pub four_star_characters: Vec<BannerHistory>,
    pub five_star_weapons: Vec<BannerHistory>,
    pub four_star_weapons: Vec<BannerHistory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    FiveStarCharacters,
    FourStarCharacters,
    FiveStarWeapons,
    FourStarWeapons,
}

impl BucketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FiveStarCharacters => "fiveStarCharacters",
            Self::FourStarCharacters => "fourStarCharacters",
            Self::FiveStarWeapons => "fiveStarWeapons",
            Self::FourStarWeapons => "fourStarWeapons",
        }
    }

    pub fn is_character(self) -> bool {
        matches!(self, Self::FiveStarCharacters | Self::FourStarCharacters)
    }
}

impl BannerDataset {
    pub fn buckets(&self) -> [(BucketKind, &[BannerHistory]); 4] {
        [
            (BucketKind::FiveStarCharacters, self.five_star_characters.as_slice()),
            (BucketKind::FourStarCharacters, self.four_star_characters.as_slice()),
            (BucketKind::FiveStarWeapons, self.five_star_weapons.as_slice()),
            (BucketKind::FourStarWeapons, self.four_star_weapons.as_slice()),
        ]
    }

    pub fn record_count(&self) -> usize {
        self.buckets()
            .iter()
            .map(|(_, records)| records.len())
            .sum()
    }
}
