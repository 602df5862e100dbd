//! Classification of release file names into semantic categories
//!
//! Classification is pure and deterministic:
//! 1. keyword match (`update`, well-known update version markers, `dlc`)
//! 2. bracketed 16-digit title id, classified by its fixed-position suffix
//! 3. fallback to [`Category::Unknown`]

use crate::types::{Category, ReleaseEntity};
use regex::Regex;
use std::sync::OnceLock;

/// Substrings (lowercase) that mark a file as an update
const UPDATE_KEYWORDS: &[&str] = &["update", "v65536", "v131072"];

/// Substring (lowercase) that marks a file as downloadable content
const DLC_KEYWORD: &str = "dlc";

fn title_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Hard-coded pattern, cannot fail to compile
        #[allow(clippy::unwrap_used)]
        Regex::new(r"(?i)\[0100[0-9a-f]{8}([0-9a-f])([0-9a-f]{3})\]").unwrap()
    })
}

/// Classify a file name
///
/// # Examples
///
/// ```
/// use release_archivist::categorizer::categorize;
/// use release_archivist::types::Category;
///
/// assert_eq!(categorize("Game.Update.v65536.nsp"), Category::Update);
/// assert_eq!(categorize("Game [0100ABCD12340000].nsp"), Category::Base);
/// assert_eq!(categorize("Game [0100ABCD12341001].nsp"), Category::Dlc);
/// assert_eq!(categorize("randomfile.bin"), Category::Unknown);
/// ```
#[must_use]
pub fn categorize(name: &str) -> Category {
    let lower = name.to_lowercase();

    if UPDATE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Category::Update;
    }
    if lower.contains(DLC_KEYWORD) {
        return Category::Dlc;
    }

    for caps in title_id_pattern().captures_iter(name) {
        if let Some(category) = classify_title_suffix(&caps[1], &caps[2]) {
            return category;
        }
    }

    Category::Unknown
}

/// Classify the last four hex digits of a title id.
///
/// The 13th digit's low bit separates the add-on range (odd) from the
/// application range (even); inside the application range the last three
/// digits select base (`000`) or update (`800`).
fn classify_title_suffix(range_digit: &str, tail: &str) -> Option<Category> {
    let range = u8::from_str_radix(range_digit, 16).ok()?;
    if range % 2 == 1 {
        return Some(Category::Dlc);
    }
    match tail.to_ascii_lowercase().as_str() {
        "000" => Some(Category::Base),
        "800" => Some(Category::Update),
        _ => None,
    }
}

/// Entities partitioned by category, each bucket preserving input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryGroups {
    /// Base game entities
    pub base: Vec<ReleaseEntity>,
    /// Update entities
    pub update: Vec<ReleaseEntity>,
    /// DLC entities
    pub dlc: Vec<ReleaseEntity>,
    /// Unclassified entities
    pub unknown: Vec<ReleaseEntity>,
}

impl CategoryGroups {
    /// Bucket for a category
    pub fn get(&self, category: Category) -> &[ReleaseEntity] {
        match category {
            Category::Base => &self.base,
            Category::Update => &self.update,
            Category::Dlc => &self.dlc,
            Category::Unknown => &self.unknown,
        }
    }

    /// Total number of entities across buckets
    pub fn len(&self) -> usize {
        self.base.len() + self.update.len() + self.dlc.len() + self.unknown.len()
    }

    /// Whether every bucket is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition entities into the four category buckets by their base name
pub fn group_by_category<I>(entities: I) -> CategoryGroups
where
    I: IntoIterator<Item = ReleaseEntity>,
{
    let mut groups = CategoryGroups::default();
    for entity in entities {
        let bucket = match categorize(entity.base_name()) {
            Category::Base => &mut groups.base,
            Category::Update => &mut groups.update,
            Category::Dlc => &mut groups.dlc,
            Category::Unknown => &mut groups.unknown,
        };
        bucket.push(entity);
    }
    groups
}
