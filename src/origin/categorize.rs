//! Keyword categorization of news items.
//!
//! Each domain has an ordered list of `(CategoryId, Predicate)` rules plus a
//! default category. [`categorize_item`] returns the first rule whose predicate
//! matches the item's headline and summary, or the default, so every item
//! lands in exactly one bucket.

use std::collections::BTreeMap;

use crate::news::{Domain, NewsItem};

/// Category identifier, e.g. `"economic"`.
pub type CategoryId = &'static str;

/// Matches when the lowercased text contains any of the keywords.
///
/// Keywords must already be lowercase. Matching is plain substring search,
/// so `"rule"` also matches `"ruled"`.
#[derive(Debug, Clone, Copy)]
pub struct Predicate(pub &'static [&'static str]);

impl Predicate {
    pub fn matches(&self, lowered: &str) -> bool {
        self.0.iter().any(|kw| lowered.contains(kw))
    }
}

/// Ordered rules for one domain.
#[derive(Debug, Clone, Copy)]
pub struct Taxonomy {
    pub rules: &'static [(CategoryId, Predicate)],
    pub default: CategoryId,
}

impl Taxonomy {
    /// Every category this taxonomy can produce, default first.
    pub fn categories(&self) -> Vec<CategoryId> {
        let mut out = vec![self.default];
        for (id, _) in self.rules {
            if !out.contains(id) {
                out.push(id);
            }
        }
        out
    }
}

const ECONOMIC: Predicate = Predicate(&[
    "economy", "gdp", "inflation", "growth", "recession", "economic", "fiscal", "monetary",
]);

const CORPORATE: Predicate = Predicate(&[
    "earnings",
    "profit",
    "revenue",
    "quarterly",
    "results",
    "company",
    "business",
    "corporate",
    "merger",
    "acquisition",
]);

const GLOBAL_POLICY: Predicate = Predicate(&[
    "fed",
    "central bank",
    "policy",
    "regulation",
    "government",
    "tax",
    "budget",
    "reform",
    "law",
    "rule",
]);

const DOMESTIC_POLICY: Predicate = Predicate(&[
    "rbi",
    "sebi",
    "policy",
    "regulation",
    "government",
    "tax",
    "budget",
    "reform",
    "law",
    "rule",
]);

const MARKET_UPDATES: Predicate = Predicate(&[
    "market", "sensex", "nifty", "stocks", "shares", "trading", "rally", "decline", "bull", "bear",
]);

const FII_DII: Predicate = Predicate(&[
    "fii",
    "dii",
    "foreign",
    "institutional",
    "investors",
    "investment",
    "fund",
    "inflow",
    "outflow",
]);

pub const GLOBAL_TAXONOMY: Taxonomy = Taxonomy {
    rules: &[
        ("economic", ECONOMIC),
        ("corporate", CORPORATE),
        ("policy", GLOBAL_POLICY),
    ],
    default: "global",
};

pub const DOMESTIC_TAXONOMY: Taxonomy = Taxonomy {
    rules: &[
        ("market-updates", MARKET_UPDATES),
        ("economic", ECONOMIC),
        ("fii-dii", FII_DII),
        ("corporate", CORPORATE),
        ("policy", DOMESTIC_POLICY),
    ],
    default: "market-updates",
};

pub fn taxonomy(domain: Domain) -> &'static Taxonomy {
    match domain {
        Domain::Global => &GLOBAL_TAXONOMY,
        Domain::Domestic => &DOMESTIC_TAXONOMY,
    }
}

/// First matching category for `item`, or the taxonomy default.
pub fn categorize_item(taxonomy: &Taxonomy, item: &NewsItem) -> CategoryId {
    let text = item.search_text();
    taxonomy
        .rules
        .iter()
        .find(|(_, predicate)| predicate.matches(&text))
        .map(|(id, _)| *id)
        .unwrap_or(taxonomy.default)
}

/// Split items into per-category buckets, retagging each copy's `category`.
///
/// Every category of the taxonomy is present in the result, possibly empty.
pub fn categorize(taxonomy: &Taxonomy, items: &[NewsItem]) -> BTreeMap<CategoryId, Vec<NewsItem>> {
    let mut buckets: BTreeMap<CategoryId, Vec<NewsItem>> = taxonomy
        .categories()
        .into_iter()
        .map(|c| (c, Vec::new()))
        .collect();
    for item in items {
        let category = categorize_item(taxonomy, item);
        let mut tagged = item.clone();
        tagged.category = category.to_string();
        buckets.entry(category).or_default().push(tagged);
    }
    buckets
}
