//! Deterministic "archive" items used to pad pages when live news runs short.

use crate::news::NewsItem;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

const CATEGORIES: [&str; 4] = ["global", "economic", "corporate", "policy"];

const SOURCES: [&str; 4] = [
    "Newsdesk Archives",
    "Market Historical Data",
    "Financial Archives",
    "Historical Wire",
];

const TEMPLATES: [(&str, &str); 10] = [
    (
        "Global Markets: Historical Performance Analysis",
        "This archived article examines historical market performance, providing context for current trends and potential future movements based on past patterns.",
    ),
    (
        "Market Trends: A Look Back at Key Movements",
        "A retrospective analysis of key market trends, highlighting important movements that have shaped the current market landscape.",
    ),
    (
        "Economic Indicators: Historical Context and Analysis",
        "Historical economic indicators provide valuable context for understanding current market conditions and potential future developments.",
    ),
    (
        "Sector Performance: Historical Perspective",
        "This archived report analyzes historical sector performance, offering insights into cyclical patterns and long-term trends across various industries.",
    ),
    (
        "Market Volatility: Historical Patterns and Insights",
        "An examination of historical market volatility patterns, providing perspective on current market conditions and potential future volatility.",
    ),
    (
        "Global Trade: Historical Impact on Markets",
        "This historical analysis explores the impact of global trade developments on market performance over time, offering context for current trade dynamics.",
    ),
    (
        "Central Bank Policies: Historical Market Effects",
        "A review of historical central bank policies and their effects on markets, providing context for understanding current policy implications.",
    ),
    (
        "Commodity Markets: Historical Price Analysis",
        "This archived analysis examines historical commodity price movements, offering insights into supply-demand dynamics and market cycles.",
    ),
    (
        "Currency Markets: Historical Exchange Rate Trends",
        "A historical perspective on currency exchange rate trends, highlighting key patterns and relationships that have influenced global markets.",
    ),
    (
        "Investment Strategies: Historical Performance Review",
        "This historical review evaluates the performance of various investment strategies across different market conditions, offering insights for current portfolio management.",
    ),
];

/// Generate `count` padding items relative to `now_millis`.
///
/// Item `i` is dated `i + 1` days before now, so datetimes strictly decrease.
pub fn generate(count: usize, now_millis: i64) -> Vec<NewsItem> {
    generate_from(0, count, now_millis)
}

/// Generate `count` padding items starting at index `offset`.
///
/// Used to top up a short page without reusing ids already on it.
pub fn generate_from(offset: usize, count: usize, now_millis: i64) -> Vec<NewsItem> {
    (offset..offset + count)
        .map(|index| {
            let day_offset = index as i64 + 1;
            let (headline, summary) = TEMPLATES[index % TEMPLATES.len()];
            NewsItem {
                id: format!("historical-{index}"),
                headline: headline.to_string(),
                summary: summary.to_string(),
                datetime: (now_millis - day_offset * DAY_MS).div_euclid(1000),
                source: SOURCES[index % SOURCES.len()].to_string(),
                url: "#".to_string(),
                category: CATEGORIES[index % CATEGORIES.len()].to_string(),
                related: String::new(),
                image: String::new(),
                is_fallback: true,
                is_historical: true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;

    #[test]
    fn test_count_and_flags() {
        let items = generate(35, NOW);
        assert_eq!(items.len(), 35);
        assert!(items.iter().all(|i| i.is_fallback && i.is_historical));
        assert!(items.iter().all(|i| i.url == "#"));
    }

    #[test]
    fn test_strictly_decreasing_datetime() {
        let items = generate(12, NOW);
        assert_eq!(items[0].datetime, (NOW - DAY_MS) / 1000);
        for pair in items.windows(2) {
            assert!(pair[0].datetime > pair[1].datetime);
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(generate(20, NOW), generate(20, NOW));
    }

    #[test]
    fn test_templates_cycle() {
        let items = generate(11, NOW);
        assert_eq!(items[0].headline, items[10].headline);
        assert_eq!(items[4].source, items[0].source);
        assert_eq!(items[1].category, "economic");
    }

    #[test]
    fn test_generate_from_offsets_ids() {
        let items = generate_from(40, 2, NOW);
        assert_eq!(items[0].id, "historical-40");
        assert_eq!(items[1].id, "historical-41");
    }

    #[test]
    fn test_zero_count() {
        assert!(generate(0, NOW).is_empty());
    }
}
