//! Built-in search strategy catalogue.

use crate::upstream::SortOrder;

use super::{StarBand, StrategyConfig};

fn strategy(id: &str, sort: SortOrder, band: StarBand, topic: Option<&str>) -> StrategyConfig {
    StrategyConfig {
        id: id.to_string(),
        sort,
        band,
        topic: topic.map(str::to_string),
    }
}

/// The default ordered catalogue.
///
/// Distinct sort orders, star slices and topics give each strategy a
/// different view of the same star range, so rotating through them keeps
/// surfacing repositories a single query would never reach.
pub fn default_catalogue() -> Vec<StrategyConfig> {
    vec![
        strategy("stars", SortOrder::Stars, StarBand::Full, None),
        strategy("updated", SortOrder::Updated, StarBand::Full, None),
        strategy("created", SortOrder::Created, StarBand::Full, None),
        strategy(
            "stars-low",
            SortOrder::Stars,
            StarBand::Slice { index: 0, of: 3 },
            None,
        ),
        strategy(
            "stars-mid",
            SortOrder::Stars,
            StarBand::Slice { index: 1, of: 3 },
            None,
        ),
        strategy(
            "stars-high",
            SortOrder::Stars,
            StarBand::Slice { index: 2, of: 3 },
            None,
        ),
        strategy(
            "widened-updated",
            SortOrder::Updated,
            StarBand::Widened {
                below: 200,
                above: 1000,
                floor: 100,
            },
            None,
        ),
        strategy(
            "extended-created",
            SortOrder::Created,
            StarBand::Extended {
                factor: 2,
                cap: 50_000,
            },
            None,
        ),
        strategy(
            "topic-machine-learning",
            SortOrder::Stars,
            StarBand::Full,
            Some("machine-learning"),
        ),
        strategy(
            "topic-web-development",
            SortOrder::Stars,
            StarBand::Full,
            Some("web-development"),
        ),
        strategy(
            "topic-data-science",
            SortOrder::Stars,
            StarBand::Full,
            Some("data-science"),
        ),
        strategy(
            "topic-automation",
            SortOrder::Stars,
            StarBand::Full,
            Some("automation"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_catalogue_ids_unique() {
        let catalogue = default_catalogue();
        assert_eq!(catalogue.len(), 12);
        let ids: HashSet<_> = catalogue.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), catalogue.len());
    }

    #[test]
    fn test_default_catalogue_queries_differ() {
        let fingerprints: HashSet<_> = default_catalogue()
            .iter()
            .map(|s| s.resolve(100, 5000, 30).unwrap().fingerprint())
            .collect();
        assert_eq!(fingerprints.len(), 12);
    }
}
