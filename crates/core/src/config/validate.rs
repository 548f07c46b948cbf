use std::collections::HashSet;

use super::{types::Config, AuthMethod, ConfigError};
use crate::strategy::StarBand;

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde) and api_key is set for api_key auth
/// - Server port is not 0
/// - Budget thresholds and worker pool size are usable
/// - Discovery loop bounds are non-zero
/// - Size bands are ordered
/// - Strategy ids are unique and slices are in range
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_deref().unwrap_or("").is_empty()
    {
        return Err(invalid("auth.api_key must be set when method = \"api_key\""));
    }

    let budget = &config.budget;
    if budget.low_water == 0 {
        return Err(invalid("budget.low_water must be at least 1"));
    }
    if budget.low_water >= budget.limit {
        return Err(invalid("budget.low_water must be below budget.limit"));
    }
    if budget.max_concurrent_requests == 0 {
        return Err(invalid("budget.max_concurrent_requests must be at least 1"));
    }
    if budget.initial_backoff_ms > budget.max_backoff_ms {
        return Err(invalid(
            "budget.initial_backoff_ms cannot exceed budget.max_backoff_ms",
        ));
    }
    if budget.retry.max_attempts == 0 {
        return Err(invalid("budget.retry.max_attempts must be at least 1"));
    }

    let discovery = &config.discovery;
    if discovery.max_rounds == 0 {
        return Err(invalid("discovery.max_rounds must be at least 1"));
    }
    if discovery.deadline_secs == 0 {
        return Err(invalid("discovery.deadline_secs must be at least 1"));
    }
    if discovery.page_size == 0 || discovery.page_size > 100 {
        return Err(invalid("discovery.page_size must be between 1 and 100"));
    }
    if discovery.default_window_days == 0
        || discovery.default_window_days > discovery.max_window_days
    {
        return Err(invalid(
            "discovery.default_window_days must be between 1 and discovery.max_window_days",
        ));
    }
    if discovery.default_limit == 0 || discovery.default_limit > discovery.max_limit {
        return Err(invalid(
            "discovery.default_limit must be between 1 and discovery.max_limit",
        ));
    }

    if config.filters.min_size_kb > config.filters.max_size_kb {
        return Err(invalid("filters.min_size_kb cannot exceed filters.max_size_kb"));
    }
    if !(0.0..=1.0).contains(&config.filters.min_language_share) {
        return Err(invalid("filters.min_language_share must be within 0.0..=1.0"));
    }

    let scoring = &config.scoring;
    if scoring.complexity_min_size_kb == 0
        || scoring.complexity_min_size_kb >= scoring.complexity_max_size_kb
    {
        return Err(invalid(
            "scoring.complexity_min_size_kb must be non-zero and below complexity_max_size_kb",
        ));
    }
    if scoring.fresh_days >= scoring.activity_horizon_days {
        return Err(invalid(
            "scoring.fresh_days must be below scoring.activity_horizon_days",
        ));
    }

    let mut ids = HashSet::new();
    for strategy in &config.strategies {
        if strategy.id.trim().is_empty() {
            return Err(invalid("strategy id cannot be empty"));
        }
        if !ids.insert(strategy.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate strategy id: {}",
                strategy.id
            )));
        }
        if let StarBand::Slice { index, of } = strategy.band {
            if of == 0 || index >= of {
                return Err(ConfigError::ValidationError(format!(
                    "strategy {}: slice index {} out of range for {} slices",
                    strategy.id, index, of
                )));
            }
        }
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;
    use crate::strategy::{SortOrder, StrategyConfig};

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[auth]
method = "none"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_api_key_required() {
        let mut config = base_config();
        config.auth.method = AuthMethod::ApiKey;
        assert!(validate_config(&config).is_err());

        config.auth.api_key = Some("key".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_low_water_must_be_below_limit() {
        let mut config = base_config();
        config.budget.low_water = config.budget.limit;
        assert!(validate_config(&config).is_err());

        config.budget.low_water = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = base_config();
        config.budget.max_concurrent_requests = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_page_size_bounds() {
        let mut config = base_config();
        config.discovery.page_size = 101;
        assert!(validate_config(&config).is_err());
        config.discovery.page_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_window_bounds() {
        let mut config = base_config();
        config.discovery.default_window_days = 0;
        assert!(validate_config(&config).is_err());
        config.discovery.default_window_days = 30;
        config.discovery.max_window_days = 14;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_complexity_band_order() {
        let mut config = base_config();
        config.scoring.complexity_min_size_kb = 500_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_strategy_ids() {
        let mut config = base_config();
        let strategy = StrategyConfig {
            id: "dup".to_string(),
            sort: SortOrder::Stars,
            band: StarBand::Full,
            topic: None,
        };
        config.strategies = vec![strategy.clone(), strategy];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate strategy id"));
    }

    #[test]
    fn test_validate_slice_out_of_range() {
        let mut config = base_config();
        config.strategies = vec![StrategyConfig {
            id: "slice".to_string(),
            sort: SortOrder::Stars,
            band: StarBand::Slice { index: 3, of: 3 },
            topic: None,
        }];
        assert!(validate_config(&config).is_err());
    }
}
