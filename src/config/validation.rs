use crate::config::types::{
    Config, CrawlerConfig, DedupConfig, HostWeight, PriorityConfig, RobotsConfig, SeedEntry,
    ShardConfig, UserAgentConfig,
};
use crate::url::normalize_url;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_robots_config(&config.robots)?;
    validate_dedup_config(&config.dedup)?;
    validate_priority_config(&config.priority)?;
    if let Some(shard) = &config.shard {
        validate_shard_config(shard)?;
    }
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 1024 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 1024, got {}",
            config.workers
        )));
    }

    if config.max_concurrent_per_host < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_per_host must be >= 1, got {}",
            config.max_concurrent_per_host
        )));
    }

    if config.max_crawl_delay_ms < config.default_crawl_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max_crawl_delay_ms ({}) must be >= default_crawl_delay_ms ({})",
            config.max_crawl_delay_ms, config.default_crawl_delay_ms
        )));
    }

    if config.retry_ceiling < 1 {
        return Err(ConfigError::Validation(
            "retry_ceiling must be >= 1".to_string(),
        ));
    }

    if config.fetch_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_ms must be >= 100ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    if config.max_body_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_body_bytes must be >= 1024, got {}",
            config.max_body_bytes
        )));
    }

    if config.idle_backoff_ms == 0 {
        return Err(ConfigError::Validation(
            "idle_backoff_ms must be > 0".to_string(),
        ));
    }

    if config.max_tracked_hosts < 1 {
        return Err(ConfigError::Validation(
            "max_tracked_hosts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name doubles as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.fetch_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "robots fetch_timeout_ms must be > 0".to_string(),
        ));
    }
    if config.ttl_secs == 0 || config.unreachable_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "robots TTLs must be > 0".to_string(),
        ));
    }
    if config.max_bytes == 0 {
        return Err(ConfigError::Validation(
            "robots max_bytes must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_dedup_config(config: &DedupConfig) -> Result<(), ConfigError> {
    if config.expected_urls == 0 {
        return Err(ConfigError::Validation(
            "expected_urls must be > 0".to_string(),
        ));
    }
    if !(config.false_positive_rate > 0.0 && config.false_positive_rate < 1.0) {
        return Err(ConfigError::Validation(format!(
            "false_positive_rate must be in (0, 1), got {}",
            config.false_positive_rate
        )));
    }
    Ok(())
}

fn validate_priority_config(config: &PriorityConfig) -> Result<(), ConfigError> {
    if config.depth_weight < 0.0 || config.path_weight < 0.0 {
        return Err(ConfigError::Validation(
            "priority weights must be >= 0".to_string(),
        ));
    }
    if config.low_threshold > config.high_threshold {
        return Err(ConfigError::Validation(format!(
            "low_threshold ({}) must be <= high_threshold ({})",
            config.low_threshold, config.high_threshold
        )));
    }
    validate_host_weights(&config.hosts)
}

fn validate_host_weights(weights: &[HostWeight]) -> Result<(), ConfigError> {
    for entry in weights {
        if entry.pattern != "*" {
            validate_domain_pattern(&entry.pattern)?;
        }
        if !entry.weight.is_finite() {
            return Err(ConfigError::Validation(format!(
                "Weight for '{}' must be finite",
                entry.pattern
            )));
        }
    }
    Ok(())
}

fn validate_shard_config(config: &ShardConfig) -> Result<(), ConfigError> {
    if config.peers.is_empty() {
        return Err(ConfigError::Validation(
            "shard peers cannot be empty".to_string(),
        ));
    }
    if !config.peers.contains(&config.shard_id) {
        return Err(ConfigError::Validation(format!(
            "shard_id '{}' is not listed in peers",
            config.shard_id
        )));
    }
    if config.virtual_nodes == 0 {
        return Err(ConfigError::Validation(
            "virtual_nodes must be > 0".to_string(),
        ));
    }
    Ok(())
}

/// Validates seed URLs: each must normalize to an http(s) URL
fn validate_seeds(seeds: &[SeedEntry]) -> Result<(), ConfigError> {
    for seed in seeds {
        normalize_url(&seed.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e))
        })?;
    }
    Ok(())
}

/// Validates a host pattern (supports a `*.` wildcard prefix)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
