use super::models::Config;
use crate::platforms::PlatformId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown platform in overrides: {0}")]
    UnknownPlatform(String),

    #[error("empty strategy_order override for platform: {0}")]
    EmptyStrategyOrder(String),

    #[error("duplicate strategy in order for platform: {0}")]
    DuplicateStrategy(String),

    #[error("re-hosting enabled but no endpoint configured")]
    RehostWithoutEndpoint,

    #[error("split target {target} must be below channel video limit {limit}")]
    SplitTargetTooLarge { target: String, limit: String },
}

pub fn validate(config: &Config) -> Result<(), ValidationError> {
    for (name, overrides) in &config.platforms {
        if name.parse::<PlatformId>().is_err() {
            return Err(ValidationError::UnknownPlatform(name.clone()));
        }
        if overrides.strategy_order.is_empty() {
            return Err(ValidationError::EmptyStrategyOrder(name.clone()));
        }
        let mut seen = overrides.strategy_order.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != overrides.strategy_order.len() {
            return Err(ValidationError::DuplicateStrategy(name.clone()));
        }
    }

    if config.rehost.enabled && config.rehost.endpoint.is_none() {
        return Err(ValidationError::RehostWithoutEndpoint);
    }

    if config.limits.split_target > config.limits.channel_video_limit {
        return Err(ValidationError::SplitTargetTooLarge {
            target: config.limits.split_target.to_string(),
            limit: config.limits.channel_video_limit.to_string(),
        });
    }

    Ok(())
}
