//! Engine configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration for the coordinators and the heartbeat loop.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::adjudicator::DrawRuleConfig;

/// How a double forfeit is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoubleForfeitScoring {
    /// No points to either participant; the match is left out of both
    /// win/loss tallies.
    ZeroZero,
    /// No points to either participant; both tallies record a loss.
    SharedLoss,
}

/// Complete engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Heartbeat scan interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Lead time before a scheduled start at which the "starting soon"
    /// warning goes out, in minutes.
    pub warning_lead_minutes: i64,
    /// Window after the scheduled start during which an absent
    /// participant may still join, in minutes.
    pub grace_period_minutes: i64,
    /// Play window granted to each freshly generated round, in hours.
    /// Matches not finished by the window's end are forfeited.
    pub round_play_window_hours: i64,
    /// Two confirmed schedules for the same participant closer together
    /// than this count as a scheduling conflict, in minutes.
    pub conflict_window_minutes: i64,
    /// Double-forfeit scoring policy.
    pub double_forfeit: DoubleForfeitScoring,
    /// Draw-rule parameters handed to the adjudicator.
    pub draw_rules: DrawRuleConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 60,
            warning_lead_minutes: 5,
            grace_period_minutes: 10,
            round_play_window_hours: 72,
            conflict_window_minutes: 90,
            double_forfeit: DoubleForfeitScoring::ZeroZero,
            draw_rules: DrawRuleConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults above for anything unset.
    ///
    /// Recognized variables:
    /// - `CHAMPIONSHIP_HEARTBEAT_INTERVAL_SECS`
    /// - `CHAMPIONSHIP_WARNING_LEAD_MINUTES`
    /// - `CHAMPIONSHIP_GRACE_PERIOD_MINUTES`
    /// - `CHAMPIONSHIP_ROUND_PLAY_WINDOW_HOURS`
    /// - `CHAMPIONSHIP_CONFLICT_WINDOW_MINUTES`
    /// - `CHAMPIONSHIP_DOUBLE_FORFEIT` (`zero_zero` | `shared_loss`)
    /// - `CHAMPIONSHIP_QUEEN_SHUFFLE_THRESHOLD` (half-moves, 0 disables)
    pub fn from_env() -> Result<Self, ConfigError> {
        let double_forfeit = match std::env::var("CHAMPIONSHIP_DOUBLE_FORFEIT") {
            Ok(raw) => match raw.to_lowercase().as_str() {
                "zero_zero" => DoubleForfeitScoring::ZeroZero,
                "shared_loss" => DoubleForfeitScoring::SharedLoss,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "CHAMPIONSHIP_DOUBLE_FORFEIT".to_string(),
                        reason: format!("unknown policy '{raw}'"),
                    });
                }
            },
            Err(_) => DoubleForfeitScoring::ZeroZero,
        };

        let queen_shuffle = parse_env_or("CHAMPIONSHIP_QUEEN_SHUFFLE_THRESHOLD", 0u32);

        let config = Self {
            heartbeat_interval_secs: parse_env_or("CHAMPIONSHIP_HEARTBEAT_INTERVAL_SECS", 60),
            warning_lead_minutes: parse_env_or("CHAMPIONSHIP_WARNING_LEAD_MINUTES", 5),
            grace_period_minutes: parse_env_or("CHAMPIONSHIP_GRACE_PERIOD_MINUTES", 10),
            round_play_window_hours: parse_env_or("CHAMPIONSHIP_ROUND_PLAY_WINDOW_HOURS", 72),
            conflict_window_minutes: parse_env_or("CHAMPIONSHIP_CONFLICT_WINDOW_MINUTES", 90),
            double_forfeit,
            draw_rules: DrawRuleConfig {
                queen_shuffle_threshold: (queen_shuffle > 0).then_some(queen_shuffle),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "CHAMPIONSHIP_HEARTBEAT_INTERVAL_SECS".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.warning_lead_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "CHAMPIONSHIP_WARNING_LEAD_MINUTES".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.grace_period_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "CHAMPIONSHIP_GRACE_PERIOD_MINUTES".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.round_play_window_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "CHAMPIONSHIP_ROUND_PLAY_WINDOW_HOURS".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.conflict_window_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "CHAMPIONSHIP_CONFLICT_WINDOW_MINUTES".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if let Some(threshold) = self.draw_rules.queen_shuffle_threshold
            && threshold < 2
        {
            return Err(ConfigError::Invalid {
                var: "CHAMPIONSHIP_QUEEN_SHUFFLE_THRESHOLD".to_string(),
                reason: "must be at least 2 half-moves when enabled".to_string(),
            });
        }
        Ok(())
    }

    pub fn warning_lead(&self) -> Duration {
        Duration::minutes(self.warning_lead_minutes)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::minutes(self.grace_period_minutes)
    }

    pub fn round_play_window(&self) -> Duration {
        Duration::hours(self.round_play_window_hours)
    }

    pub fn conflict_window(&self) -> Duration {
        Duration::minutes(self.conflict_window_minutes)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback.
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_grace_period() {
        let config = EngineConfig {
            grace_period_minutes: 0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_degenerate_queen_shuffle_threshold() {
        let config = EngineConfig {
            draw_rules: DrawRuleConfig {
                queen_shuffle_threshold: Some(1),
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_helpers() {
        let config = EngineConfig::default();
        assert_eq!(config.grace_period(), Duration::minutes(10));
        assert_eq!(config.warning_lead(), Duration::minutes(5));
        assert_eq!(config.round_play_window(), Duration::hours(72));
    }
}
