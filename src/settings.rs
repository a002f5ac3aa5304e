use chrono::{NaiveTime, TimeDelta};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BotError;
use crate::execution::{TraderConfig, TradingHours};
use crate::models::{CostModel, TradingMode};
use crate::strategy::StrategyParams;
use crate::Result;

/// Environment variable prefix, e.g. `HYBRIDBOT__STRATEGY__TAKE_PROFIT_PCT`
pub const ENV_PREFIX: &str = "HYBRIDBOT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueSettings {
    pub app_key: String,
    pub app_secret: String,
    /// Overrides the mode's default REST endpoint
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub tick_interval_ms: u64,
    /// "HH:MM", exchange-local
    pub session_open: String,
    pub session_close: String,
    pub market_index_ttl_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2000,
            session_open: "09:00".to_string(),
            session_close: "15:30".to_string(),
            market_index_ttl_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Overrides the mode's minimum spacing between venue calls
    pub interval_ms: Option<u64>,
}

/// Process configuration
///
/// Layered lowest to highest: `config/default.toml` (optional), the file
/// passed on the command line, then `HYBRIDBOT__*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: TradingMode,
    pub symbol: String,
    pub account: String,
    pub venue: VenueSettings,
    pub schedule: ScheduleSettings,
    pub rate_limit: RateLimitSettings,
    pub strategy: StrategyParams,
    pub costs: CostModel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            symbol: "000660".to_string(),
            account: String::new(),
            venue: VenueSettings::default(),
            schedule: ScheduleSettings::default(),
            rate_limit: RateLimitSettings::default(),
            strategy: StrategyParams::default(),
            costs: CostModel::default(),
        }
    }
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
        .map_err(|_| BotError::InvalidConfig(format!("{} must be HH:MM, got {:?}", field, value)))
}

impl Settings {
    /// Load and validate settings
    ///
    /// # Arguments
    /// * `path` - Optional config file; it must exist when given
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/default").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Values stay strings until deserialized, so "005930" keeps its zeros
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text (no file or environment layers)
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(BotError::InvalidConfig("symbol must not be empty".to_string()));
        }
        if self.schedule.tick_interval_ms == 0 {
            return Err(BotError::InvalidConfig(
                "schedule.tick_interval_ms must be positive".to_string(),
            ));
        }

        let hours = self.trading_hours()?;
        if hours.open >= hours.close {
            return Err(BotError::InvalidConfig(format!(
                "session_open ({}) must be before session_close ({})",
                hours.open, hours.close
            )));
        }

        for (name, rate) in [
            ("costs.commission_rate", self.costs.commission_rate),
            ("costs.tax_rate", self.costs.tax_rate),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(BotError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, rate
                )));
            }
        }

        self.strategy.validate()
    }

    /// Credentials are only needed when talking to the real venue
    pub fn require_credentials(&self) -> Result<()> {
        if self.venue.app_key.trim().is_empty() || self.venue.app_secret.trim().is_empty() {
            return Err(BotError::InvalidConfig(
                "venue.app_key and venue.app_secret are required".to_string(),
            ));
        }
        if self.account.trim().is_empty() {
            return Err(BotError::InvalidConfig("account is required".to_string()));
        }
        Ok(())
    }

    pub fn trading_hours(&self) -> Result<TradingHours> {
        Ok(TradingHours {
            open: parse_time("schedule.session_open", &self.schedule.session_open)?,
            close: parse_time("schedule.session_close", &self.schedule.session_close)?,
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.schedule.tick_interval_ms)
    }

    /// Minimum spacing between venue calls: the override, else the mode's default
    pub fn request_interval(&self) -> Duration {
        self.rate_limit
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.mode.min_request_interval())
    }

    pub fn trader_config(&self) -> Result<TraderConfig> {
        Ok(TraderConfig {
            symbol: self.symbol.trim().to_string(),
            account: self.account.clone(),
            indicators: self.strategy.indicator_config(),
            market_index_ttl: TimeDelta::seconds(self.schedule.market_index_ttl_secs as i64),
            hours: self.trading_hours()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyVariant;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.request_interval(), Duration::from_millis(3000));
        assert_eq!(settings.tick_interval(), Duration::from_millis(2000));
    }

    #[test]
    fn test_from_toml_layers_over_defaults() {
        let settings = Settings::from_toml(
            r#"
            mode = "live"
            symbol = "005930"
            account = "12345678-01"

            [strategy]
            variant = "extended"
            take_profit_pct = 0.8

            [rate_limit]
            interval_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(settings.mode, TradingMode::Live);
        assert_eq!(settings.symbol, "005930");
        assert_eq!(settings.strategy.variant, StrategyVariant::Extended);
        assert_eq!(settings.strategy.take_profit_pct, 0.8);
        assert_eq!(settings.strategy.stop_loss_pct, -0.4);
        assert_eq!(settings.costs, CostModel::default());
        assert_eq!(settings.request_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_mode_selects_request_interval() {
        let settings = Settings::from_toml(r#"mode = "live""#).unwrap();
        assert_eq!(settings.request_interval(), Duration::from_millis(300));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(Settings::from_toml(r#"symbol = " ""#).is_err());

        let err = Settings::from_toml(
            r#"
            [schedule]
            session_open = "16:00"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BotError::InvalidConfig(_)));

        assert!(Settings::from_toml(
            r#"
            [schedule]
            session_close = "half past three"
            "#
        )
        .is_err());

        assert!(Settings::from_toml(
            r#"
            [strategy]
            short_ma_period = 80
            "#
        )
        .is_err());
    }

    #[test]
    fn test_require_credentials() {
        let mut settings = Settings::default();
        assert!(settings.require_credentials().is_err());

        settings.venue.app_key = "key".to_string();
        settings.venue.app_secret = "secret".to_string();
        settings.account = "12345678-01".to_string();
        assert!(settings.require_credentials().is_ok());
    }

    #[test]
    fn test_env_overrides_keep_leading_zeros() {
        std::env::set_var("HYBRIDBOT__SYMBOL", "005930");
        std::env::set_var("HYBRIDBOT__ACCOUNT", "0012345601");
        std::env::set_var("HYBRIDBOT__SCHEDULE__TICK_INTERVAL_MS", "1500");
        std::env::set_var("HYBRIDBOT__STRATEGY__EXIT_BELOW_OPEN", "false");

        let settings = Settings::load(None);

        for key in [
            "HYBRIDBOT__SYMBOL",
            "HYBRIDBOT__ACCOUNT",
            "HYBRIDBOT__SCHEDULE__TICK_INTERVAL_MS",
            "HYBRIDBOT__STRATEGY__EXIT_BELOW_OPEN",
        ] {
            std::env::remove_var(key);
        }

        let settings = settings.unwrap();
        assert_eq!(settings.symbol, "005930");
        assert_eq!(settings.account, "0012345601");
        assert_eq!(settings.tick_interval(), Duration::from_millis(1500));
        assert!(!settings.strategy.exit_below_open);
    }

    #[test]
    fn test_trader_config() {
        let settings = Settings::from_toml(
            r#"
            symbol = " 005930 "
            [schedule]
            session_close = "15:20"
            market_index_ttl_secs = 30
            [strategy]
            short_ma_period = 5
            long_ma_period = 15
            "#,
        )
        .unwrap();
        let config = settings.trader_config().unwrap();

        assert_eq!(config.symbol, "005930");
        assert_eq!(config.market_index_ttl, TimeDelta::seconds(30));
        assert_eq!(config.hours.close, NaiveTime::from_hms_opt(15, 20, 0).unwrap());
        assert_eq!(config.indicators.short_ma_period, 5);
    }
}
