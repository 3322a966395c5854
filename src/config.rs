// src/config.rs

use crate::types::Timeframe;
use config::{Config, ConfigError, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub status_interval_ms: u64,
    // Фоллбэк: опрос рынка идёт только пока стрим лежит
    pub market_interval_ms: u64,
    pub chart_interval_ms: u64,
    pub analytics_window_days: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 3_000,
            market_interval_ms: 2_000,
            chart_interval_ms: 5_000,
            analytics_window_days: 30,
        }
    }
}

impl PollingConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn market_interval(&self) -> Duration {
        Duration::from_millis(self.market_interval_ms)
    }

    pub fn chart_interval(&self) -> Duration {
        Duration::from_millis(self.chart_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UiConfig {
    pub frame_interval_ms: u64,
    pub default_timeframe: Timeframe,
    pub default_volume: Decimal,
    pub volume_step: Decimal,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            default_timeframe: Timeframe::M5,
            default_volume: Decimal::new(1, 2),
            volume_step: Decimal::new(1, 2),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PopoutConfig {
    pub chart_surface: String,
    pub info_surface: String,
    /// Команда терминала, в котором запускается popout, например
    /// `["x-terminal-emulator", "-e"]`. Пусто = запуск без обёртки.
    pub launcher: Vec<String>,
}

impl Default for PopoutConfig {
    fn default() -> Self {
        Self {
            chart_surface: "desk://chart".to_string(),
            info_surface: "desk://info".to_string(),
            launcher: vec!["x-terminal-emulator".to_string(), "-e".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub stream_url: String,
    pub api_base: String,
    pub reconnect_delay_ms: u64,
    pub log_dir: String,
    pub polling: PollingConfig,
    pub ui: UiConfig,
    pub popout: PopoutConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream_url: "ws://127.0.0.1:8000/ws".to_string(),
            api_base: "http://127.0.0.1:8000/api".to_string(),
            reconnect_delay_ms: 3_000,
            log_dir: "logs".to_string(),
            polling: PollingConfig::default(),
            ui: UiConfig::default(),
            popout: PopoutConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Нулевой период роняет tokio interval, поэтому отсекаем его при загрузке.
    fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("polling.status_interval_ms", self.polling.status_interval_ms),
            ("polling.market_interval_ms", self.polling.market_interval_ms),
            ("polling.chart_interval_ms", self.polling.chart_interval_ms),
            ("ui.frame_interval_ms", self.ui.frame_interval_ms),
        ];
        match periods.iter().find(|(_, ms)| *ms == 0) {
            Some((name, _)) => Err(ConfigError::Message(format!(
                "{} must be greater than zero",
                name
            ))),
            None => Ok(()),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
