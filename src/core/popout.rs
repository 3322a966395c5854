// src/core/popout.rs
use crate::config::PopoutConfig;
use crate::error::PopoutError;
use crate::types::Timeframe;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Что показывает вторичная поверхность.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopoutTarget {
    Chart { symbol: String, timeframe: Timeframe },
    Info { symbol: String },
}

#[derive(Serialize)]
struct ChartQuery<'a> {
    symbol: &'a str,
    timeframe: &'a str,
}

#[derive(Serialize)]
struct InfoQuery<'a> {
    symbol: &'a str,
}

impl PopoutTarget {
    pub fn symbol(&self) -> &str {
        match self {
            PopoutTarget::Chart { symbol, .. } | PopoutTarget::Info { symbol } => symbol,
        }
    }

    /// `<chart>?symbol=S&timeframe=T` or `<info>?symbol=S`.
    pub fn locator(&self, config: &PopoutConfig) -> Result<String, PopoutError> {
        let (base, query) = match self {
            PopoutTarget::Chart { symbol, timeframe } => (
                &config.chart_surface,
                serde_urlencoded::to_string(ChartQuery {
                    symbol,
                    timeframe: timeframe.as_str(),
                }),
            ),
            PopoutTarget::Info { symbol } => (
                &config.info_surface,
                serde_urlencoded::to_string(InfoQuery { symbol }),
            ),
        };
        let query = query.map_err(|e| PopoutError::InvalidLocator(e.to_string()))?;
        Ok(format!("{}?{}", base, query))
    }

    pub fn parse(raw: &str, config: &PopoutConfig) -> Result<Self, PopoutError> {
        let invalid = || PopoutError::InvalidLocator(raw.to_string());
        let (base, _) = raw.split_once('?').ok_or_else(invalid)?;
        let url = Url::parse(raw).map_err(|_| invalid())?;

        let mut symbol = None;
        let mut timeframe = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "symbol" => symbol = Some(value.into_owned()),
                "timeframe" => timeframe = Timeframe::parse(&value),
                _ => {}
            }
        }
        let symbol = symbol.filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        if base == config.chart_surface {
            let timeframe = timeframe.ok_or_else(invalid)?;
            Ok(PopoutTarget::Chart { symbol, timeframe })
        } else if base == config.info_surface {
            Ok(PopoutTarget::Info { symbol })
        } else {
            Err(invalid())
        }
    }
}

/// Capability to open a secondary surface. Failure is reported synchronously.
pub trait SurfaceFactory: Send + Sync {
    fn open(&self, locator: &str) -> Result<(), PopoutError>;
}

/// Запускает этот же бинарник с локатором в новом окне терминала.
pub struct ProcessSurfaceFactory {
    launcher: Vec<String>,
    program: PathBuf,
}

impl ProcessSurfaceFactory {
    pub fn new(launcher: Vec<String>) -> Result<Self, PopoutError> {
        let program = std::env::current_exe().map_err(|e| PopoutError::Blocked(e.to_string()))?;
        Ok(Self { launcher, program })
    }
}

impl SurfaceFactory for ProcessSurfaceFactory {
    fn open(&self, locator: &str) -> Result<(), PopoutError> {
        let mut command = match self.launcher.split_first() {
            Some((terminal, args)) => {
                let mut command = tokio::process::Command::new(terminal);
                command.args(args).arg(&self.program);
                command
            }
            None => tokio::process::Command::new(&self.program),
        };
        command
            .arg(locator)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        let child = command
            .spawn()
            .map_err(|e| PopoutError::Blocked(e.to_string()))?;
        info!("Popout process started (pid {:?}): {}", child.id(), locator);
        Ok(())
    }
}

pub struct PopoutBridge {
    factory: Box<dyn SurfaceFactory>,
    config: PopoutConfig,
    opened: Vec<(Uuid, PopoutTarget)>,
}

impl PopoutBridge {
    pub fn new(factory: Box<dyn SurfaceFactory>, config: PopoutConfig) -> Self {
        Self {
            factory,
            config,
            opened: Vec::new(),
        }
    }

    pub fn open(&mut self, target: PopoutTarget) -> Result<Uuid, PopoutError> {
        let locator = target.locator(&self.config)?;
        if let Err(e) = self.factory.open(&locator) {
            warn!("Popout blocked for {}: {}", locator, e);
            return Err(e);
        }
        let id = Uuid::new_v4();
        self.opened.push((id, target));
        Ok(id)
    }

    pub fn open_chart(&mut self, symbol: &str, timeframe: Timeframe) -> Result<Uuid, PopoutError> {
        self.open(PopoutTarget::Chart {
            symbol: symbol.to_string(),
            timeframe,
        })
    }

    pub fn open_info(&mut self, symbol: &str) -> Result<Uuid, PopoutError> {
        self.open(PopoutTarget::Info {
            symbol: symbol.to_string(),
        })
    }

    pub fn opened(&self) -> &[(Uuid, PopoutTarget)] {
        &self.opened
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingFactory {
        locators: Arc<Mutex<Vec<String>>>,
    }

    impl SurfaceFactory for RecordingFactory {
        fn open(&self, locator: &str) -> Result<(), PopoutError> {
            self.locators.lock().unwrap().push(locator.to_string());
            Ok(())
        }
    }

    struct BlockedFactory;

    impl SurfaceFactory for BlockedFactory {
        fn open(&self, _locator: &str) -> Result<(), PopoutError> {
            Err(PopoutError::Blocked("no display".to_string()))
        }
    }

    #[test]
    fn builds_locators_for_both_surfaces() {
        let factory = RecordingFactory::default();
        let mut bridge = PopoutBridge::new(Box::new(factory.clone()), PopoutConfig::default());

        bridge.open_chart("EURUSD", Timeframe::H1).unwrap();
        bridge.open_info("XAUUSD").unwrap();

        assert_eq!(
            *factory.locators.lock().unwrap(),
            vec![
                "desk://chart?symbol=EURUSD&timeframe=H1".to_string(),
                "desk://info?symbol=XAUUSD".to_string()
            ]
        );
        assert_eq!(bridge.opened().len(), 2);
    }

    #[test]
    fn blocked_open_is_reported_synchronously() {
        let mut bridge = PopoutBridge::new(Box::new(BlockedFactory), PopoutConfig::default());
        assert_eq!(
            bridge.open_info("EURUSD"),
            Err(PopoutError::Blocked("no display".to_string()))
        );
        assert!(bridge.opened().is_empty());
    }

    #[test]
    fn parses_locators_back() {
        let config = PopoutConfig::default();
        let chart = PopoutTarget::Chart {
            symbol: "US30.cash".to_string(),
            timeframe: Timeframe::M15,
        };
        let locator = chart.locator(&config).unwrap();
        assert_eq!(PopoutTarget::parse(&locator, &config), Ok(chart));

        assert_eq!(
            PopoutTarget::parse("desk://info?symbol=BTCUSD", &config),
            Ok(PopoutTarget::Info {
                symbol: "BTCUSD".to_string()
            })
        );
    }

    #[test]
    fn rejects_unknown_or_incomplete_locators() {
        let config = PopoutConfig::default();
        for raw in [
            "desk://chart?symbol=EURUSD",
            "desk://info?symbol=",
            "desk://settings?symbol=EURUSD",
            "desk://info",
            "not a locator",
        ] {
            assert!(
                matches!(
                    PopoutTarget::parse(raw, &config),
                    Err(PopoutError::InvalidLocator(_))
                ),
                "{}",
                raw
            );
        }
    }
}
