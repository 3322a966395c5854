// src/core/scheduler.rs
use crate::config::PollingConfig;
use crate::core::session::SessionEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollConcern {
    Status,
    Market,
    Chart,
}

/// Периодический таймер. Останавливается при drop.
struct PeriodicTask {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

impl PeriodicTask {
    fn spawn(
        concern: PollConcern,
        epoch: u64,
        period: Duration,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            // Первый тик через период: немедленный pull делает сама сессия
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if events.send(SessionEvent::PollDue { concern, epoch }).await.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("{:?} poll timer stopped (epoch {})", concern, epoch);
        });
        Self {
            cancel,
            _handle: handle,
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Owns every periodic pull timer of a session plus the epochs used to
/// discard results that navigation has made irrelevant.
pub struct PollScheduler {
    config: PollingConfig,
    events: mpsc::Sender<SessionEvent>,
    status: Option<PeriodicTask>,
    market: Option<PeriodicTask>,
    chart: Option<PeriodicTask>,
    chart_epoch: u64,
    analytics_epoch: u64,
}

impl PollScheduler {
    pub fn new(config: PollingConfig, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            config,
            events,
            status: None,
            market: None,
            chart: None,
            chart_epoch: 0,
            analytics_epoch: 0,
        }
    }

    pub fn analytics_window_days(&self) -> u32 {
        self.config.analytics_window_days
    }

    fn spawn(&self, concern: PollConcern, epoch: u64, period: Duration) -> PeriodicTask {
        PeriodicTask::spawn(concern, epoch, period, self.events.clone())
    }

    /// Статус опрашивается всегда, независимо от стрима.
    pub fn start_status(&mut self) {
        self.status = None;
        self.status = Some(self.spawn(PollConcern::Status, 0, self.config.status_interval()));
    }

    /// Market snapshot polling runs only while the stream is down.
    pub fn set_market_fallback(&mut self, active: bool) {
        match (active, self.market.is_some()) {
            (true, false) => {
                self.market = Some(self.spawn(PollConcern::Market, 0, self.config.market_interval()));
                debug!("market fallback polling armed");
            }
            (false, true) => {
                self.market = None;
                debug!("market fallback polling stopped");
            }
            _ => {}
        }
    }

    /// Re-arms the chart re-pull for a new (symbol, timeframe). The previous
    /// timer is cancelled first and its epoch invalidated.
    pub fn arm_chart(&mut self) -> u64 {
        self.chart = None;
        self.chart_epoch += 1;
        self.chart = Some(self.spawn(
            PollConcern::Chart,
            self.chart_epoch,
            self.config.chart_interval(),
        ));
        self.chart_epoch
    }

    pub fn cancel_chart(&mut self) {
        self.chart = None;
        self.chart_epoch += 1;
    }

    pub fn is_current_chart(&self, epoch: u64) -> bool {
        self.chart.is_some() && epoch == self.chart_epoch
    }

    pub fn begin_analytics(&mut self) -> u64 {
        self.analytics_epoch += 1;
        self.analytics_epoch
    }

    pub fn cancel_analytics(&mut self) {
        self.analytics_epoch += 1;
    }

    pub fn is_current_analytics(&self, epoch: u64) -> bool {
        epoch == self.analytics_epoch
    }

    pub fn shutdown(&mut self) {
        self.status = None;
        self.market = None;
        self.cancel_chart();
        self.cancel_analytics();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PollingConfig {
        PollingConfig::default()
    }

    async fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<(PollConcern, u64)> {
        let mut due = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::PollDue { concern, epoch } = event {
                due.push((concern, epoch));
            }
        }
        due
    }

    #[tokio::test(start_paused = true)]
    async fn cadences_follow_configuration() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut scheduler = PollScheduler::new(config(), tx);
        scheduler.start_status();
        scheduler.set_market_fallback(true);
        let epoch = scheduler.arm_chart();

        time::sleep(Duration::from_millis(10_500)).await;
        let due = drain(&mut rx).await;

        let count = |c: PollConcern| due.iter().filter(|(k, _)| *k == c).count();
        assert_eq!(count(PollConcern::Status), 3);
        assert_eq!(count(PollConcern::Market), 5);
        assert_eq!(count(PollConcern::Chart), 2);
        assert!(due
            .iter()
            .filter(|(k, _)| *k == PollConcern::Chart)
            .all(|(_, e)| *e == epoch));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_chart_stops_firing_and_invalidates_epoch() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut scheduler = PollScheduler::new(config(), tx);
        let epoch = scheduler.arm_chart();
        assert!(scheduler.is_current_chart(epoch));

        time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(drain(&mut rx).await.len(), 1);

        scheduler.cancel_chart();
        assert!(!scheduler.is_current_chart(epoch));
        time::sleep(Duration::from_secs(30)).await;
        assert!(drain(&mut rx).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_keeps_a_single_chart_timer() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut scheduler = PollScheduler::new(config(), tx);
        let first = scheduler.arm_chart();
        time::sleep(Duration::from_secs(2)).await;
        let second = scheduler.arm_chart();
        assert_ne!(first, second);

        time::sleep(Duration::from_millis(10_500)).await;
        let due = drain(&mut rx).await;
        assert_eq!(due, vec![(PollConcern::Chart, second); 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn market_fallback_toggles() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut scheduler = PollScheduler::new(config(), tx);
        scheduler.set_market_fallback(true);
        scheduler.set_market_fallback(true);
        time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(drain(&mut rx).await.len(), 2);

        scheduler.set_market_fallback(false);
        time::sleep(Duration::from_secs(10)).await;
        assert!(drain(&mut rx).await.is_empty());
    }

    #[test]
    fn analytics_epoch_discards_older_pulls() {
        let (tx, _rx) = mpsc::channel(1);
        let mut scheduler = PollScheduler::new(config(), tx);
        let first = scheduler.begin_analytics();
        let second = scheduler.begin_analytics();
        assert!(!scheduler.is_current_analytics(first));
        assert!(scheduler.is_current_analytics(second));
        scheduler.cancel_analytics();
        assert!(!scheduler.is_current_analytics(second));
    }
}
