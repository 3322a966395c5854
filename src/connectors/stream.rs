// src/connectors/stream.rs
use crate::connectors::messages::{parse_stream_message, StreamMessage};
use crate::connectors::traits::{Frame, FrameSource, StreamConnector};
use crate::core::session::SessionEvent;
use crate::error::StreamError;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

/// Что стрим сообщает сессии.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Disconnected,
    Message(StreamMessage),
}

/// Fixed-delay reconnect: no growth, no jitter, no attempt cap.
#[derive(Debug)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempt_count: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.delay
    }

    /// Сбрасывается после успешного подключения.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

enum PumpEnd {
    Closed,
    Cancelled,
    SessionGone,
}

/// Владеет жизненным циклом сокета. Весь цикл ждёт переподключения
/// ровно в одном месте, поэтому отложенный реконнект всегда один.
pub struct ConnectionManager<C> {
    connector: C,
    url: String,
    policy: ReconnectPolicy,
    events: mpsc::Sender<SessionEvent>,
}

impl<C: StreamConnector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        url: impl Into<String>,
        reconnect_delay: Duration,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            connector,
            url: url.into(),
            policy: ReconnectPolicy::new(reconnect_delay),
            events,
        }
    }

    async fn emit(&self, event: StreamEvent) -> bool {
        self.events.send(SessionEvent::Stream(event)).await.is_ok()
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Starting stream task for: {}", self.url);

        loop {
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connector.connect(&self.url) => result,
            };
            match connected {
                Ok(mut source) => {
                    info!("Stream connected: {}", self.url);
                    self.policy.reset();
                    if !self.emit(StreamEvent::Connected).await {
                        break;
                    }
                    match self.pump(source.as_mut(), &cancel).await {
                        PumpEnd::Closed => {}
                        PumpEnd::Cancelled | PumpEnd::SessionGone => break,
                    }
                }
                Err(e) => error!("Failed to connect stream {}: {}", self.url, e),
            }

            if !self.emit(StreamEvent::Disconnected).await {
                break;
            }

            let delay = self.policy.next_delay();
            info!(
                "Reconnect attempt #{} in {:?}",
                self.policy.attempt_count(),
                delay
            );
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Stream task finished for {}", self.url);
    }

    async fn pump(&self, source: &mut dyn FrameSource, cancel: &CancellationToken) -> PumpEnd {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return PumpEnd::Cancelled,
                frame = source.next_frame() => frame,
            };

            match frame {
                None => {
                    warn!("Stream closed: {}", self.url);
                    return PumpEnd::Closed;
                }
                // Ошибка сокета не планирует свой реконнект: идём в общий путь закрытия.
                Some(Err(e)) => {
                    error!("Stream error for {}: {}", self.url, e);
                    return PumpEnd::Closed;
                }
                Some(Ok(Frame::Ignored)) => {}
                Some(Ok(Frame::Text(text))) => match parse_stream_message(&text) {
                    Ok(message) => {
                        if !self.emit(StreamEvent::Message(message)).await {
                            return PumpEnd::SessionGone;
                        }
                    }
                    Err(e) => warn!(
                        "Dropping malformed stream message ({} bytes): {}",
                        text.len(),
                        e
                    ),
                },
            }
        }
    }
}

pub struct WsConnector;

struct WsFrames {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameSource for WsFrames {
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
        match self.inner.next().await? {
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
            Ok(Message::Close(_)) => None,
            Ok(_) => Some(Ok(Frame::Ignored)),
            Err(e) => Some(Err(e.into())),
        }
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameSource>, StreamError> {
        let url = Url::parse(url)?;
        let (ws_stream, _) = connect_async(url).await?;
        Ok(Box::new(WsFrames { inner: ws_stream }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    type Script = Result<Vec<Frame>, ()>;

    struct ScriptedFrames(VecDeque<Frame>);

    #[async_trait]
    impl FrameSource for ScriptedFrames {
        async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>> {
            self.0.pop_front().map(Ok)
        }
    }

    /// Каждое подключение берёт следующий сценарий; когда они кончились,
    /// соединение открывается и сразу закрывается.
    struct FakeConnector {
        scripts: Mutex<VecDeque<Script>>,
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    impl FakeConnector {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                attempts: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl StreamConnector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn FrameSource>, StreamError> {
            self.attempts.lock().unwrap().push(Instant::now());
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Ok(vec![]));
            match script {
                Ok(frames) => Ok(Box::new(ScriptedFrames(frames.into()))),
                Err(()) => Err(StreamError::Url(url::ParseError::EmptyHost)),
            }
        }
    }

    fn status_frame() -> Frame {
        Frame::Text(
            r#"{"type": "STATUS", "data": {"balance": 1000, "equity": 1000, "connected": true}}"#
                .to_string(),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Ok(SessionEvent::Stream(event)) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn every_close_schedules_exactly_one_delayed_reconnect() {
        let connector = FakeConnector::new(vec![]);
        let attempts = connector.attempts.clone();
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let manager = ConnectionManager::new(connector, "ws://test", Duration::from_secs(3), tx);
        let handle = tokio::spawn(manager.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(12_500)).await;
        cancel.cancel();
        handle.await.unwrap();

        let times = attempts.lock().unwrap().clone();
        // t = 0, 3, 6, 9, 12
        assert_eq!(times.len(), 5);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3));
            assert!(pair[1] - pair[0] < Duration::from_secs(4));
        }

        let events = drain(&mut rx);
        let closes = events
            .iter()
            .filter(|e| **e == StreamEvent::Disconnected)
            .count();
        let opens = events
            .iter()
            .filter(|e| **e == StreamEvent::Connected)
            .count();
        assert_eq!(closes, 5);
        assert_eq!(opens, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_is_retried_on_the_same_fixed_delay() {
        let connector = FakeConnector::new(vec![Err(()), Err(()), Ok(vec![status_frame()])]);
        let attempts = connector.attempts.clone();
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let manager = ConnectionManager::new(connector, "ws://test", Duration::from_secs(3), tx);
        let handle = tokio::spawn(manager.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(6_100)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(attempts.lock().unwrap().len(), 3);
        let events = drain(&mut rx);
        assert_eq!(
            events[..3],
            [
                StreamEvent::Disconnected,
                StreamEvent::Disconnected,
                StreamEvent::Connected
            ]
        );
        assert!(matches!(
            events[3],
            StreamEvent::Message(StreamMessage::Status(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_messages_are_dropped_without_closing() {
        let connector = FakeConnector::new(vec![Ok(vec![
            Frame::Text("{broken".to_string()),
            Frame::Ignored,
            Frame::Text(r#"{"type": "NOPE", "data": 1}"#.to_string()),
            status_frame(),
        ])]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let manager = ConnectionManager::new(connector, "ws://test", Duration::from_secs(3), tx);
        let handle = tokio::spawn(manager.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::Connected);
        assert!(matches!(
            events[1],
            StreamEvent::Message(StreamMessage::Status(_))
        ));
        assert_eq!(events[2], StreamEvent::Disconnected);
    }

    #[test]
    fn policy_never_grows() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(3));
        for _ in 0..10 {
            assert_eq!(policy.next_delay(), Duration::from_secs(3));
        }
        assert_eq!(policy.attempt_count(), 10);
        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
    }
}
