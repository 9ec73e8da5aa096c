//! HTTP/Icecast stream transport
//!
//! Each `start()` spawns one transport task on the current tokio runtime. The
//! task connects, reports `Buffering`, publishes any ICY station headers, and
//! reports `Started` once the first audio chunk arrives. Chunks are forwarded to
//! the [`AudioSink`] until the session is stopped or the remote end fails.

use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use reqwest::Url;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::sink::AudioSink;
use super::{EngineEvent, EngineEventSink, PlaybackEngine, Position, SessionId, StreamMetadata};
use crate::config::StreamConfig;
use crate::error::EngineError;
use crate::source::StreamSource;

/// State shared between the engine and its transport task
#[derive(Default)]
struct SessionShared {
    paused: AtomicBool,
    /// Set when output (re)started, cleared on pause
    playing_since: Mutex<Option<Instant>>,
    bytes_received: AtomicU64,
}

struct ActiveSession {
    id: SessionId,
    shared: Arc<SessionShared>,
    task: JoinHandle<()>,
}

/// Everything a transport task needs, moved into the task
struct TransportTask {
    id: SessionId,
    url: Url,
    client: reqwest::Client,
    sink: Arc<dyn AudioSink>,
    events: EngineEventSink,
    shared: Arc<SessionShared>,
    read_timeout: Duration,
}

/// Playback engine for HTTP(S) radio streams
pub struct HttpStreamEngine {
    client: reqwest::Client,
    read_timeout: Duration,
    source: Option<(StreamSource, Url)>,
    sink: Arc<dyn AudioSink>,
    events: EngineEventSink,
    session: Option<ActiveSession>,
    next_session: u64,
    released: bool,
}

impl HttpStreamEngine {
    pub fn new(config: &StreamConfig, sink: Arc<dyn AudioSink>) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EngineError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            source: None,
            sink,
            events: EngineEventSink::detached(),
            session: None,
            next_session: 0,
            released: false,
        })
    }

    /// Bytes received by the current session
    pub fn bytes_received(&self) -> u64 {
        self.session
            .as_ref()
            .map_or(0, |s| s.shared.bytes_received.load(Ordering::Relaxed))
    }

    pub fn source(&self) -> Option<&StreamSource> {
        self.source.as_ref().map(|(source, _)| source)
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.released {
            Err(EngineError::EngineReleased)
        } else {
            Ok(())
        }
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
            debug!(
                "Stopped {} after {} bytes",
                session.id,
                session.shared.bytes_received.load(Ordering::Relaxed)
            );
        }
    }
}

impl PlaybackEngine for HttpStreamEngine {
    fn bind_events(&mut self, events: EngineEventSink) {
        self.events = events;
    }

    fn configure(&mut self, source: StreamSource) -> Result<(), EngineError> {
        self.ensure_live()?;
        let url = source.validate()?;

        if self.source.as_ref().map_or(false, |(current, _)| *current == source) {
            return Ok(());
        }

        self.teardown();
        info!("Stream source set to {}", source);
        self.source = Some((source, url));
        Ok(())
    }

    fn start(&mut self) -> Result<SessionId, EngineError> {
        self.ensure_live()?;

        // A finished task means the transport already failed or ended
        if self.session.as_ref().map_or(false, |s| s.task.is_finished()) {
            self.session = None;
        }

        if let Some(session) = &self.session {
            if session.shared.paused.swap(false, Ordering::SeqCst) {
                *session.shared.playing_since.lock() = Some(Instant::now());
                debug!("Resumed {}", session.id);
                self.events.emit(session.id, EngineEvent::Started);
            }
            return Ok(session.id);
        }

        let url = match &self.source {
            Some((_, url)) => url.clone(),
            None => return Err(EngineError::InvalidSource("no stream configured".to_string())),
        };

        let runtime = Handle::try_current()
            .map_err(|e| EngineError::Transport(format!("no async runtime: {}", e)))?;

        self.next_session += 1;
        let id = SessionId(self.next_session);
        let shared = Arc::new(SessionShared::default());

        let task = runtime.spawn(run_session(TransportTask {
            id,
            url,
            client: self.client.clone(),
            sink: self.sink.clone(),
            events: self.events.clone(),
            shared: shared.clone(),
            read_timeout: self.read_timeout,
        }));

        debug!("Spawned transport for {}", id);
        self.session = Some(ActiveSession { id, shared, task });
        Ok(id)
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.ensure_live()?;

        if let Some(session) = &self.session {
            let mut since = session.shared.playing_since.lock();
            if since.is_some() {
                *since = None;
                session.shared.paused.store(true, Ordering::SeqCst);
                debug!("Paused {}", session.id);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.ensure_live()?;
        self.teardown();
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.teardown();
        self.released = true;
        info!("Stream engine released");
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.ensure_live()?;
        self.sink.set_volume(volume.clamp(0.0, 1.0));
        Ok(())
    }

    fn position(&self) -> Result<Position, EngineError> {
        self.ensure_live()?;

        let since = self
            .session
            .as_ref()
            .and_then(|s| *s.shared.playing_since.lock());

        Ok(match since {
            Some(since) => Position::Known(since.elapsed()),
            None => Position::Unknown,
        })
    }

    fn duration(&self) -> Result<Position, EngineError> {
        self.ensure_live()?;
        // Live radio has no end
        Ok(Position::Unknown)
    }
}

impl Drop for HttpStreamEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_session(task: TransportTask) {
    let TransportTask {
        id,
        url,
        client,
        sink,
        events,
        shared,
        read_timeout,
    } = task;

    events.emit(id, EngineEvent::Buffering);
    info!("Connecting to {} ({})", url, id);

    let response = match client.get(url.clone()).header("Icy-MetaData", "0").send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Connection to {} failed: {}", url, e);
            events.emit(id, EngineEvent::TransportError(e.to_string()));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!("Stream {} answered {}", url, status);
        events.emit(id, EngineEvent::TransportError(format!("HTTP {}", status)));
        return;
    }

    let metadata = icy_metadata(response.headers());
    if !metadata.is_empty() {
        events.emit(id, EngineEvent::Metadata(metadata));
    }

    let mut body = response.bytes_stream();
    let mut started = false;

    loop {
        let next = match tokio::time::timeout(read_timeout, body.next()).await {
            Ok(next) => next,
            Err(_) => {
                warn!("Stream {} stalled for {:?}", id, read_timeout);
                events.emit(
                    id,
                    EngineEvent::TransportError(format!("no data for {:?}", read_timeout)),
                );
                return;
            }
        };

        match next {
            Some(Ok(chunk)) => {
                shared
                    .bytes_received
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);

                if !started {
                    started = true;
                    *shared.playing_since.lock() = Some(Instant::now());
                    events.emit(id, EngineEvent::Started);
                }

                // Live stream: while paused the connection is kept but audio is discarded
                if !shared.paused.load(Ordering::Relaxed) {
                    sink.write(chunk);
                }
            }
            Some(Err(e)) => {
                warn!("Stream {} read error: {}", id, e);
                events.emit(id, EngineEvent::TransportError(e.to_string()));
                return;
            }
            None => {
                info!("Stream {} closed by server", id);
                events.emit(id, EngineEvent::Stopped);
                return;
            }
        }
    }
}

/// Extract Icecast/Shoutcast station headers
fn icy_metadata(headers: &HeaderMap) -> StreamMetadata {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    StreamMetadata {
        name: text("icy-name"),
        genre: text("icy-genre"),
        description: text("icy-description"),
        // Some servers send "128,128"
        bitrate_kbps: text("icy-br")
            .and_then(|br| br.split(',').next().and_then(|v| v.trim().parse().ok())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NullSink, TransportEvent};
    use reqwest::header::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn engine() -> HttpStreamEngine {
        let config = StreamConfig {
            connect_timeout_ms: 500,
            read_timeout_ms: 2_000,
            ..StreamConfig::default()
        };
        HttpStreamEngine::new(&config, Arc::new(NullSink)).unwrap()
    }

    fn capture(engine: &mut HttpStreamEngine) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        engine.bind_events(EngineEventSink::new(move |event| {
            let _ = tx.send(event);
        }));
        rx
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for engine event")
            .expect("event channel closed")
    }

    #[test]
    fn test_configure_rejects_invalid_source() {
        let mut engine = engine();
        let err = engine.configure(StreamSource::new("radio://nope")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSource(_)));
        assert!(engine.source().is_none());
    }

    #[test]
    fn test_start_without_source() {
        let mut engine = engine();
        assert!(matches!(engine.start(), Err(EngineError::InvalidSource(_))));
    }

    #[test]
    fn test_released_engine_rejects_calls() {
        let mut engine = engine();
        engine.configure(StreamSource::new("http://localhost/stream")).unwrap();

        engine.release();
        engine.release();

        assert_eq!(engine.start(), Err(EngineError::EngineReleased));
        assert_eq!(engine.pause(), Err(EngineError::EngineReleased));
        assert_eq!(engine.stop(), Err(EngineError::EngineReleased));
        assert_eq!(engine.position(), Err(EngineError::EngineReleased));
        assert_eq!(
            engine.configure(StreamSource::new("http://localhost/other")),
            Err(EngineError::EngineReleased)
        );
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut engine = engine();
        assert!(engine.stop().is_ok());
        assert!(engine.stop().is_ok());
        assert_eq!(engine.position(), Ok(Position::Unknown));
    }

    #[test]
    fn test_icy_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert("icy-name", HeaderValue::from_static("Capital Glasgow"));
        headers.insert("icy-genre", HeaderValue::from_static(" Pop "));
        headers.insert("icy-br", HeaderValue::from_static("128,128"));

        let metadata = icy_metadata(&headers);
        assert_eq!(metadata.name.as_deref(), Some("Capital Glasgow"));
        assert_eq!(metadata.genre.as_deref(), Some("Pop"));
        assert_eq!(metadata.description, None);
        assert_eq!(metadata.bitrate_kbps, Some(128));

        assert!(icy_metadata(&HeaderMap::new()).is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_reports_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut engine = engine();
        let mut rx = capture(&mut engine);
        engine
            .configure(StreamSource::new(format!("http://{}/live", addr)))
            .unwrap();

        let id = engine.start().unwrap();

        let first = next_event(&mut rx).await;
        assert_eq!(first, TransportEvent { session: id, event: EngineEvent::Buffering });

        let second = next_event(&mut rx).await;
        assert_eq!(second.session, id);
        assert!(matches!(second.event, EngineEvent::TransportError(_)));
    }

    #[tokio::test]
    async fn test_stream_lifecycle_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nicy-name: Test FM\r\nicy-br: 64\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for _ in 0..20 {
                if socket.write_all(&[0xFFu8; 512]).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let mut engine = engine();
        let mut rx = capture(&mut engine);
        engine
            .configure(StreamSource::new(format!("http://{}/live", addr)))
            .unwrap();

        let id = engine.start().unwrap();
        assert_eq!(next_event(&mut rx).await.event, EngineEvent::Buffering);

        match next_event(&mut rx).await.event {
            EngineEvent::Metadata(metadata) => {
                assert_eq!(metadata.name.as_deref(), Some("Test FM"));
                assert_eq!(metadata.bitrate_kbps, Some(64));
            }
            other => panic!("expected metadata, got {:?}", other),
        }

        assert_eq!(next_event(&mut rx).await.event, EngineEvent::Started);
        assert!(matches!(engine.position(), Ok(Position::Known(_))));

        engine.pause().unwrap();
        assert_eq!(engine.position(), Ok(Position::Unknown));

        // Resuming a paused session reuses it
        assert_eq!(engine.start().unwrap(), id);
        assert_eq!(
            next_event(&mut rx).await,
            TransportEvent { session: id, event: EngineEvent::Started }
        );

        engine.stop().unwrap();
        assert_eq!(engine.position(), Ok(Position::Unknown));
        assert_eq!(engine.bytes_received(), 0);

        server.abort();
    }
}
