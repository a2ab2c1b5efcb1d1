use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::api::JobApi;
use crate::launch::{ClientConfig, NotifierKind};
use crate::protocol::{decode_notification, Facility, NotificationEvent, PollStatus, SseFramer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierUpdate {
    Event(NotificationEvent),
    /// Transport failure or poll timeout; the notifier has stopped.
    Failed(String),
    /// The worker exited without anything further to report.
    Closed,
}

/// Delivers notification events for one session until a terminal event,
/// a failure, or a shutdown signal.
pub trait ProgressNotifier: Send + Sync {
    fn deliver(
        &self,
        session_id: &str,
        shutdown: &Receiver<()>,
        emit: &mut dyn FnMut(NotifierUpdate),
    );
}

pub fn strategy_for(config: &ClientConfig, api: Arc<dyn JobApi>) -> Arc<dyn ProgressNotifier> {
    match config.notifier {
        NotifierKind::Push => Arc::new(PushNotifier { api }),
        NotifierKind::Poll => Arc::new(PollNotifier {
            api,
            endpoint: PollEndpoint::SessionStatus,
            interval: config.poll_interval,
            max_attempts: config.poll_attempts,
        }),
        NotifierKind::Callback => Arc::new(PollNotifier {
            api,
            endpoint: PollEndpoint::Callback,
            interval: config.poll_interval,
            max_attempts: config.poll_attempts,
        }),
    }
}

fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    match shutdown.try_recv() {
        Ok(()) | Err(TryRecvError::Disconnected) => true,
        Err(TryRecvError::Empty) => false,
    }
}

pub struct PushNotifier {
    pub api: Arc<dyn JobApi>,
}

impl ProgressNotifier for PushNotifier {
    fn deliver(
        &self,
        session_id: &str,
        shutdown: &Receiver<()>,
        emit: &mut dyn FnMut(NotifierUpdate),
    ) {
        let reader = match self.api.open_messages(session_id) {
            Ok(reader) => reader,
            Err(err) => {
                log::error!("Message stream for session {session_id} failed to open: {err:#}");
                emit(NotifierUpdate::Failed(format!("{err:#}")));
                return;
            }
        };
        log::info!("Listening for messages of session {session_id}");

        match pump_event_stream(reader, session_id, shutdown, emit) {
            Ok(StreamEnd::Terminal) | Ok(StreamEnd::Shutdown) => {}
            Ok(StreamEnd::Exhausted) => {
                emit(NotifierUpdate::Failed(
                    "Message stream closed before the job finished.".to_string(),
                ));
            }
            Err(err) => {
                log::error!("Message stream for session {session_id} failed: {err}");
                emit(NotifierUpdate::Failed(format!("Message stream failed: {err}")));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Terminal,
    Shutdown,
    Exhausted,
}

fn is_keep_alive_tick(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn take_line(pending: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(&pending[..])
        .trim_end_matches(['\r', '\n'])
        .to_string();
    pending.clear();
    line
}

/// Reads an event stream line by line, forwarding events that belong to
/// `session_id`. Messages for other sessions and undecodable messages are dropped.
///
/// Timed-out reads count as keep-alive ticks: the partial line is kept and
/// shutdown is checked again, so a quiet stream never outlives its handle by
/// more than one read.
pub fn pump_event_stream<R: BufRead>(
    mut reader: R,
    session_id: &str,
    shutdown: &Receiver<()>,
    emit: &mut dyn FnMut(NotifierUpdate),
) -> io::Result<StreamEnd> {
    let mut framer = SseFramer::default();
    let mut forward = |message: String| -> bool {
        let event = match decode_notification(&message) {
            Ok(event) => event,
            Err(err) => {
                log::warn!("Skipping message '{message}': {err}");
                return false;
            }
        };
        if event.session_id != session_id {
            log::debug!(
                "Ignoring {} message for foreign session {}",
                event.facility,
                event.session_id
            );
            return false;
        }
        let terminal = event.facility.is_terminal();
        emit(NotifierUpdate::Event(event));
        terminal
    };

    let mut pending = Vec::new();
    loop {
        if shutdown_requested(shutdown) {
            return Ok(StreamEnd::Shutdown);
        }
        match reader.read_until(b'\n', &mut pending) {
            Ok(0) => break,
            Ok(_) if !pending.ends_with(b"\n") => continue,
            Ok(_) => {}
            Err(err) if is_keep_alive_tick(&err) => continue,
            Err(err) => return Err(err),
        }
        if let Some(message) = framer.push_line(&take_line(&mut pending)) {
            if forward(message) {
                return Ok(StreamEnd::Terminal);
            }
        }
    }

    if !pending.is_empty() {
        if let Some(message) = framer.push_line(&take_line(&mut pending)) {
            if forward(message) {
                return Ok(StreamEnd::Terminal);
            }
        }
    }
    if let Some(message) = framer.flush() {
        if forward(message) {
            return Ok(StreamEnd::Terminal);
        }
    }
    Ok(StreamEnd::Exhausted)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEndpoint {
    SessionStatus,
    Callback,
}

pub struct PollNotifier {
    pub api: Arc<dyn JobApi>,
    pub endpoint: PollEndpoint,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl ProgressNotifier for PollNotifier {
    fn deliver(
        &self,
        session_id: &str,
        shutdown: &Receiver<()>,
        emit: &mut dyn FnMut(NotifierUpdate),
    ) {
        for attempt in 1..=self.max_attempts {
            if shutdown_requested(shutdown) {
                return;
            }

            let status = match self.endpoint {
                PollEndpoint::SessionStatus => self.api.video_status(session_id),
                PollEndpoint::Callback => self.api.video_callback(),
            };
            match status {
                Ok(PollStatus::Ready { video_url }) => {
                    log::info!("Video for session {session_id} ready after {attempt} poll(s)");
                    emit(NotifierUpdate::Event(NotificationEvent::new(
                        session_id,
                        Facility::Video,
                        video_url,
                    )));
                    return;
                }
                Ok(PollStatus::Pending { status }) => {
                    log::debug!(
                        "Session {session_id} poll {attempt}/{}: {status}",
                        self.max_attempts
                    );
                }
                Err(err) => {
                    log::error!("Polling session {session_id} failed: {err:#}");
                    emit(NotifierUpdate::Failed(format!("{err:#}")));
                    return;
                }
            }

            if attempt < self.max_attempts {
                match shutdown.recv_timeout(self.interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        }

        emit(NotifierUpdate::Failed(format!(
            "Timed out waiting for the video after {} status checks.",
            self.max_attempts
        )));
    }
}

/// The one running notifier of a controller. Dropping the handle signals the
/// worker to stop and discards anything it still sends; a push worker closes
/// its connection by its next read tick.
pub struct NotifierHandle {
    session_id: String,
    shutdown: Sender<()>,
    updates: Receiver<NotifierUpdate>,
    closed: bool,
}

impl NotifierHandle {
    pub fn spawn(strategy: Arc<dyn ProgressNotifier>, session_id: String) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (tx, rx) = mpsc::channel::<NotifierUpdate>();
        let worker_session = session_id.clone();
        thread::spawn(move || {
            strategy.deliver(&worker_session, &shutdown_rx, &mut |update| {
                let _ = tx.send(update);
            });
            log::debug!("Notifier for session {worker_session} exited");
        });

        Self {
            session_id,
            shutdown: shutdown_tx,
            updates: rx,
            closed: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn try_next(&mut self) -> Option<NotifierUpdate> {
        if self.closed {
            return None;
        }
        match self.updates.try_recv() {
            Ok(update) => Some(update),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Some(NotifierUpdate::Closed)
            }
        }
    }
}

impl Drop for NotifierHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        log::info!("Notifier for session {} torn down", self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{BufReader, Cursor, Read};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    use anyhow::{bail, Result};

    use super::*;
    use crate::form::SubmissionPayload;
    use crate::protocol::SubmitResponse;
    use crate::tones::ToneCatalog;

    struct StatusApi {
        calls: AtomicU32,
        ready_on: Option<u32>,
        stream: Mutex<Option<String>>,
    }

    impl StatusApi {
        fn pending_forever() -> Self {
            Self {
                calls: AtomicU32::new(0),
                ready_on: None,
                stream: Mutex::new(None),
            }
        }
    }

    impl JobApi for StatusApi {
        fn fetch_tones(&self) -> Result<ToneCatalog> {
            Ok(ToneCatalog::default())
        }

        fn submit_job(&self, _payload: &SubmissionPayload) -> Result<SubmitResponse> {
            bail!("not used")
        }

        fn open_messages(&self, _session_id: &str) -> Result<Box<dyn BufRead + Send>> {
            match self.stream.lock().expect("lock").take() {
                Some(body) => Ok(Box::new(BufReader::new(Cursor::new(body.into_bytes())))),
                None => bail!("HTTP 502 Bad Gateway for /api/messages: upstream down"),
            }
        }

        fn video_status(&self, _session_id: &str) -> Result<PollStatus> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.ready_on == Some(call) {
                return Ok(PollStatus::Ready {
                    video_url: "https://cdn/v.mp4".to_string(),
                });
            }
            Ok(PollStatus::Pending {
                status: "pending".to_string(),
            })
        }

        fn video_callback(&self) -> Result<PollStatus> {
            self.video_status("")
        }
    }

    fn tick() -> io::Error {
        io::Error::new(io::ErrorKind::TimedOut, "no data within the read tick")
    }

    /// Body that replays chunks, answering `None` entries with a timed-out read.
    struct TickingBody(VecDeque<Option<&'static [u8]>>);

    impl Read for TickingBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(None) => Err(tick()),
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
            }
        }
    }

    /// Body of a connection the server keeps open without sending anything.
    struct QuietBody {
        reads: Arc<AtomicU32>,
        released: Arc<AtomicBool>,
    }

    impl Read for QuietBody {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(10));
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(tick())
        }
    }

    impl Drop for QuietBody {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct QuietApi {
        reads: Arc<AtomicU32>,
        released: Arc<AtomicBool>,
    }

    impl JobApi for QuietApi {
        fn fetch_tones(&self) -> Result<ToneCatalog> {
            Ok(ToneCatalog::default())
        }

        fn submit_job(&self, _payload: &SubmissionPayload) -> Result<SubmitResponse> {
            bail!("not used")
        }

        fn open_messages(&self, _session_id: &str) -> Result<Box<dyn BufRead + Send>> {
            Ok(Box::new(BufReader::new(QuietBody {
                reads: Arc::clone(&self.reads),
                released: Arc::clone(&self.released),
            })))
        }

        fn video_status(&self, _session_id: &str) -> Result<PollStatus> {
            bail!("not used")
        }

        fn video_callback(&self) -> Result<PollStatus> {
            bail!("not used")
        }
    }

    fn collect_pump(body: &str, session_id: &str) -> (Vec<NotifierUpdate>, StreamEnd) {
        let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let mut updates = Vec::new();
        let end = pump_event_stream(
            Cursor::new(body.as_bytes()),
            session_id,
            &shutdown_rx,
            &mut |update| updates.push(update),
        )
        .expect("in-memory stream should not fail");
        (updates, end)
    }

    #[test]
    fn push_stream_forwards_own_session_until_terminal_event() {
        let body = "data: s1 : log : step1\n\n\
                    data: s2 : video : url\n\n\
                    data: s1 : video : http://x/v.mp4\n\n\
                    data: s1 : log : after close\n\n";
        let (updates, end) = collect_pump(body, "s1");
        assert_eq!(end, StreamEnd::Terminal);
        assert_eq!(
            updates,
            vec![
                NotifierUpdate::Event(NotificationEvent::new("s1", Facility::Log, "step1")),
                NotifierUpdate::Event(NotificationEvent::new(
                    "s1",
                    Facility::Video,
                    "http://x/v.mp4"
                )),
            ]
        );
    }

    #[test]
    fn push_stream_skips_garbage_and_reports_exhaustion() {
        let body = ": ping\n\ndata: not-a-message\n\ndata: s1 : log : tail";
        let (updates, end) = collect_pump(body, "s1");
        assert_eq!(end, StreamEnd::Exhausted);
        assert_eq!(
            updates,
            vec![NotifierUpdate::Event(NotificationEvent::new(
                "s1",
                Facility::Log,
                "tail"
            ))]
        );
    }

    #[test]
    fn push_stream_stops_when_shutdown_is_signalled() {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        shutdown_tx.send(()).expect("receiver alive");
        let mut updates = Vec::new();
        let end = pump_event_stream(
            Cursor::new(&b"data: s1 : log : late\n\n"[..]),
            "s1",
            &shutdown_rx,
            &mut |update| updates.push(update),
        )
        .expect("in-memory stream should not fail");
        assert_eq!(end, StreamEnd::Shutdown);
        assert!(updates.is_empty());
    }

    #[test]
    fn push_stream_keeps_partial_lines_across_read_ticks() {
        let body = TickingBody(VecDeque::from([
            Some(&b"data: s1 : lo"[..]),
            None,
            Some(&b"g : step1\n"[..]),
            None,
            None,
            Some(&b"\ndata: s1 : video : http://x/v.mp4\n\n"[..]),
        ]));
        let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let mut updates = Vec::new();
        let end = pump_event_stream(BufReader::new(body), "s1", &shutdown_rx, &mut |update| {
            updates.push(update)
        })
        .expect("read ticks are not failures");
        assert_eq!(end, StreamEnd::Terminal);
        assert_eq!(
            updates,
            vec![
                NotifierUpdate::Event(NotificationEvent::new("s1", Facility::Log, "step1")),
                NotifierUpdate::Event(NotificationEvent::new(
                    "s1",
                    Facility::Video,
                    "http://x/v.mp4"
                )),
            ]
        );
    }

    #[test]
    fn dropping_handle_releases_quiet_push_stream() {
        let api = Arc::new(QuietApi::default());
        let strategy: Arc<dyn ProgressNotifier> = Arc::new(PushNotifier { api: api.clone() });
        let handle = NotifierHandle::spawn(strategy, "s1".to_string());
        let started = Instant::now();
        while api.reads.load(Ordering::SeqCst) == 0 && started.elapsed() < Duration::from_secs(5)
        {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(api.reads.load(Ordering::SeqCst) > 0);
        assert!(!api.released.load(Ordering::SeqCst));

        drop(handle);
        let dropped_at = Instant::now();
        while !api.released.load(Ordering::SeqCst)
            && dropped_at.elapsed() < Duration::from_secs(1)
        {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(api.released.load(Ordering::SeqCst));
    }

    #[test]
    fn push_notifier_surfaces_open_failure() {
        let notifier = PushNotifier {
            api: Arc::new(StatusApi::pending_forever()),
        };
        let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let mut updates = Vec::new();
        notifier.deliver("s1", &shutdown_rx, &mut |update| updates.push(update));
        assert!(matches!(
            updates.as_slice(),
            [NotifierUpdate::Failed(reason)] if reason.contains("502")
        ));
    }

    #[test]
    fn push_notifier_reports_stream_closed_without_terminal_event() {
        let api = StatusApi::pending_forever();
        *api.stream.lock().expect("lock") = Some("data: s1 : log : step1\n\n".to_string());
        let notifier = PushNotifier { api: Arc::new(api) };
        let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let mut updates = Vec::new();
        notifier.deliver("s1", &shutdown_rx, &mut |update| updates.push(update));
        assert_eq!(updates.len(), 2);
        assert!(matches!(&updates[1], NotifierUpdate::Failed(reason) if reason.contains("closed")));
    }

    #[test]
    fn poll_gives_up_after_retry_budget() {
        let api = Arc::new(StatusApi::pending_forever());
        let notifier = PollNotifier {
            api: api.clone(),
            endpoint: PollEndpoint::SessionStatus,
            interval: Duration::ZERO,
            max_attempts: 60,
        };
        let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let mut updates = Vec::new();
        notifier.deliver("s1", &shutdown_rx, &mut |update| updates.push(update));

        assert_eq!(api.calls.load(Ordering::SeqCst), 60);
        assert!(matches!(
            updates.as_slice(),
            [NotifierUpdate::Failed(reason)] if reason.contains("Timed out") && reason.contains("60")
        ));
    }

    #[test]
    fn poll_stops_on_success() {
        let api = Arc::new(StatusApi {
            calls: AtomicU32::new(0),
            ready_on: Some(3),
            stream: Mutex::new(None),
        });
        let notifier = PollNotifier {
            api: api.clone(),
            endpoint: PollEndpoint::Callback,
            interval: Duration::ZERO,
            max_attempts: 60,
        };
        let (_shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let mut updates = Vec::new();
        notifier.deliver("s7", &shutdown_rx, &mut |update| updates.push(update));

        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            updates,
            vec![NotifierUpdate::Event(NotificationEvent::new(
                "s7",
                Facility::Video,
                "https://cdn/v.mp4"
            ))]
        );
    }

    #[test]
    fn dropping_handle_interrupts_poll_wait() {
        let api = Arc::new(StatusApi::pending_forever());
        let strategy: Arc<dyn ProgressNotifier> = Arc::new(PollNotifier {
            api: api.clone(),
            endpoint: PollEndpoint::SessionStatus,
            interval: Duration::from_secs(30),
            max_attempts: 60,
        });
        let handle = NotifierHandle::spawn(strategy, "s1".to_string());
        let started = Instant::now();
        while api.calls.load(Ordering::SeqCst) == 0 && started.elapsed() < Duration::from_secs(5)
        {
            thread::sleep(Duration::from_millis(5));
        }
        drop(handle);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_reports_closed_once_worker_exits() {
        struct Immediate;
        impl ProgressNotifier for Immediate {
            fn deliver(
                &self,
                session_id: &str,
                _shutdown: &Receiver<()>,
                emit: &mut dyn FnMut(NotifierUpdate),
            ) {
                emit(NotifierUpdate::Event(NotificationEvent::new(
                    session_id,
                    Facility::Log,
                    "hello",
                )));
            }
        }

        let mut handle = NotifierHandle::spawn(Arc::new(Immediate), "s1".to_string());
        let mut seen = Vec::new();
        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(5) {
            match handle.try_next() {
                Some(NotifierUpdate::Closed) => {
                    seen.push(NotifierUpdate::Closed);
                    break;
                }
                Some(update) => seen.push(update),
                None => thread::sleep(Duration::from_millis(2)),
            }
        }
        assert_eq!(
            seen,
            vec![
                NotifierUpdate::Event(NotificationEvent::new("s1", Facility::Log, "hello")),
                NotifierUpdate::Closed,
            ]
        );
        assert_eq!(handle.try_next(), None);
        assert_eq!(handle.session_id(), "s1");
    }
}
