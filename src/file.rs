use std::{
    fs::{self, File},
    future::Future,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use rlog_core::{Config, Level, PrivacyMasker, RLOG_ENV, Value};
use tokio::sync::oneshot;

use crate::{error::SinkError, screen::ScreenSink};

const BATCH_SIZE: usize = 32;

/// Called from the writer thread when the stream fails.
pub type ErrorHook = Arc<dyn Fn(&io::Error) + Send + Sync>;

/// Lifecycle of the file stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Uninitialized,
    Open,
    Closing,
    Closed,
}

type Ack = oneshot::Sender<io::Result<()>>;

enum FileCommand {
    Line { text: String, ack: Ack },
    Flush { ack: Ack },
    Close { ack: Ack },
}

/// A queued write. Await it to learn when the line reached the file, or drop
/// it to fire and forget.
pub struct PendingWrite {
    receiver: oneshot::Receiver<io::Result<()>>,
}

impl Future for PendingWrite {
    type Output = Result<(), SinkError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| match received {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SinkError::Io(err)),
            Err(_) => Err(SinkError::StreamUnavailable),
        })
    }
}

struct SinkInner {
    state: SinkState,
    sender: Option<Sender<FileCommand>>,
}

/// Append-only log file fed by a dedicated writer thread.
///
/// Lines are delivered to the thread over an unbounded channel, so the file
/// receives them in call order. The stream opens lazily on the first write
/// unless [`FileSink::init`] is called first.
pub struct FileSink {
    path: Option<PathBuf>,
    inner: Mutex<SinkInner>,
    masker: PrivacyMasker,
    screen: Arc<ScreenSink>,
    on_error: ErrorHook,
}

impl FileSink {
    pub fn new(path: Option<PathBuf>, screen: Arc<ScreenSink>, on_error: ErrorHook) -> Self {
        Self {
            path,
            inner: Mutex::new(SinkInner {
                state: SinkState::Uninitialized,
                sender: None,
            }),
            masker: PrivacyMasker::new(),
            screen,
            on_error,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn state(&self) -> SinkState {
        self.lock().state
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the stream. Returns `true` when this call opened it.
    ///
    /// A failure to open is fatal: it is reported to the error hook before
    /// being returned.
    pub fn init(&self, config: &Config) -> Result<bool, SinkError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };
        let mut inner = self.lock();
        match inner.state {
            SinkState::Open => return Ok(false),
            SinkState::Closing | SinkState::Closed => return Err(SinkError::StreamUnavailable),
            SinkState::Uninitialized => {}
        }
        let file = match open_append(path) {
            Ok(file) => file,
            Err(err) => {
                drop(inner);
                (self.on_error)(&err);
                return Err(err.into());
            }
        };
        inner.sender = Some(spawn_file_writer(file, Arc::clone(&self.on_error)));
        inner.state = SinkState::Open;
        drop(inner);
        if !config.silent {
            let notice = Value::from(format!("The log will be written to {}", path.display()));
            self.screen
                .emit(config, Level::Info, &notice, &config.timestamp());
        }
        Ok(true)
    }

    fn send(&self, command: FileCommand) -> Result<(), SinkError> {
        let inner = self.lock();
        match (inner.state, inner.sender.as_ref()) {
            (SinkState::Open, Some(sender)) => sender
                .send(command)
                .map_err(|_| SinkError::StreamUnavailable),
            _ => Err(SinkError::StreamUnavailable),
        }
    }

    /// Queues `text` as one line.
    pub fn write(&self, text: String) -> Result<PendingWrite, SinkError> {
        let (ack, receiver) = oneshot::channel();
        self.send(FileCommand::Line { text, ack })?;
        Ok(PendingWrite { receiver })
    }

    /// Writes one line and waits until it has been flushed to the file.
    pub async fn write_and_await(&self, text: impl Into<String>) -> Result<(), SinkError> {
        self.write(text.into())?.await
    }

    /// `[timestamp][LEVEL] payload`, masked and uncolored.
    pub fn format(&self, config: &Config, level: Level, payload: &Value, timestamp: &str) -> String {
        let text = payload.stringify();
        let masked = self.masker.mask(&text, &config.blocked_words);
        format!("[{timestamp}][{level}] {masked}")
    }

    /// Appends one event. Does nothing when no file is configured.
    pub fn emit(
        &self,
        config: &Config,
        level: Level,
        payload: &Value,
        timestamp: &str,
    ) -> Result<Option<PendingWrite>, SinkError> {
        if self.path.is_none() {
            return Ok(None);
        }
        if self.state() == SinkState::Uninitialized {
            if !config.silent {
                let warning = Value::from("RLog not initialized, automatic init in progress...");
                self.screen
                    .emit(config, Level::Warning, &warning, timestamp);
            }
            self.init(config)?;
        }
        self.write(self.format(config, level, payload, timestamp))
            .map(Some)
    }

    /// Waits until every line queued so far is in the file.
    pub async fn flush(&self) -> Result<(), SinkError> {
        if self.path.is_none() || self.state() == SinkState::Uninitialized {
            return Ok(());
        }
        let (ack, receiver) = oneshot::channel();
        self.send(FileCommand::Flush { ack })?;
        PendingWrite { receiver }.await
    }

    /// Ends the stream. Resolves once queued lines are flushed and synced and
    /// the file handle is released.
    pub async fn close(&self) -> Result<(), SinkError> {
        let sender = {
            let mut inner = self.lock();
            match inner.state {
                SinkState::Open => {}
                SinkState::Uninitialized => {
                    inner.state = SinkState::Closed;
                    return Ok(());
                }
                SinkState::Closing | SinkState::Closed => return Ok(()),
            }
            inner.state = SinkState::Closing;
            inner.sender.take()
        };
        let result = match sender {
            Some(sender) => {
                let (ack, receiver) = oneshot::channel();
                match sender.send(FileCommand::Close { ack }) {
                    Ok(()) => PendingWrite { receiver }.await,
                    Err(_) => Err(SinkError::StreamUnavailable),
                }
            }
            None => Ok(()),
        };
        self.lock().state = SinkState::Closed;
        result
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    File::options().create(true).append(true).open(path)
}

fn share(err: &io::Error) -> io::Error {
    io::Error::new(err.kind(), err.to_string())
}

struct LineWriter {
    file: BufWriter<File>,
    on_error: ErrorHook,
    failed: bool,
}

impl LineWriter {
    /// Reports the first failure only.
    fn check(&mut self, result: io::Result<()>) -> io::Result<()> {
        if let Err(err) = &result {
            if !self.failed {
                self.failed = true;
                (self.on_error)(err);
            }
        }
        result
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        let result = writeln!(self.file, "{text}");
        self.check(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.file.flush();
        self.check(result)
    }

    fn finish(mut self) -> io::Result<()> {
        self.flush()?;
        let result = self.file.get_ref().sync_all();
        self.check(result)
    }
}

fn spawn_file_writer(file: File, on_error: ErrorHook) -> Sender<FileCommand> {
    let (sender, receiver) = unbounded::<FileCommand>();
    thread::spawn(move || {
        let mut writer = LineWriter {
            file: BufWriter::new(file),
            on_error,
            failed: false,
        };
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let flush_interval = Duration::from_millis(RLOG_ENV.FLUSH_INTERVAL_MS);
        let mut last_flush = Instant::now();
        loop {
            let elapsed = last_flush.elapsed();
            let timeout = if elapsed >= flush_interval {
                Duration::from_millis(1)
            } else {
                flush_interval - elapsed
            };

            match receiver.recv_timeout(timeout) {
                Ok(command) => {
                    batch.push(command);
                    while batch.len() < BATCH_SIZE {
                        match receiver.try_recv() {
                            Ok(command) => batch.push(command),
                            Err(_) => break,
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if last_flush.elapsed() >= flush_interval {
                        let _ = writer.flush();
                        last_flush = Instant::now();
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = writer.flush();
                    break;
                }
            }

            let mut waiting = Vec::new();
            let mut close = None;
            for command in batch.drain(..) {
                match command {
                    FileCommand::Line { text, ack } => {
                        let result = writer.line(&text);
                        // nobody awaits most lines; those don't force a flush
                        if !ack.is_closed() {
                            waiting.push((ack, result));
                        }
                    }
                    FileCommand::Flush { ack } => waiting.push((ack, Ok(()))),
                    FileCommand::Close { ack } => {
                        close = Some(ack);
                        break;
                    }
                }
            }

            if !waiting.is_empty() || last_flush.elapsed() >= flush_interval {
                let flushed = writer.flush();
                last_flush = Instant::now();
                for (ack, result) in waiting {
                    let result = result.and_then(|()| flushed.as_ref().map(|_| ()).map_err(share));
                    let _ = ack.send(result);
                }
            }

            if let Some(ack) = close {
                let _ = ack.send(writer.finish());
                break;
            }
        }
    });
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::tests::Capture;
    use uuid::Uuid;

    fn test_path(name: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/rlog_test_{name}_{}.log", Uuid::new_v4()))
    }

    fn config(path: &Path) -> Config {
        Config {
            colors: false,
            log_file_path: Some(path.to_path_buf()),
            time_format: "12:00".into(),
            ..Config::default()
        }
    }

    fn sink(path: Option<PathBuf>, capture: &Capture) -> FileSink {
        let screen = Arc::new(ScreenSink::with_writer(capture.clone()));
        FileSink::new(path, screen, Arc::new(|_: &io::Error| {}))
    }

    #[tokio::test]
    async fn test_lines_written_in_order() {
        let path = test_path("order");
        let capture = Capture::default();
        let sink = sink(Some(path.clone()), &capture);
        let config = config(&path);
        assert_eq!(sink.state(), SinkState::Uninitialized);
        for i in 0..10 {
            let _ = sink
                .emit(&config, Level::Info, &Value::from(i), "12:00")
                .unwrap();
        }
        assert_eq!(sink.state(), SinkState::Open);
        sink.flush().await.unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let expected: Vec<String> = (0..10).map(|i| format!("[12:00][INFO] {i}")).collect();
        assert_eq!(content.lines().collect::<Vec<_>>(), expected);
        let screen = capture.contents();
        assert!(screen.starts_with(
            "[12:00][WARN] RLog not initialized, automatic init in progress...\n[12:00][INFO] The log will be written to"
        ));
        assert_eq!(screen.matches("automatic init").count(), 1);
        fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_silent_lazy_init_is_quiet() {
        let path = test_path("silent_lazy");
        let capture = Capture::default();
        let sink = sink(Some(path.clone()), &capture);
        let config = Config {
            silent: true,
            ..config(&path)
        };
        let _ = sink.emit(&config, Level::Info, &Value::from("quiet"), "12:00");
        sink.close().await.unwrap();
        assert_eq!(capture.contents(), "");
        assert_eq!(fs::read_to_string(&path).unwrap(), "[12:00][INFO] quiet\n");
        fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_silent_init_has_no_notice() {
        let path = test_path("silent");
        let capture = Capture::default();
        let sink = sink(Some(path.clone()), &capture);
        let config = Config {
            silent: true,
            ..config(&path)
        };
        assert!(sink.init(&config).unwrap());
        assert!(!sink.init(&config).unwrap());
        assert_eq!(capture.contents(), "");
        sink.close().await.unwrap();
        fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_write_and_await() {
        let path = test_path("await");
        let capture = Capture::default();
        let sink = sink(Some(path.clone()), &capture);
        assert!(matches!(
            sink.write("early".into()),
            Err(SinkError::StreamUnavailable)
        ));
        sink.init(&config(&path)).unwrap();
        sink.write_and_await("hello").await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_close_rejects_later_writes() {
        let path = test_path("close");
        let capture = Capture::default();
        let sink = sink(Some(path.clone()), &capture);
        let config = config(&path);
        let _ = sink.emit(&config, Level::Warning, &Value::from("last"), "12:00");
        sink.close().await.unwrap();
        assert_eq!(sink.state(), SinkState::Closed);
        assert!(matches!(
            sink.emit(&config, Level::Info, &Value::from("late"), "12:00"),
            Err(SinkError::StreamUnavailable)
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "[12:00][WARN] last\n");
        fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_appends_to_existing_file() {
        let path = test_path("append");
        fs::write(&path, "previous\n").unwrap();
        let capture = Capture::default();
        let sink = sink(Some(path.clone()), &capture);
        let _ = sink.emit(&config(&path), Level::Success, &Value::from("next"), "12:00");
        sink.close().await.unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "previous\n[12:00][SUCCESS] next\n"
        );
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_masked_file_line() {
        let capture = Capture::default();
        let sink = sink(None, &capture);
        let config = Config {
            blocked_words: vec!["secret".to_string()].into(),
            ..Config::default()
        };
        let line = sink.format(&config, Level::Error, &Value::from("the secret"), "t");
        assert_eq!(line, "[t][ERROR] the ******");
    }

    #[test]
    fn test_no_path_is_noop() {
        let capture = Capture::default();
        let sink = sink(None, &capture);
        let result = sink.emit(&Config::default(), Level::Info, &Value::from("x"), "t");
        assert!(matches!(result, Ok(None)));
        assert_eq!(sink.state(), SinkState::Uninitialized);
    }

    #[test]
    fn test_open_failure_reaches_hook() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let hook_reported = Arc::clone(&reported);
        let screen = Arc::new(ScreenSink::with_writer(Capture::default()));
        let path = PathBuf::from("/dev/null/rlog/test.log");
        let sink = FileSink::new(
            Some(path.clone()),
            screen,
            Arc::new(move |err: &io::Error| hook_reported.lock().unwrap().push(err.kind())),
        );
        assert!(matches!(sink.init(&config(&path)), Err(SinkError::Io(_))));
        assert_eq!(reported.lock().unwrap().len(), 1);
        assert_eq!(sink.state(), SinkState::Uninitialized);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_write_failure_reaches_hook() {
        let reported = Arc::new(Mutex::new(0usize));
        let hook_reported = Arc::clone(&reported);
        let screen = Arc::new(ScreenSink::with_writer(Capture::default()));
        let path = PathBuf::from("/dev/full");
        let sink = FileSink::new(
            Some(path.clone()),
            screen,
            Arc::new(move |_: &io::Error| *hook_reported.lock().unwrap() += 1),
        );
        sink.init(&config(&path)).unwrap();
        assert!(matches!(
            sink.write_and_await("disk full").await,
            Err(SinkError::Io(_))
        ));
        assert_eq!(*reported.lock().unwrap(), 1);
    }
}
