use std::{
    future::Future,
    sync::{Arc, LazyLock, PoisonError, RwLock, Weak},
};

use log::{LevelFilter, Log};
use regex::Regex;
use rlog_core::{Args, Config, Level, Value};

use crate::{
    ConfigBuilder,
    error::SinkError,
    exit::{ExitCoordinator, ExitSignal, ExitState},
    file::{ErrorHook, FileSink, PendingWrite},
    merge_global,
    screen::ScreenSink,
};

static SUCCESS_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(success|ok|done|✓)").expect("valid success pattern"));
static WARNING_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(warn|but|notice|see|problem)").expect("valid warning pattern"));
static ERROR_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(error|fail|mistake|problem|fatal)").expect("valid error pattern"));

/// Picks a level from keywords in `text`. Success wins over warning, warning
/// over error.
pub fn classify(text: &str) -> Level {
    if SUCCESS_WORDS.is_match(text) {
        Level::Success
    } else if WARNING_WORDS.is_match(text) {
        Level::Warning
    } else if ERROR_WORDS.is_match(text) {
        Level::Error
    } else {
        Level::Info
    }
}

struct LoggerInner {
    config: RwLock<Arc<Config>>,
    screen: Arc<ScreenSink>,
    file: RwLock<Arc<FileSink>>,
    coordinator: Arc<ExitCoordinator>,
}

/// Handle to a configured logger. Cheap to clone; clones share config, sinks
/// and exit coordinator.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

fn error_hook(logger: Weak<LoggerInner>) -> ErrorHook {
    Arc::new(move |err: &std::io::Error| {
        let Some(inner) = logger.upgrade() else {
            return;
        };
        let logger = Logger { inner };
        if logger.coordinator().state() == ExitState::Running {
            let _ = logger.exit(format!("Error writing to log file: {err}"));
        }
    })
}

impl Logger {
    pub(crate) fn new(config: Config, screen: Arc<ScreenSink>, coordinator: Arc<ExitCoordinator>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<LoggerInner>| {
            let file = Arc::new(FileSink::new(
                config.log_file_path.clone(),
                Arc::clone(&screen),
                error_hook(weak.clone()),
            ));
            coordinator.attach(&file);
            LoggerInner {
                config: RwLock::new(Arc::new(config)),
                screen,
                file: RwLock::new(file),
                coordinator,
            }
        });
        Logger { inner }
    }

    /// Current config snapshot.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.inner.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn file(&self) -> Arc<FileSink> {
        Arc::clone(&self.inner.file.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn coordinator(&self) -> &Arc<ExitCoordinator> {
        &self.inner.coordinator
    }

    pub(crate) fn screen(&self) -> &ScreenSink {
        &self.inner.screen
    }

    /// Writes one event to the file, then to the screen, under a single
    /// timestamp. The returned write resolves once the line is in the file.
    pub fn emit(&self, level: Level, args: impl Into<Args>) -> Option<PendingWrite> {
        let config = self.config();
        let file = self.file();
        let payload = args.into().into_payload(&config.join_char);
        let timestamp = config.timestamp();
        let pending = file
            .emit(&config, level, &payload, &timestamp)
            .ok()
            .flatten();
        self.inner
            .screen
            .emit(&config, level, &payload, &timestamp);
        pending
    }

    pub fn info(&self, args: impl Into<Args>) -> Option<PendingWrite> {
        self.emit(Level::Info, args)
    }

    pub fn warning(&self, args: impl Into<Args>) -> Option<PendingWrite> {
        self.emit(Level::Warning, args)
    }

    pub fn warn(&self, args: impl Into<Args>) -> Option<PendingWrite> {
        self.warning(args)
    }

    pub fn error(&self, args: impl Into<Args>) -> Option<PendingWrite> {
        self.emit(Level::Error, args)
    }

    pub fn success(&self, args: impl Into<Args>) -> Option<PendingWrite> {
        self.emit(Level::Success, args)
    }

    /// Joins the arguments and logs them at the level [`classify`] picks.
    pub fn log(&self, args: impl Into<Args>) -> Option<PendingWrite> {
        let text = args.into().joined(&self.config().join_char);
        self.emit(classify(&text), Value::Text(text))
    }

    /// Prints the EXIT line and asks the coordinator to shut down.
    ///
    /// The returned signal should be propagated as an error up to
    /// [`ExitCoordinator::run`]; the final file line is written there.
    pub fn exit(&self, message: impl Into<Args>) -> ExitSignal {
        let config = self.config();
        let file = self.file();
        let payload = message.into().into_payload(&config.join_char);
        let timestamp = config.timestamp();
        self.inner
            .screen
            .emit(&config, Level::Exit, &payload, &timestamp);
        self.inner
            .coordinator
            .request_exit(file, config, ExitSignal { payload, timestamp })
    }

    pub fn on_exit<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.coordinator.on_exit(callback);
    }

    pub fn on_exit_async<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.coordinator.on_exit_async(callback);
    }

    /// Opens the log file now instead of on the first write.
    pub fn init(&self) -> Result<bool, SinkError> {
        self.file().init(&self.config())
    }

    pub async fn flush(&self) -> Result<(), SinkError> {
        self.file().flush().await
    }

    /// Merges `builder`'s settings into this logger only.
    ///
    /// A different log file path gets a fresh file sink.
    pub fn set_config(&self, builder: ConfigBuilder) {
        let current = self.config();
        let next = Arc::new(builder.patch().apply(&current));
        if next.log_file_path != current.log_file_path {
            let file = Arc::new(FileSink::new(
                next.log_file_path.clone(),
                Arc::clone(&self.inner.screen),
                error_hook(Arc::downgrade(&self.inner)),
            ));
            self.inner.coordinator.attach(&file);
            *self
                .inner
                .file
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&file);
            if next.auto_init {
                let _ = file.init(&next);
            }
        }
        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Merges `builder`'s settings into this logger and into the defaults of
    /// loggers built later.
    pub fn set_config_global(&self, builder: ConfigBuilder) {
        merge_global(builder.patch());
        self.set_config(builder);
    }
}

/// Backend for the `log` facade.
pub struct RlogFacade {
    logger: Logger,
    level: LevelFilter,
}

impl RlogFacade {
    pub fn new(logger: Logger, level: LevelFilter) -> Self {
        Self { logger, level }
    }
}

impl Log for RlogFacade {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        let _ = match record.level() {
            log::Level::Error => self.logger.error(message),
            log::Level::Warn => self.logger.warning(message),
            _ => self.logger.info(message),
        };
    }

    // the writer thread flushes on its own interval
    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exit::ExitStatus, logger_config, screen::tests::Capture};
    use std::{
        fs,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
    };
    use uuid::Uuid;

    fn test_path(name: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/rlog_test_{name}_{}.log", Uuid::new_v4()))
    }

    fn plain(capture: &Capture) -> ConfigBuilder {
        logger_config()
            .with_colors(false)
            .with_time_format("12:00")
            .with_screen_writer(capture.clone())
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("Operation success"), Level::Success);
        assert_eq!(classify("all DONE"), Level::Success);
        assert_eq!(classify("there is a problem"), Level::Warning);
        assert_eq!(classify("fatal crash"), Level::Error);
        assert_eq!(classify("hello"), Level::Info);
    }

    #[test]
    fn test_log_routes_by_keyword() {
        let capture = Capture::default();
        let logger = plain(&capture).build();
        let _ = logger.log("Operation success");
        assert_eq!(capture.contents(), "[12:00][SUCC] Operation success\n");
    }

    #[test]
    fn test_arguments_joined() {
        let capture = Capture::default();
        let logger = plain(&capture).with_join_char("-").build();
        let _ = logger.info(vec![Value::from("a"), Value::from(1), Value::from(true)]);
        let _ = logger.warn(Value::Null);
        assert_eq!(
            capture.contents(),
            "[12:00][INFO] a-1-true\n[12:00][WARN] null\n"
        );
    }

    #[tokio::test]
    async fn test_ten_lines_then_exit() {
        let path = test_path("exit");
        let capture = Capture::default();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let status = plain(&capture)
            .with_log_file(&path)
            .run(|logger| async move {
                logger.on_exit(move || flag.store(true, Ordering::SeqCst));
                for i in 0..10 {
                    let _ = logger.info(format!("line {i}"));
                }
                let result: anyhow::Result<()> = Err(logger.exit("bye").into());
                result
            })
            .await;
        assert_eq!(status, ExitStatus::Clean);
        assert!(called.load(Ordering::SeqCst));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 11);
        for (i, line) in lines[..10].iter().enumerate() {
            assert_eq!(*line, format!("[12:00][INFO] line {i}"));
        }
        assert_eq!(lines[10], "[12:00][EXIT] bye");
        assert!(capture.contents().ends_with("[12:00][EXIT] bye\n"));
        fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_failure_skips_callbacks() {
        let capture = Capture::default();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let status = plain(&capture)
            .run(|logger| async move {
                logger.on_exit(move || flag.store(true, Ordering::SeqCst));
                let result: anyhow::Result<()> = Err(anyhow::anyhow!("unrelated failure"));
                result
            })
            .await;
        assert_eq!(status, ExitStatus::Crashed);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_lazy_file_and_flush() {
        let path = test_path("lazy");
        let capture = Capture::default();
        let logger = plain(&capture)
            .with_log_file(&path)
            .with_auto_init(false)
            .with_blocked_words(["token"])
            .build();
        assert!(!path.exists());
        let _ = logger.error("bad token");
        logger.flush().await.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[12:00][ERROR] bad *****\n");
        let screen = capture.contents();
        assert!(screen.contains("[12:00][WARN] RLog not initialized, automatic init in progress..."));
        assert!(screen.contains("The log will be written to"));
        fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_set_config_switches_file() {
        let first = test_path("first");
        let second = test_path("second");
        let capture = Capture::default();
        let logger = plain(&capture).with_log_file(&first).silent().build();
        let _ = logger.info("one");
        logger.flush().await.unwrap();
        logger.set_config(logger_config().with_log_file(&second));
        if let Some(pending) = logger.success("two") {
            pending.await.unwrap();
        }
        assert_eq!(fs::read_to_string(&first).unwrap(), "[12:00][INFO] one\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "[12:00][SUCCESS] two\n");
        assert_eq!(logger.config().join_char, " ");
        fs::remove_file(&first).ok();
        fs::remove_file(&second).ok();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_file_error_requests_exit() {
        let capture = Capture::default();
        let status = plain(&capture)
            .with_log_file("/dev/full")
            .silent()
            .run(|logger| async move {
                let _ = logger.info("cannot be stored");
                std::future::pending::<anyhow::Result<()>>().await
            })
            .await;
        assert_eq!(status, ExitStatus::Clean);
        assert!(capture.contents().contains("[EXIT] Error writing to log file"));
    }

    #[test]
    fn test_facade_maps_levels() {
        let capture = Capture::default();
        let facade = RlogFacade::new(plain(&capture).build(), LevelFilter::Warn);
        facade.log(
            &log::Record::builder()
                .level(log::Level::Warn)
                .args(format_args!("careful"))
                .build(),
        );
        facade.log(
            &log::Record::builder()
                .level(log::Level::Info)
                .args(format_args!("filtered"))
                .build(),
        );
        assert_eq!(capture.contents(), "[12:00][WARN] careful\n");
    }
}
