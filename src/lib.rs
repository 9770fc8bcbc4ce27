//! # rlog
//! Colorful console logger with privacy masking, an asynchronous log file and
//! ordered shutdown.
//!
//! ## Usage
//! ```toml
//! // Cargo.toml
//! ...
//! [dependencies]
//! rlog = "0.1.0"
//! tokio = { version = "1.40.0", features = ["full"] }
//! ```
//!
//! ```rust
//! use rlog::logger_config;
//!
//! let logger = logger_config().build();
//! logger.info("Hello, world!");
//! logger.log("Operation success"); // routed to success by keyword
//! rlog::info!(logger, "answer:", 42, true);
//! ```
//!
//! ## Logging to files
//! The log file is created if it does not exist and appended to if it does.
//! Blocked words are masked on screen and in the file.
//!
//! ```rust
//! use rlog::logger_config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let logger = logger_config()
//!         .with_log_file("/tmp/rlog_doc.log")
//!         .with_blocked_words(["hunter2"])
//!         .build();
//!     logger.info("password is hunter2");
//!     logger.flush().await.unwrap();
//!     assert!(std::fs::read_to_string("/tmp/rlog_doc.log").unwrap().ends_with("password is *******\n"));
//! }
//! ```
//!
//! ## Exiting
//! [`Logger::exit`] returns an [`ExitSignal`] to propagate as an error. The
//! scope set up by [`ConfigBuilder::run`] then writes the final line to the
//! file, closes it and runs the exit callbacks.
//!
//! ```rust
//! use rlog::{ExitStatus, logger_config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let status = logger_config()
//!         .run(|logger| async move {
//!             logger.on_exit(|| println!("bye"));
//!             let result: anyhow::Result<()> = Err(logger.exit("shutting down").into());
//!             result
//!         })
//!         .await;
//!     assert_eq!(status, ExitStatus::Clean);
//! }
//! ```

mod error;
mod exit;
mod file;
mod logger;
mod progress;
mod screen;

pub use error::SinkError;
pub use exit::{ExitCoordinator, ExitSignal, ExitState, ExitStatus, Outcome};
pub use file::{ErrorHook, FileSink, PendingWrite, SinkState};
pub use logger::{Logger, RlogFacade, classify};
pub use progress::LogProgressBar;
pub use rlog_core::{
    Args, Color, ColorRule, Config, Level, SharedValue, TimeFormat, Value, default_color_rules,
};
pub use screen::ScreenSink;

use log::LevelFilter;
use rlog_core::ConfigPatch;
use std::{
    future::Future,
    io::Write,
    path::Path,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

/// Defaults every new logger starts from.
static GLOBAL_DEFAULTS: LazyLock<RwLock<Arc<Config>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Config::default())));

fn global_defaults() -> Arc<Config> {
    Arc::clone(&GLOBAL_DEFAULTS.read().unwrap_or_else(PoisonError::into_inner))
}

pub(crate) fn merge_global(patch: &ConfigPatch) {
    let mut defaults = GLOBAL_DEFAULTS
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *defaults = Arc::new(patch.apply(&defaults));
}

/// Builder for configuring and creating loggers.
pub struct ConfigBuilder {
    patch: ConfigPatch,
    screen: Option<ScreenSink>,
    coordinator: Option<Arc<ExitCoordinator>>,
    level: LevelFilter,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            patch: ConfigPatch::default(),
            screen: None,
            coordinator: None,
            level: LevelFilter::Info,
        }
    }
}

impl ConfigBuilder {
    pub(crate) fn patch(&self) -> &ConfigPatch {
        &self.patch
    }

    fn with_patch(mut self, update: impl FnOnce(&mut ConfigPatch)) -> Self {
        update(&mut self.patch);
        self
    }

    /// Sets a log file.
    pub fn with_log_file<P: AsRef<Path>>(self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        self.with_patch(|patch| patch.log_file_path = Some(Some(path)))
    }
    /// Maybe sets a log file. `None` disables file output.
    pub fn maybe_with_log_file<P: AsRef<Path>>(self, path: Option<P>) -> Self {
        let path = path.map(|p| p.as_ref().to_path_buf());
        self.with_patch(|patch| patch.log_file_path = Some(path))
    }
    pub fn with_colors(self, yes: bool) -> Self {
        self.with_patch(|patch| patch.colors = Some(yes))
    }
    /// A strftime pattern, or one of `timestamp`, `ISO`, `GMT`, `UTC`.
    pub fn with_time_format(self, format: impl Into<TimeFormat>) -> Self {
        let format = format.into();
        self.with_patch(|patch| patch.time_format = Some(format))
    }
    /// `UTC`, `GMT`, a fixed offset like `+08:00` or an IANA name like `Asia/Shanghai`.
    pub fn with_timezone(self, timezone: impl Into<String>) -> Self {
        let timezone = timezone.into();
        self.with_patch(|patch| patch.timezone = Some(Some(timezone)))
    }
    /// Separator between the arguments of one call.
    pub fn with_join_char(self, join: impl Into<String>) -> Self {
        let join = join.into();
        self.with_patch(|patch| patch.join_char = Some(join))
    }
    /// Words or regexes masked with `*` in every output.
    pub fn with_blocked_words<I, S>(self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Arc<[String]> = words.into_iter().map(Into::into).collect();
        self.with_patch(|patch| patch.blocked_words = Some(words))
    }
    /// Replaces the highlighting rules. Rules apply in order.
    pub fn with_color_rules<I>(self, rules: I) -> Self
    where
        I: IntoIterator<Item = ColorRule>,
    {
        let rules: Arc<[ColorRule]> = rules.into_iter().collect();
        self.with_patch(|patch| patch.color_rules = Some(rules))
    }
    /// Fixed terminal width for progress lines.
    pub fn with_screen_length(self, columns: usize) -> Self {
        self.with_patch(|patch| patch.screen_length = Some(Some(columns)))
    }
    pub fn with_auto_init(self, yes: bool) -> Self {
        self.with_patch(|patch| patch.auto_init = Some(yes))
    }
    /// Suppress informational notices such as the log file announcement.
    pub fn silent(self) -> Self {
        self.with_patch(|patch| patch.silent = Some(true))
    }
    /// Maximum level forwarded by the `log` facade.
    pub fn with_level(self, level: LevelFilter) -> Self {
        Self { level, ..self }
    }
    /// Sends screen output to `writer` instead of stdout.
    pub fn with_screen_writer<W: Write + Send + 'static>(self, writer: W) -> Self {
        Self {
            screen: Some(ScreenSink::with_writer(writer)),
            ..self
        }
    }
    /// Shares an exit coordinator between loggers.
    pub fn with_coordinator(self, coordinator: Arc<ExitCoordinator>) -> Self {
        Self {
            coordinator: Some(coordinator),
            ..self
        }
    }

    /// Creates a logger from the global defaults plus this builder's settings.
    pub fn build(self) -> Logger {
        let Self {
            patch,
            screen,
            coordinator,
            level: _,
        } = self;
        let config = patch.apply(&global_defaults());
        let auto_init = config.auto_init;
        let logger = Logger::new(
            config,
            Arc::new(screen.unwrap_or_default()),
            coordinator.unwrap_or_default(),
        );
        if auto_init {
            // a failed open is reported through the exit path
            let _ = logger.init();
        }
        logger
    }

    /// Merges this builder's settings into the global defaults.
    pub fn set_global(self) {
        merge_global(&self.patch);
    }

    /// Builds a logger and installs it as the `log` facade backend.
    pub fn init_global(self) -> Result<Logger, log::SetLoggerError> {
        let level = self.level;
        let logger = self.build();
        log::set_boxed_logger(Box::new(RlogFacade::new(logger.clone(), level)))?;
        log::set_max_level(level);
        Ok(logger)
    }

    /// Builds a logger and runs `f` under its exit coordinator.
    ///
    /// Resolves to [`ExitStatus::Clean`] on completion or after a requested
    /// exit has drained, and to [`ExitStatus::Crashed`] on any other error or
    /// panic.
    pub async fn run<F, Fut>(self, f: F) -> ExitStatus
    where
        F: FnOnce(Logger) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let logger = self.build();
        let coordinator = Arc::clone(logger.coordinator());
        coordinator.run(f(logger)).await
    }
}

/// Returns a default ConfigBuilder for configuring the logger.
pub fn logger_config() -> ConfigBuilder {
    ConfigBuilder::default()
}

/// Settings new loggers currently start from.
pub fn global_config() -> Arc<Config> {
    global_defaults()
}

#[doc(hidden)]
#[macro_export]
macro_rules! __args {
    ($($arg:expr),+ $(,)?) => {
        $crate::Args::from(vec![$($crate::Value::from($arg)),+])
    };
}

/// `info!(logger, a, b, ..)` logs heterogeneous values joined by the join character.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:expr),+ $(,)?) => {
        $logger.info($crate::__args!($($arg),+))
    };
}

#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:expr),+ $(,)?) => {
        $logger.warning($crate::__args!($($arg),+))
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:expr),+ $(,)?) => {
        $logger.error($crate::__args!($($arg),+))
    };
}

#[macro_export]
macro_rules! success {
    ($logger:expr, $($arg:expr),+ $(,)?) => {
        $logger.success($crate::__args!($($arg),+))
    };
}

/// Like [`info!`] but the level is picked by [`classify`].
#[macro_export]
macro_rules! log {
    ($logger:expr, $($arg:expr),+ $(,)?) => {
        $logger.log($crate::__args!($($arg),+))
    };
}
