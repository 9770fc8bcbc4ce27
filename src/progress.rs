use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use rlog_core::format_progress;

use crate::Logger;

const DEFAULT_COLUMNS: usize = 80;

fn terminal_columns() -> Option<usize> {
    crossterm::terminal::size()
        .ok()
        .map(|(columns, _)| columns as usize)
        .filter(|columns| *columns > 0)
}

impl Logger {
    /// Redraws the single progress line in place. Screen only.
    pub fn progress(&self, num: u64, max: u64) {
        let config = self.config();
        let columns = config
            .screen_length
            .or_else(terminal_columns)
            .unwrap_or(DEFAULT_COLUMNS);
        let header = format!("[{}]", config.timestamp());
        let line = format_progress(&header, num, max, columns, config.colors);
        self.screen().write_raw(&line);
    }
}

struct ProgressState {
    current: u64,
    finished: bool,
    last_draw: Option<Instant>,
}

/// Counter drawn through [`Logger::progress`], throttled to one redraw per
/// `min_timestep`.
#[derive(Clone)]
pub struct LogProgressBar {
    logger: Logger,
    max: u64,
    min_timestep: Duration,
    state: Arc<Mutex<ProgressState>>,
}

impl LogProgressBar {
    pub fn new(logger: &Logger, max: u64) -> Self {
        let bar = Self {
            logger: logger.clone(),
            max,
            min_timestep: Duration::from_millis(100),
            state: Arc::new(Mutex::new(ProgressState {
                current: 0,
                finished: false,
                last_draw: None,
            })),
        };
        bar.draw(false);
        bar
    }

    pub fn with_min_timestep_ms(self, min_timestep_ms: f64) -> Self {
        Self {
            min_timestep: Duration::from_micros((min_timestep_ms * 1000.0).round() as u64),
            ..self
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn draw(&self, force: bool) {
        let mut state = self.lock();
        if state.finished {
            return;
        }
        let due = state
            .last_draw
            .is_none_or(|last| last.elapsed() >= self.min_timestep);
        if force || due || state.current >= self.max {
            self.logger.progress(state.current, self.max);
            state.last_draw = Some(Instant::now());
        }
    }

    pub fn inc(&self, n: u64) {
        self.lock().current += n;
        self.draw(false);
    }

    pub fn set_progress(&self, n: u64) {
        self.lock().current = n;
        self.draw(false);
    }

    /// Draws the final state and moves the cursor below the bar.
    pub fn finish(&self) {
        self.draw(true);
        let mut state = self.lock();
        if !state.finished {
            state.finished = true;
            self.logger.screen().write_raw("\n");
        }
    }
}
