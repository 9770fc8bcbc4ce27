use std::{
    borrow::Cow,
    io::Write,
    sync::{Mutex, PoisonError},
};

use rlog_core::{
    Config, Level, PatternColorizer, PrivacyMasker, TAG_WIDTH, Value, indent, paint, paint_bold,
    render,
};

/// Terminal sink: one colored line per event.
pub struct ScreenSink {
    out: Mutex<Box<dyn Write + Send>>,
    masker: PrivacyMasker,
    colorizer: PatternColorizer,
}

impl Default for ScreenSink {
    fn default() -> Self {
        Self::with_writer(std::io::stdout())
    }
}

impl ScreenSink {
    pub fn stdout() -> Self {
        Self::default()
    }

    /// Sends output to `writer` instead of stdout.
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
            masker: PrivacyMasker::new(),
            colorizer: PatternColorizer::new(),
        }
    }

    /// Formats `[timestamp][TAG] payload\n`.
    ///
    /// Continuation lines are indented under the header, sensitive words are
    /// masked, then color rules are applied to the payload.
    pub fn format(&self, config: &Config, level: Level, payload: &Value, timestamp: &str) -> String {
        let header = format!("[{timestamp}]");
        let tag = if level.is_bold() {
            paint_bold(level.screen_tag(), level.color(), config.colors)
        } else {
            paint(level.screen_tag(), level.color(), config.colors)
        };
        let body = if level.is_emphasized() {
            let text = payload.stringify();
            if level.is_bold() {
                paint_bold(&text, level.color(), config.colors)
            } else {
                paint(&text, level.color(), config.colors)
            }
        } else {
            render(payload, config.colors)
        };
        let indented = indent(&body, header.chars().count() + TAG_WIDTH);
        let masked = self.masker.mask(&indented, &config.blocked_words);
        let colored = if config.colors {
            self.colorizer.colorize(&masked, &config.color_rules)
        } else {
            Cow::Borrowed(&*masked)
        };
        format!("{header}[{tag}] {colored}\n")
    }

    pub fn emit(&self, config: &Config, level: Level, payload: &Value, timestamp: &str) {
        let line = self.format(config, level, payload, timestamp);
        self.write_raw(&line);
    }

    /// Writes `text` as-is. A closed terminal never fails a log call.
    pub fn write_raw(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}
