use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use chrono::Utc;
use derive_from_env::FromEnv;

use crate::time::{TimeFormat, format_timestamp};

/// Process-level settings read from `RLOG_*` environment variables.
#[derive(FromEnv)]
#[from_env(prefix = "RLOG")]
#[allow(non_snake_case)]
pub struct RlogEnv {
    /// Interval between flushes of buffered file output.
    #[from_env(default = "100")]
    pub FLUSH_INTERVAL_MS: u64,
}

pub static RLOG_ENV: LazyLock<RlogEnv> =
    LazyLock::new(|| RlogEnv::from_env().expect("invalid RLOG_* environment variables"));

/// Highlights every match of `pattern` with `color`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorRule {
    pub pattern: String,
    pub color: String,
}

impl ColorRule {
    pub fn new(pattern: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            color: color.into(),
        }
    }
}

/// Highlighting applied when no rules are configured: booleans, IPv4
/// addresses, URLs, dates, e-mails, UUIDs and `w: value` pairs.
pub fn default_color_rules() -> Vec<ColorRule> {
    vec![
        ColorRule::new("false", "red"),
        ColorRule::new("true", "green"),
        ColorRule::new(
            r"((2(5[0-5]|[0-4]\d))|[0-1]?\d{1,2})(\.((2(5[0-5]|[0-4]\d))|[0-1]?\d{1,2})){3}",
            "cyan",
        ),
        ColorRule::new(r"[a-zA-z]+://[^\s]*", "cyan"),
        ColorRule::new(r"\d{4}-\d{1,2}-\d{1,2}", "green"),
        ColorRule::new(r"\w+([-+.]\w+)*@\w+([-.]\w+)*\.\w+([-.]\w+)*", "cyan"),
        ColorRule::new(
            r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
            "cyan",
        ),
        ColorRule::new(r"(w+)s*:s*([^;]+)", "cyan"),
    ]
}

/// Snapshot of the logger settings.
///
/// Pattern lists are shared `Arc` slices: formatters cache their compiled
/// form per list and recompile only when a new list is installed.
#[derive(Debug, Clone)]
pub struct Config {
    pub colors: bool,
    pub log_file_path: Option<PathBuf>,
    pub time_format: TimeFormat,
    pub timezone: Option<String>,
    pub join_char: String,
    pub blocked_words: Arc<[String]>,
    pub color_rules: Arc<[ColorRule]>,
    /// Fixed terminal width for progress rendering; detected when unset.
    pub screen_length: Option<usize>,
    /// Open the log file when the logger is built rather than on first write.
    pub auto_init: bool,
    pub silent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            colors: true,
            log_file_path: None,
            time_format: TimeFormat::default(),
            timezone: None,
            join_char: " ".into(),
            blocked_words: Arc::new([]),
            color_rules: default_color_rules().into(),
            screen_length: None,
            auto_init: true,
            silent: false,
        }
    }
}

impl Config {
    /// Current time rendered with this config's format and time zone.
    pub fn timestamp(&self) -> String {
        format_timestamp(Utc::now(), &self.time_format, self.timezone.as_deref())
    }
}

/// A partial config; `None` fields keep the base value.
#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    pub colors: Option<bool>,
    pub log_file_path: Option<Option<PathBuf>>,
    pub time_format: Option<TimeFormat>,
    pub timezone: Option<Option<String>>,
    pub join_char: Option<String>,
    pub blocked_words: Option<Arc<[String]>>,
    pub color_rules: Option<Arc<[ColorRule]>>,
    pub screen_length: Option<Option<usize>>,
    pub auto_init: Option<bool>,
    pub silent: Option<bool>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        let Self {
            colors,
            log_file_path,
            time_format,
            timezone,
            join_char,
            blocked_words,
            color_rules,
            screen_length,
            auto_init,
            silent,
        } = self;
        colors.is_none()
            && log_file_path.is_none()
            && time_format.is_none()
            && timezone.is_none()
            && join_char.is_none()
            && blocked_words.is_none()
            && color_rules.is_none()
            && screen_length.is_none()
            && auto_init.is_none()
            && silent.is_none()
    }

    /// Returns `base` with every field set in this patch replaced.
    pub fn apply(&self, base: &Config) -> Config {
        let base = base.clone();
        Config {
            colors: self.colors.unwrap_or(base.colors),
            log_file_path: self.log_file_path.clone().unwrap_or(base.log_file_path),
            time_format: self.time_format.clone().unwrap_or(base.time_format),
            timezone: self.timezone.clone().unwrap_or(base.timezone),
            join_char: self.join_char.clone().unwrap_or(base.join_char),
            blocked_words: self.blocked_words.clone().unwrap_or(base.blocked_words),
            color_rules: self.color_rules.clone().unwrap_or(base.color_rules),
            screen_length: self.screen_length.unwrap_or(base.screen_length),
            auto_init: self.auto_init.unwrap_or(base.auto_init),
            silent: self.silent.unwrap_or(base.silent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_compile() {
        for rule in default_color_rules() {
            assert!(regex::Regex::new(&rule.pattern).is_ok(), "{}", rule.pattern);
        }
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let base = Config::default();
        let patch = ConfigPatch {
            silent: Some(true),
            log_file_path: Some(Some("/tmp/x.log".into())),
            ..Default::default()
        };
        let merged = patch.apply(&base);
        assert!(merged.silent);
        assert_eq!(merged.log_file_path, Some(PathBuf::from("/tmp/x.log")));
        assert_eq!(merged.join_char, " ");
        assert!(Arc::ptr_eq(&merged.color_rules, &base.color_rules));
    }

    #[test]
    fn test_patch_can_clear_optional_fields() {
        let base = ConfigPatch {
            timezone: Some(Some("+08:00".into())),
            ..Default::default()
        }
        .apply(&Config::default());
        let cleared = ConfigPatch {
            timezone: Some(None),
            ..Default::default()
        }
        .apply(&base);
        assert_eq!(cleared.timezone, None);
        assert!(ConfigPatch::default().is_empty());
    }
}
