//! ANSI painting and the pattern colorizer.
//!
//! The colorizer highlights substrings matching an ordered list of
//! [`ColorRule`]s without breaking colors that are already present in the
//! text: after each highlighted match it restores whatever colors were active
//! at that point instead of resetting to the terminal default.

use std::{
    borrow::Cow,
    str::FromStr,
    sync::{Arc, LazyLock},
};

use colored::Color;
use regex::{Captures, Regex};

use crate::{cache::CompiledCache, config::ColorRule};

/// Resets the foreground color only.
pub const RESET_FG: &str = "\x1b[39m";
/// Resets every attribute.
pub const RESET_ALL: &str = "\x1b[0m";

static ANSI_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("escape sequence pattern is valid"));

/// Resolves a color name such as `"cyan"` or `"gray"`.
pub fn resolve_color(name: &str) -> Option<Color> {
    match name.trim().to_ascii_lowercase().as_str() {
        "gray" | "grey" => Some(Color::BrightBlack),
        other => Color::from_str(other).ok(),
    }
}

/// Escape sequence that switches the foreground to `color`.
pub fn start_token(color: Color) -> String {
    format!("\x1b[{}m", color.to_fg_str())
}

/// Wraps `text` in `color`, closing with a foreground reset.
pub fn paint(text: &str, color: Color, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }
    format!("{}{text}{RESET_FG}", start_token(color))
}

/// Bold variant of [`paint`]; closes with a full reset.
pub fn paint_bold(text: &str, color: Color, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }
    format!("\x1b[1;{}m{text}{RESET_ALL}", color.to_fg_str())
}

/// Removes every color escape from `text`.
pub fn strip_colors(text: &str) -> Cow<'_, str> {
    ANSI_COLOR.replace_all(text, "")
}

struct CompiledRule {
    regex: Regex,
    start: String,
}

impl CompiledRule {
    /// Rules with a bad pattern or an unknown color never match.
    fn compile(rule: &ColorRule) -> Option<Self> {
        let color = resolve_color(&rule.color)?;
        let regex = Regex::new(&rule.pattern).ok()?;
        Some(Self {
            regex,
            start: start_token(color),
        })
    }
}

/// Applies color rules to text, caching compiled rules per rule list.
#[derive(Default)]
pub struct PatternColorizer {
    cache: CompiledCache<ColorRule, Option<CompiledRule>>,
}

impl PatternColorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn colorize<'a>(&self, text: &'a str, rules: &Arc<[ColorRule]>) -> Cow<'a, str> {
        if text.is_empty() || rules.is_empty() {
            return Cow::Borrowed(text);
        }
        let compiled = self.cache.get_or_compile(rules, CompiledRule::compile);
        Cow::Owned(colorize_segments(text, &compiled))
    }
}

fn colorize_segments(text: &str, rules: &[Option<CompiledRule>]) -> String {
    let mut result = String::with_capacity(text.len());
    let mut active: Vec<&str> = Vec::new();
    let mut cursor = 0;
    for escape in ANSI_COLOR.find_iter(text) {
        colorize_plain(&text[cursor..escape.start()], rules, &active, &mut result);
        let token = escape.as_str();
        if token == RESET_FG || token == RESET_ALL {
            active.clear();
        } else {
            active.push(token);
        }
        result.push_str(token);
        cursor = escape.end();
    }
    colorize_plain(&text[cursor..], rules, &active, &mut result);
    result
}

fn colorize_plain(segment: &str, rules: &[Option<CompiledRule>], active: &[&str], out: &mut String) {
    if segment.is_empty() {
        return;
    }
    let restore = if active.is_empty() {
        Cow::Borrowed(RESET_FG)
    } else {
        Cow::Owned(active.concat())
    };
    let mut processed = Cow::Borrowed(segment);
    for rule in rules.iter().flatten() {
        let replaced = match rule.regex.replace_all(&processed, |caps: &Captures| {
            format!("{}{}{}", rule.start, &caps[0], restore)
        }) {
            Cow::Owned(replaced) => Some(replaced),
            Cow::Borrowed(_) => None,
        };
        if let Some(replaced) = replaced {
            processed = Cow::Owned(replaced);
        }
    }
    out.push_str(&processed);
}
