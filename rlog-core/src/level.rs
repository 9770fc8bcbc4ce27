use std::fmt;

use colored::Color;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
    Success,
    Exit,
}

impl Level {
    /// Fixed-width tag shown on screen.
    pub fn screen_tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARN",
            Level::Error => "ERR!",
            Level::Success => "SUCC",
            Level::Exit => "EXIT",
        }
    }

    /// Tag written to the log file.
    pub fn file_tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARN",
            Level::Error => "ERROR",
            Level::Success => "SUCCESS",
            Level::Exit => "EXIT",
        }
    }

    pub fn color(self) -> Color {
        match self {
            Level::Info => Color::Cyan,
            Level::Warning => Color::Yellow,
            Level::Error | Level::Exit => Color::Red,
            Level::Success => Color::Green,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, Level::Exit)
    }

    /// Levels whose whole payload is painted in the level color instead of
    /// being colored by value kind.
    pub fn is_emphasized(self) -> bool {
        matches!(self, Level::Success | Level::Exit)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_tag())
    }
}
