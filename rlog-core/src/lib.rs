//! # rlog-core
//! Formatting layer shared by rlog: pattern colorization, privacy masking,
//! value rendering and line layout. Nothing in here performs I/O.

mod cache;
mod color;
mod config;
mod error;
mod layout;
mod level;
mod privacy;
mod time;
mod value;

pub use color::{
    PatternColorizer, RESET_ALL, RESET_FG, paint, paint_bold, resolve_color, start_token,
    strip_colors,
};
pub use colored::Color;
pub use config::{ColorRule, Config, ConfigPatch, RLOG_ENV, RlogEnv, default_color_rules};
pub use error::FormatError;
pub use layout::{TAG_WIDTH, filled_length, format_progress, indent};
pub use level::Level;
pub use privacy::{PrivacyMasker, compile_pattern};
pub use time::{
    DEFAULT_TIME_FORMAT, TimeFormat, Zone, format_timestamp, parse_timezone, resolve_timezone,
};
pub use value::{Args, CIRCULAR_SENTINEL, SharedValue, Value, render};
