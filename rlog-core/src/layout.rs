use std::borrow::Cow;

use colored::Color;

use crate::color::paint;

/// Indents every line but the first by `width` spaces so multi-line payloads
/// line up under a `[timestamp][LEVEL] ` header.
pub fn indent(text: &str, width: usize) -> Cow<'_, str> {
    if !text.contains('\n') {
        return Cow::Borrowed(text);
    }
    let padding = " ".repeat(width);
    let mut lines = text.split('\n');
    let mut indented = String::with_capacity(text.len() + width * 4);
    indented.push_str(lines.next().unwrap_or_default());
    for line in lines {
        indented.push('\n');
        indented.push_str(&padding);
        indented.push_str(line);
    }
    Cow::Owned(indented)
}

/// Width of the `[` `TAG` `] ` decoration following the time header.
pub const TAG_WIDTH: usize = 7;

fn ratio(num: u64, max: u64) -> f64 {
    if max == 0 {
        return 1.0;
    }
    (num as f64 / max as f64).clamp(0.0, 1.0)
}

/// Number of filled bar cells, always within `0..=available`.
pub fn filled_length(num: u64, max: u64, available: usize) -> usize {
    ((available as f64 * ratio(num, max)).floor() as usize).min(available)
}

/// Builds the single updating progress line.
///
/// Layout: `\r[time][PROG] [||||    ] 50% 50/100`. The bar takes whatever the
/// terminal leaves after the header, percentage and counter; when one column
/// or less remains, the bar is left out.
pub fn format_progress(time_header: &str, num: u64, max: u64, columns: usize, colors: bool) -> String {
    let percent = format!("{:>4}", format!("{}%", (100.0 * ratio(num, max)).floor() as u64));
    let max_str = max.to_string();
    let state = format!("{num:>width$}/{max_str}", width = max_str.len());
    let tag = paint("PROG", Color::Magenta, colors);
    let decorations = time_header.chars().count() + 6 + 3 + state.len() + 1 + percent.len();
    let available = columns.saturating_sub(decorations);
    if available <= 1 {
        format!("\r{time_header}[{tag}] {percent} {state}")
    } else {
        let done = filled_length(num, max, available);
        format!(
            "\r{time_header}[{tag}] [{}{}]{percent} {state}",
            "|".repeat(done),
            " ".repeat(available - done)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_single_line_borrowed() {
        assert!(matches!(indent("one line", 4), Cow::Borrowed("one line")));
    }

    #[test]
    fn test_indent_continuation_lines() {
        assert_eq!(indent("1\n22\n333", 3), "1\n   22\n   333");
        assert_eq!(indent("a\n", 2), "a\n  ");
    }

    #[test]
    fn test_filled_length_bounds() {
        assert_eq!(filled_length(50, 100, 41), 20);
        assert_eq!(filled_length(0, 100, 41), 0);
        assert_eq!(filled_length(150, 100, 41), 41);
        assert_eq!(filled_length(3, 0, 10), 10);
    }

    #[test]
    fn test_progress_half() {
        let header = "[12:00]";
        let line = format_progress(header, 50, 100, 80, false);
        // 80 - 7 - 6 - 3 - 7 - 1 - 4
        let available = 52;
        let expected = format!(
            "\r[12:00][PROG] [{}{}] 50%  50/100",
            "|".repeat(26),
            " ".repeat(available - 26)
        );
        assert_eq!(line, expected);
    }

    #[test]
    fn test_progress_narrow_terminal_drops_bar() {
        let line = format_progress("[12:00]", 5, 10, 20, false);
        assert_eq!(line, "\r[12:00][PROG]  50%  5/10");
    }

    #[test]
    fn test_progress_colored_tag() {
        let line = format_progress("[t]", 1, 1, 0, true);
        assert!(line.contains("[\x1b[35mPROG\x1b[39m]"));
        assert!(line.ends_with("100% 1/1"));
    }
}
