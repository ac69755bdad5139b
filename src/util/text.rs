use std::borrow::Cow;

use unicode_width::UnicodeWidthChar;

const ELLIPSIS: &str = "...";

/// Truncate `s` to at most `max_width` terminal columns, appending "..."
/// when anything was cut.
///
/// Wide characters (CJK, emoji) count as two columns. Widths of three or
/// less have no room for an ellipsis and just cut.
///
/// ```
/// use gator::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    let room = if max_width > ELLIPSIS.len() {
        max_width - ELLIPSIS.len()
    } else {
        max_width
    };

    let mut width = 0;
    let mut cut = None;
    for (idx, c) in s.char_indices() {
        let w = c.width().unwrap_or(0);
        if cut.is_none() && width + w > room {
            cut = Some(idx);
        }
        width += w;
        if width > max_width {
            let end = cut.unwrap_or(idx);
            return if max_width > ELLIPSIS.len() {
                Cow::Owned(format!("{}{ELLIPSIS}", &s[..end]))
            } else {
                Cow::Owned(s[..end].to_string())
            };
        }
    }
    Cow::Borrowed(s)
}

/// Remove ANSI escape sequences and control characters from feed-supplied
/// text before it reaches the terminal.
///
/// Tab, newline and carriage return are kept. Returns borrowed input when
/// there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            // CSI: ESC [ params final-byte
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: ESC ] ... BEL or ESC \
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Single-line preview of a post description: control characters removed,
/// whitespace runs collapsed, truncated to `max_width` columns.
pub fn preview(s: &str, max_width: usize) -> String {
    let clean = strip_control_chars(s);
    let collapsed = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_to_width(&collapsed, max_width).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truncate_fits() {
        assert!(matches!(truncate_to_width("Short", 10), Cow::Borrowed("Short")));
        assert_eq!(truncate_to_width("exactly", 7), "exactly");
        assert_eq!(truncate_to_width("", 5), "");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
        assert_eq!(truncate_to_width("abcdefgh", 7), "abcd...");
    }

    #[test]
    fn test_truncate_narrow_widths() {
        assert_eq!(truncate_to_width("Test", 0), "");
        assert_eq!(truncate_to_width("Test", 1), "T");
        assert_eq!(truncate_to_width("Test", 3), "Tes");
    }

    #[test]
    fn test_truncate_wide_chars() {
        // Each CJK char is two columns
        assert_eq!(truncate_to_width("你好世界", 7), "你好...");
        assert_eq!(truncate_to_width("你好", 4), "你好");
    }

    #[test]
    fn test_strip_clean_text_borrows() {
        assert!(matches!(strip_control_chars("plain text\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_escape_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mred\x1b[0m"), "red");
        assert_eq!(strip_control_chars("\x1b]0;title\x07body"), "body");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\body"), "body");
        assert_eq!(strip_control_chars("a\x00b\x7fc"), "abc");
        assert_eq!(strip_control_chars("tab\tkept"), "tab\tkept");
    }

    #[test]
    fn test_preview_collapses_whitespace() {
        assert_eq!(preview("  line one\n\n  line\ttwo  ", 80), "line one line two");
        assert_eq!(preview("\x1b[1mBold\x1b[0m news today", 10), "Bold ne...");
    }
}
