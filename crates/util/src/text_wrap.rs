//! # ANSI-aware Wrapping and Truncation
//!
//! Word wrapping, column slicing and truncation that measure text with
//! [`string_width`] and keep escape sequences intact. Styles that are active
//! where a line is broken or a slice is cut are closed at the cut and
//! re-opened afterwards, so every produced row renders on its own.

use unicode_segmentation::UnicodeSegmentation;

use crate::ansi::{AnsiSegment, StyleState, segments};
use crate::text_width::string_width;

/// Options for [`wrap_ansi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapOptions {
    /// Break words longer than the column count at the column boundary.
    pub hard: bool,
    /// Wrap at word boundaries. When false, rows are filled to exactly
    /// `columns` cells regardless of words.
    pub word_wrap: bool,
    /// Remove leading and trailing whitespace from produced rows.
    pub trim: bool,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            hard: false,
            word_wrap: true,
            trim: true,
        }
    }
}

/// Wraps `text` to `columns` cells per row.
///
/// # Example
/// ```rust
/// use knit_util::text_wrap::{WrapOptions, wrap_ansi};
///
/// let wrapped = wrap_ansi("The quick brown fox", 10, &WrapOptions::default());
/// assert_eq!(wrapped, "The quick\nbrown fox");
/// ```
pub fn wrap_ansi(text: &str, columns: usize, options: &WrapOptions) -> String {
    let columns = columns.max(1);
    text.replace("\r\n", "\n")
        .split('\n')
        .map(|line| wrap_line(line, columns, options))
        .collect::<Vec<_>>()
        .join("\n")
}

fn wrap_line(line: &str, columns: usize, options: &WrapOptions) -> String {
    if options.trim && line.trim().is_empty() {
        return String::new();
    }

    let words: Vec<&str> = line.split(' ').collect();
    let lengths: Vec<usize> = words.iter().map(|word| string_width(word)).collect();
    let mut rows: Vec<String> = vec![String::new()];

    for (index, word) in words.iter().enumerate() {
        if options.trim {
            trim_last_row_start(&mut rows);
        }

        let mut row_length = last_row_width(&rows);

        if index != 0 {
            if row_length >= columns && (!options.word_wrap || !options.trim) {
                rows.push(String::new());
                row_length = 0;
            }
            if row_length > 0 || !options.trim {
                push_to_last_row(&mut rows, " ");
                row_length += 1;
            }
        }

        let length = lengths[index];

        if options.hard && length > columns {
            let remaining = columns.saturating_sub(row_length);
            let breaks_starting_this_line = 1 + (length - remaining - 1) / columns;
            let breaks_starting_next_line = (length - 1) / columns;
            if breaks_starting_next_line < breaks_starting_this_line {
                rows.push(String::new());
            }
            wrap_word(&mut rows, word, columns);
            continue;
        }

        if row_length + length > columns && row_length > 0 && length > 0 {
            if !options.word_wrap && row_length < columns {
                wrap_word(&mut rows, word, columns);
                continue;
            }
            rows.push(String::new());
        }

        if row_length + length > columns && !options.word_wrap {
            wrap_word(&mut rows, word, columns);
            continue;
        }

        push_to_last_row(&mut rows, word);
    }

    let rows: Vec<String> = if options.trim {
        rows.iter().map(|row| trim_visible_spaces_right(row)).collect()
    } else {
        rows
    };

    carry_styles_across_breaks(&rows.join("\n"))
}

fn last_row_width(rows: &[String]) -> usize {
    rows.last().map(|row| string_width(row)).unwrap_or(0)
}

fn push_to_last_row(rows: &mut Vec<String>, text: &str) {
    match rows.last_mut() {
        Some(row) => row.push_str(text),
        None => rows.push(text.to_string()),
    }
}

fn trim_last_row_start(rows: &mut [String]) {
    if let Some(row) = rows.last_mut() {
        let trimmed = row.trim_start();
        if trimmed.len() != row.len() {
            *row = trimmed.to_string();
        }
    }
}

/// Breaks a single word across rows, character by character.
fn wrap_word(rows: &mut Vec<String>, word: &str, columns: usize) {
    let mut pieces: Vec<(&str, bool)> = Vec::new();
    for segment in segments(word) {
        match segment {
            AnsiSegment::Escape(code) => pieces.push((code, true)),
            AnsiSegment::Text(text) => pieces.extend(text.graphemes(true).map(|cluster| (cluster, false))),
        }
    }

    let mut visible = last_row_width(rows);
    let total = pieces.len();

    for (index, (piece, is_escape)) in pieces.into_iter().enumerate() {
        if is_escape {
            push_to_last_row(rows, piece);
            continue;
        }

        let width = string_width(piece);
        if visible + width <= columns {
            push_to_last_row(rows, piece);
        } else {
            rows.push(piece.to_string());
            visible = 0;
        }

        visible += width;
        if visible == columns && index + 1 < total {
            rows.push(String::new());
            visible = 0;
        }
    }

    // A trailing row holding only escape codes belongs to the previous row.
    if visible == 0 && rows.len() > 1 && rows.last().is_some_and(|row| !row.is_empty()) {
        if let Some(tail) = rows.pop()
            && let Some(previous) = rows.last_mut()
        {
            previous.push_str(&tail);
        }
    }
}

/// Removes trailing spaces while keeping trailing escape codes in place.
fn trim_visible_spaces_right(row: &str) -> String {
    let words: Vec<&str> = row.split(' ').collect();
    let mut last = words.len();
    while last > 0 && string_width(words[last - 1]) == 0 {
        last -= 1;
    }
    if last == words.len() {
        return row.to_string();
    }
    format!("{}{}", words[..last].join(" "), words[last..].concat())
}

fn carry_styles_across_breaks(text: &str) -> String {
    if !text.contains('\n') || !text.contains(crate::ansi::ESC) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut state = StyleState::default();
    for segment in segments(text) {
        match segment {
            AnsiSegment::Escape(code) => {
                out.push_str(code);
                state.apply(code);
            }
            AnsiSegment::Text(chunk) => {
                for character in chunk.chars() {
                    if character == '\n' {
                        out.push_str(&state.close_sequence());
                        out.push('\n');
                        out.push_str(&state.open_sequence());
                    } else {
                        out.push(character);
                    }
                }
            }
        }
    }
    out
}

/// Returns the part of `text` between visible columns `start` and `end`.
///
/// Styles opened before `start` are re-emitted at the head of the slice and
/// styles still open at the cut are closed at the tail. A wide character
/// that straddles either boundary is left out.
///
/// # Example
/// ```rust
/// use knit_util::text_wrap::slice_ansi;
///
/// assert_eq!(slice_ansi("unicorn", 2, Some(5)), "ico");
/// assert_eq!(
///     slice_ansi("\u{1b}[31municorn\u{1b}[39m", 2, Some(5)),
///     "\u{1b}[31mico\u{1b}[39m"
/// );
/// ```
pub fn slice_ansi(text: &str, start: usize, end: Option<usize>) -> String {
    if end.is_some_and(|end| end <= start) {
        return String::new();
    }

    let mut out = String::new();
    let mut state = StyleState::default();
    let mut position = 0usize;
    let mut started = false;

    'walk: for segment in segments(text) {
        match segment {
            AnsiSegment::Escape(code) => {
                if started {
                    out.push_str(code);
                }
                state.apply(code);
            }
            AnsiSegment::Text(chunk) => {
                for cluster in chunk.graphemes(true) {
                    let width = string_width(cluster);
                    if end.is_some_and(|end| position + width > end) {
                        break 'walk;
                    }
                    if position >= start {
                        if !started {
                            out.push_str(&state.open_sequence());
                            started = true;
                        }
                        out.push_str(cluster);
                    }
                    position += width;
                }
            }
        }
    }

    if started {
        out.push_str(&state.close_sequence());
    }
    out
}

/// Where the ellipsis goes when [`truncate`] shortens text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TruncatePosition {
    Start,
    Middle,
    #[default]
    End,
}

/// Options for [`truncate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateOptions {
    pub position: TruncatePosition,
    /// Text inserted where content was removed.
    pub ellipsis: String,
    /// Separate the ellipsis from the kept text with a space.
    pub space: bool,
    /// Move the cut up to three characters to land on a space.
    pub prefer_truncation_on_space: bool,
}

impl Default for TruncateOptions {
    fn default() -> Self {
        Self {
            position: TruncatePosition::End,
            ellipsis: "…".to_string(),
            space: false,
            prefer_truncation_on_space: false,
        }
    }
}

/// Shortens `text` to at most `columns` cells, inserting an ellipsis.
///
/// # Example
/// ```rust
/// use knit_util::text_wrap::{TruncateOptions, TruncatePosition, truncate};
///
/// assert_eq!(truncate("unicorn", 4, &TruncateOptions::default()), "uni…");
/// let start = TruncateOptions { position: TruncatePosition::Start, ..TruncateOptions::default() };
/// assert_eq!(truncate("unicorn", 4, &start), "…orn");
/// ```
pub fn truncate(text: &str, columns: usize, options: &TruncateOptions) -> String {
    let mut ellipsis = options.ellipsis.clone();

    if columns < 1 {
        return String::new();
    }
    if columns == 1 {
        return ellipsis;
    }

    let length = string_width(text);
    if length <= columns {
        return text.to_string();
    }

    match options.position {
        TruncatePosition::Start => {
            if options.prefer_truncation_on_space {
                let nearest = nearest_space(text, length - columns + 1, true);
                return format!("{}{}", ellipsis, slice_ansi(text, nearest, Some(length)).trim());
            }
            if options.space {
                ellipsis.push(' ');
            }
            let from = length - columns + string_width(&ellipsis);
            format!("{}{}", ellipsis, slice_ansi(text, from, Some(length)))
        }
        TruncatePosition::Middle => {
            if options.space {
                ellipsis = format!(" {} ", ellipsis);
            }
            let half = columns / 2;
            if options.prefer_truncation_on_space {
                let first_break = nearest_space(text, half, false);
                let second_break = nearest_space(text, length - (columns - half) + 1, true);
                return format!(
                    "{}{}{}",
                    slice_ansi(text, 0, Some(first_break)),
                    ellipsis,
                    slice_ansi(text, second_break, Some(length)).trim()
                );
            }
            let from = length - (columns - half) + string_width(&ellipsis);
            format!("{}{}{}", slice_ansi(text, 0, Some(half)), ellipsis, slice_ansi(text, from, Some(length)))
        }
        TruncatePosition::End => {
            if options.prefer_truncation_on_space {
                let nearest = nearest_space(text, columns - 1, false);
                return format!("{}{}", slice_ansi(text, 0, Some(nearest)), ellipsis);
            }
            if options.space {
                ellipsis = format!(" {}", ellipsis);
            }
            let keep = columns.saturating_sub(string_width(&ellipsis));
            format!("{}{}", slice_ansi(text, 0, Some(keep)), ellipsis)
        }
    }
}

/// Index of a space at or within three characters of `wanted`, searching
/// right or left, falling back to `wanted`.
fn nearest_space(text: &str, wanted: usize, search_right: bool) -> usize {
    let characters: Vec<char> = text.chars().collect();
    let is_space = |index: usize| characters.get(index) == Some(&' ');

    if is_space(wanted) {
        return wanted;
    }
    for step in 0..=3 {
        let candidate = if search_right { wanted.checked_add(step) } else { wanted.checked_sub(step) };
        if let Some(candidate) = candidate
            && is_space(candidate)
        {
            return candidate;
        }
    }
    wanted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hard() -> WrapOptions {
        WrapOptions {
            hard: true,
            ..WrapOptions::default()
        }
    }

    #[test]
    fn wraps_at_word_boundaries() {
        let wrapped = wrap_ansi("The quick brown fox jumped over the lazy dog", 20, &WrapOptions::default());
        assert_eq!(wrapped, "The quick brown fox\njumped over the lazy\ndog");
    }

    #[test]
    fn keeps_long_words_whole_unless_hard() {
        assert_eq!(
            wrap_ansi("a supercalifragilistic word", 10, &WrapOptions::default()),
            "a\nsupercalifragilistic\nword"
        );
        assert_eq!(wrap_ansi("abcdefghij", 4, &hard()), "abcd\nefgh\nij");
    }

    #[test]
    fn hard_wrap_starts_long_words_where_fewer_breaks_result() {
        assert_eq!(wrap_ansi("ab cdefgh", 4, &hard()), "ab\ncdef\ngh");
        assert_eq!(wrap_ansi("a bcdefg", 4, &hard()), "a bc\ndefg");
    }

    #[test]
    fn fills_rows_exactly_without_word_wrap() {
        let options = WrapOptions {
            word_wrap: false,
            ..WrapOptions::default()
        };
        assert_eq!(wrap_ansi("abc defgh", 4, &options), "abc\ndefg\nh");
    }

    #[test]
    fn preserves_existing_line_breaks_and_trims_blank_lines() {
        assert_eq!(wrap_ansi("ab\r\n   \ncd", 10, &WrapOptions::default()), "ab\n\ncd");
    }

    #[test]
    fn keeps_whitespace_when_not_trimming() {
        let options = WrapOptions {
            trim: false,
            ..WrapOptions::default()
        };
        assert_eq!(wrap_ansi("  ab", 10, &options), "  ab");
    }

    #[test]
    fn reopens_styles_after_wrapped_breaks() {
        let wrapped = wrap_ansi("\u{1b}[31mred text here\u{1b}[39m", 8, &WrapOptions::default());
        assert_eq!(wrapped, "\u{1b}[31mred text\u{1b}[39m\n\u{1b}[31mhere\u{1b}[39m");
    }

    #[test]
    fn measures_wide_characters_when_wrapping() {
        assert_eq!(wrap_ansi("古池や 蛙飛び込む", 6, &WrapOptions::default()), "古池や\n蛙飛び込む");
        assert_eq!(wrap_ansi("古池や蛙", 4, &hard()), "古池\nや蛙");
    }

    #[test]
    fn slices_by_visible_columns() {
        assert_eq!(slice_ansi("unicorn", 0, Some(3)), "uni");
        assert_eq!(slice_ansi("unicorn", 4, None), "orn");
        assert_eq!(slice_ansi("unicorn", 3, Some(3)), "");
        assert_eq!(slice_ansi("古池や", 1, Some(4)), "池");
    }

    #[test]
    fn slices_reopen_styles_at_head() {
        let text = "\u{1b}[1mbold\u{1b}[22m plain";
        assert_eq!(slice_ansi(text, 2, Some(6)), "\u{1b}[1mld\u{1b}[22m p");
    }

    #[test]
    fn truncates_at_each_position() {
        let options = TruncateOptions::default();
        assert_eq!(truncate("unicorn", 4, &options), "uni…");
        assert_eq!(truncate("unicorn", 20, &options), "unicorn");
        assert_eq!(truncate("unicorn", 1, &options), "…");
        assert_eq!(truncate("unicorn", 0, &options), "");

        let middle = TruncateOptions {
            position: TruncatePosition::Middle,
            ..TruncateOptions::default()
        };
        assert_eq!(truncate("unicorn", 5, &middle), "un…rn");
    }

    #[test]
    fn truncation_spacing_and_space_preference() {
        let spaced = TruncateOptions {
            space: true,
            ..TruncateOptions::default()
        };
        assert_eq!(truncate("unicorns", 5, &spaced), "uni …");

        let on_space = TruncateOptions {
            prefer_truncation_on_space: true,
            ..TruncateOptions::default()
        };
        assert_eq!(truncate("unicorns are awesome", 15, &on_space), "unicorns are…");
    }

    #[test]
    fn truncation_preserves_styles() {
        let text = "\u{1b}[31municorn\u{1b}[39m";
        assert_eq!(truncate(text, 4, &TruncateOptions::default()), "\u{1b}[31muni\u{1b}[39m…");
    }
}
