//! # Display Width Utilities
//!
//! Terminal cell width of strings. Text is split into extended grapheme
//! clusters and each cluster is measured once: control and default-ignorable
//! characters take no space, emoji sequences take two cells, and everything
//! else follows the East Asian Width of its base character.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

use crate::ansi::strip_ansi;

/// Options controlling how width is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidthOptions {
    /// Count East Asian Ambiguous characters as one cell instead of two.
    pub ambiguous_is_narrow: bool,
    /// Measure escape sequences as visible text instead of stripping them.
    pub count_ansi_escape_codes: bool,
}

impl Default for WidthOptions {
    fn default() -> Self {
        Self {
            ambiguous_is_narrow: true,
            count_ansi_escape_codes: false,
        }
    }
}

/// Returns the number of terminal cells `text` occupies.
///
/// # Example
/// ```rust
/// use knit_util::text_width::string_width;
///
/// assert_eq!(string_width("abc"), 3);
/// assert_eq!(string_width("古"), 2);
/// assert_eq!(string_width("\u{1b}[1m古\u{1b}[22m"), 2);
/// assert_eq!(string_width("👨‍👩‍👧"), 2);
/// ```
pub fn string_width(text: &str) -> usize {
    string_width_with(text, &WidthOptions::default())
}

/// Returns the number of terminal cells `text` occupies under `options`.
pub fn string_width_with(text: &str, options: &WidthOptions) -> usize {
    if text.is_empty() {
        return 0;
    }

    let visible: Cow<'_, str> = if options.count_ansi_escape_codes {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(strip_ansi(text))
    };

    if visible.bytes().all(|byte| (0x20..0x7f).contains(&byte)) {
        return visible.len();
    }

    visible
        .graphemes(true)
        .map(|cluster| cluster_width(cluster, options.ambiguous_is_narrow))
        .sum()
}

/// Width of a single character, zero for control characters.
pub fn char_width(character: char) -> usize {
    if is_control(character) || is_default_ignorable(character) {
        return 0;
    }
    character.width().unwrap_or(0)
}

/// Width of a single grapheme cluster with default options.
pub fn grapheme_width(cluster: &str) -> usize {
    cluster_width(cluster, true)
}

/// Width of the widest `\n`-separated line in `text`.
pub fn widest_line(text: &str) -> usize {
    text.split('\n')
        .map(|line| string_width(line.strip_suffix('\r').unwrap_or(line)))
        .max()
        .unwrap_or(0)
}

fn cluster_width(cluster: &str, ambiguous_is_narrow: bool) -> usize {
    let mut characters = cluster.chars();
    let Some(base) = characters.next() else {
        return 0;
    };

    if is_control(base) {
        return 0;
    }

    if cluster.chars().all(|character| is_default_ignorable(character) || is_combining_only(character)) {
        return 0;
    }

    if is_emoji_cluster(cluster) {
        return 2;
    }

    let base_width = if ambiguous_is_narrow { base.width() } else { base.width_cjk() };
    let mut width = base_width.unwrap_or(0);

    for trailing in characters {
        if ('\u{ff00}'..='\u{ffef}').contains(&trailing) {
            width += trailing.width().unwrap_or(0);
        }
    }

    width
}

fn is_control(character: char) -> bool {
    let code = character as u32;
    code <= 0x1f || (0x7f..=0x9f).contains(&code)
}

fn is_default_ignorable(character: char) -> bool {
    matches!(
        character as u32,
        0x00ad
            | 0x034f
            | 0x061c
            | 0x115f..=0x1160
            | 0x17b4..=0x17b5
            | 0x180b..=0x180f
            | 0x200b..=0x200f
            | 0x202a..=0x202e
            | 0x2060..=0x206f
            | 0x3164
            | 0xfe00..=0xfe0f
            | 0xfeff
            | 0xffa0
            | 0xfff0..=0xfff8
            | 0x1bca0..=0x1bca3
            | 0x1d173..=0x1d17a
            | 0xe0000..=0xe0fff
    )
}

fn is_combining_only(character: char) -> bool {
    character.width() == Some(0)
}

fn is_regional_indicator(character: char) -> bool {
    ('\u{1f1e6}'..='\u{1f1ff}').contains(&character)
}

fn is_skin_tone_modifier(character: char) -> bool {
    ('\u{1f3fb}'..='\u{1f3ff}').contains(&character)
}

fn is_pictographic(character: char) -> bool {
    matches!(
        character as u32,
        0x00a9
            | 0x00ae
            | 0x203c
            | 0x2049
            | 0x2122
            | 0x2139
            | 0x2194..=0x2199
            | 0x21a9..=0x21aa
            | 0x231a..=0x231b
            | 0x2328
            | 0x23cf
            | 0x23e9..=0x23f3
            | 0x23f8..=0x23fa
            | 0x24c2
            | 0x25aa..=0x25ab
            | 0x25b6
            | 0x25c0
            | 0x25fb..=0x25fe
            | 0x2600..=0x27bf
            | 0x2934..=0x2935
            | 0x2b05..=0x2b07
            | 0x2b1b..=0x2b1c
            | 0x2b50
            | 0x2b55
            | 0x3030
            | 0x303d
            | 0x3297
            | 0x3299
            | 0x1f000..=0x1faff
    )
}

fn is_emoji_cluster(cluster: &str) -> bool {
    let Some(base) = cluster.chars().next() else {
        return false;
    };

    if cluster.chars().filter(|character| is_regional_indicator(*character)).count() >= 2 {
        return true;
    }

    if cluster.contains('\u{20e3}') {
        return true;
    }

    if !is_pictographic(base) {
        return false;
    }

    cluster.contains('\u{fe0f}')
        || cluster.contains('\u{200d}')
        || cluster.chars().any(is_skin_tone_modifier)
        || base.width() == Some(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_halfwidth_marks_trailing_a_cluster() {
        assert_eq!(string_width("\u{ff76}\u{ff9e}"), 2);
        assert_eq!(string_width("\u{ff76}\u{ff9e}\u{ff77}"), 3);
        assert_eq!(string_width("e\u{301}"), 1);
    }

    #[test]
    fn measures_ascii_and_empty_strings() {
        assert_eq!(string_width(""), 0);
        assert_eq!(string_width("abcde"), 5);
        assert_eq!(string_width("a b"), 3);
    }

    #[test]
    fn measures_east_asian_wide_characters() {
        assert_eq!(string_width("古池や"), 6);
        assert_eq!(string_width("안녕하세요"), 10);
        assert_eq!(string_width("ｱｲｳ"), 3);
        assert_eq!(string_width("ＡＢ"), 4);
    }

    #[test]
    fn ignores_ansi_escape_codes_by_default() {
        assert_eq!(string_width("\u{1b}[31mred\u{1b}[39m"), 3);
        let counted = WidthOptions {
            count_ansi_escape_codes: true,
            ..WidthOptions::default()
        };
        assert_eq!(string_width_with("\u{1b}[31mx", &counted), 5);
    }

    #[test]
    fn control_and_zero_width_characters_take_no_space() {
        assert_eq!(string_width("\u{7}"), 0);
        assert_eq!(string_width("a\u{200b}b"), 2);
        assert_eq!(string_width("\u{feff}"), 0);
        assert_eq!(string_width("\u{0301}"), 0);
        assert_eq!(string_width("e\u{0301}"), 1);
        assert_eq!(string_width("x\u{9f}"), 1);
    }

    #[test]
    fn ambiguous_width_follows_options() {
        let wide = WidthOptions {
            ambiguous_is_narrow: false,
            ..WidthOptions::default()
        };
        assert_eq!(string_width("\u{2022}"), 1);
        assert_eq!(string_width_with("\u{2022}", &wide), 2);
    }

    #[test]
    fn emoji_sequences_are_two_cells() {
        assert_eq!(string_width("🦄"), 2);
        assert_eq!(string_width("❤\u{fe0f}"), 2);
        assert_eq!(string_width("👍🏽"), 2);
        assert_eq!(string_width("🇺🇸"), 2);
        assert_eq!(string_width("1\u{fe0f}\u{20e3}"), 2);
        assert_eq!(string_width("👩\u{200d}💻"), 2);
        assert_eq!(string_width("🦄🦄"), 4);
    }

    #[test]
    fn text_presentation_symbols_stay_narrow() {
        assert_eq!(string_width("\u{2764}"), 1);
        assert_eq!(string_width("©"), 1);
    }

    #[test]
    fn widest_line_measures_each_line() {
        assert_eq!(widest_line("a\nbcd\nef"), 3);
        assert_eq!(widest_line("古古\r\nabc"), 4);
        assert_eq!(widest_line(""), 0);
    }

    #[test]
    fn char_and_grapheme_widths() {
        assert_eq!(char_width('a'), 1);
        assert_eq!(char_width('古'), 2);
        assert_eq!(char_width('\n'), 0);
        assert_eq!(grapheme_width("🇯🇵"), 2);
    }
}
