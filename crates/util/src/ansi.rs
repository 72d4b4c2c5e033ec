//! # ANSI Escape Utilities
//!
//! This module recognizes, strips and emits ANSI escape sequences. It covers
//! CSI sequences (colors, cursor movement), OSC sequences (hyperlinks, window
//! titles), SGR styling with color-depth downsampling, and detection of the
//! color level a terminal stream supports.

use std::env;
use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// The escape character that introduces every sequence.
pub const ESC: char = '\u{1b}';

const OSC_HYPERLINK_CLOSE: &str = "\u{1b}]8;;\u{7}";

/// Error raised when a color value cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    /// Hex colors must be `#rgb` or `#rrggbb`.
    #[error("invalid hex color `{0}`")]
    InvalidHex(String),
    /// The name is neither a known color, a 256-color index nor a hex value.
    #[error("unknown color `{0}`")]
    UnknownColor(String),
}

/// Returns the compiled pattern matching CSI and OSC escape sequences.
///
/// The pattern accepts both the 7-bit (`ESC [`) and 8-bit (`0x9B`) CSI
/// introducers and OSC payloads terminated by BEL, `ESC \` or `0x9C`.
///
/// # Example
/// ```rust
/// use knit_util::ansi::ansi_regex;
///
/// assert!(ansi_regex().is_match("\u{1b}[31mred\u{1b}[39m"));
/// assert!(!ansi_regex().is_match("plain"));
/// ```
pub fn ansi_regex() -> &'static Regex {
    static ANSI_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(concat!(
            r"[\x1B\x{9B}][\[\]()#;?]*(?:",
            r"(?:(?:(?:;[-a-zA-Z\d/#&.:=?%@~_]+)*|[a-zA-Z\d]+(?:;[-a-zA-Z\d/#&.:=?%@~_]*)*)?(?:\x07|\x1B\x5C|\x{9C}))",
            r"|(?:(?:\d{1,4}(?:;\d{0,4})*)?[\dA-PR-TZcf-nq-uy=><~]))",
        ))
        .unwrap()
    });

    &ANSI_PATTERN
}

/// Removes every ANSI escape sequence from `text`.
///
/// # Example
/// ```rust
/// use knit_util::ansi::strip_ansi;
///
/// assert_eq!(strip_ansi("\u{1b}[1mbold\u{1b}[22m text"), "bold text");
/// ```
pub fn strip_ansi(text: &str) -> String {
    if !text.contains([ESC, '\u{9b}']) {
        return text.to_string();
    }
    ansi_regex().replace_all(text, "").into_owned()
}

/// Returns true when `text` contains at least one escape sequence.
pub fn has_ansi(text: &str) -> bool {
    text.contains([ESC, '\u{9b}']) && ansi_regex().is_match(text)
}

/// A piece of text that is either an escape sequence or visible content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnsiSegment<'a> {
    Escape(&'a str),
    Text(&'a str),
}

/// Splits `text` into alternating escape and text segments, in order.
pub fn segments(text: &str) -> Vec<AnsiSegment<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    for found in ansi_regex().find_iter(text) {
        if found.start() > cursor {
            out.push(AnsiSegment::Text(&text[cursor..found.start()]));
        }
        out.push(AnsiSegment::Escape(found.as_str()));
        cursor = found.end();
    }
    if cursor < text.len() {
        out.push(AnsiSegment::Text(&text[cursor..]));
    }
    out
}

/// Tracks which SGR attributes and hyperlink are active while walking text.
///
/// Used by wrapping and slicing to close styles before a cut and re-open
/// them after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleState {
    active: Vec<ActiveCode>,
    hyperlink: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveCode {
    open: String,
    close: u16,
}

impl StyleState {
    /// Updates the state with an escape sequence. Non-SGR sequences other
    /// than OSC 8 hyperlinks are ignored.
    pub fn apply(&mut self, sequence: &str) {
        if let Some(rest) = sequence.strip_prefix("\u{1b}]8;") {
            let payload = rest.trim_end_matches(['\u{7}', '\u{9c}']).trim_end_matches("\u{1b}\\");
            let url = payload.split_once(';').map(|(_, url)| url).unwrap_or("");
            self.hyperlink = if url.is_empty() { None } else { Some(url.to_string()) };
            return;
        }

        let Some(params) = sgr_parameters(sequence) else {
            return;
        };
        let codes: Vec<&str> = params.split(';').collect();
        let mut index = 0;
        while index < codes.len() {
            let code = codes[index].parse::<u16>().unwrap_or(0);
            match code {
                0 => self.active.clear(),
                38 | 48 => {
                    let take = match codes.get(index + 1) {
                        Some(&"5") => 3,
                        Some(&"2") => 5,
                        _ => 1,
                    };
                    let end = (index + take).min(codes.len());
                    let open = format!("\u{1b}[{}m", codes[index..end].join(";"));
                    self.push(open, if code == 38 { 39 } else { 49 });
                    index = end;
                    continue;
                }
                22 | 23 | 24 | 25 | 27 | 28 | 29 | 39 | 49 | 55 => self.active.retain(|entry| entry.close != code),
                other => {
                    if let Some(close) = close_code_for(other) {
                        self.push(format!("\u{1b}[{}m", other), close);
                    }
                }
            }
            index += 1;
        }
    }

    fn push(&mut self, open: String, close: u16) {
        if close == 39 || close == 49 {
            self.active.retain(|entry| entry.close != close);
        }
        self.active.push(ActiveCode { open, close });
    }

    /// True when no attribute or hyperlink is active.
    pub fn is_plain(&self) -> bool {
        self.active.is_empty() && self.hyperlink.is_none()
    }

    /// Sequence that re-establishes the current state from plain text.
    pub fn open_sequence(&self) -> String {
        let mut out: String = self.active.iter().map(|entry| entry.open.as_str()).collect();
        if let Some(url) = &self.hyperlink {
            out.push_str(&format!("\u{1b}]8;;{}\u{7}", url));
        }
        out
    }

    /// Sequence that closes everything currently active.
    pub fn close_sequence(&self) -> String {
        let mut out = String::new();
        if self.hyperlink.is_some() {
            out.push_str(OSC_HYPERLINK_CLOSE);
        }
        let mut closed: Vec<u16> = Vec::new();
        for entry in self.active.iter().rev() {
            if !closed.contains(&entry.close) {
                closed.push(entry.close);
                out.push_str(&format!("\u{1b}[{}m", entry.close));
            }
        }
        out
    }
}

fn sgr_parameters(sequence: &str) -> Option<&str> {
    let body = sequence
        .strip_prefix("\u{1b}[")
        .or_else(|| sequence.strip_prefix('\u{9b}'))?;
    body.strip_suffix('m')
}

fn close_code_for(code: u16) -> Option<u16> {
    match code {
        1 | 2 => Some(22),
        3 => Some(23),
        4 => Some(24),
        5 | 6 => Some(25),
        7 => Some(27),
        8 => Some(28),
        9 => Some(29),
        30..=37 | 90..=97 => Some(39),
        40..=47 | 100..=107 => Some(49),
        53 => Some(55),
        _ => None,
    }
}

/// How many colors a stream can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorLevel {
    None,
    Basic,
    Ansi256,
    TrueColor,
}

/// Output stream used for color support detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Returns the color level supported by `stream`, detected once per stream.
pub fn color_level(stream: Stream) -> ColorLevel {
    static STDOUT_LEVEL: OnceCell<ColorLevel> = OnceCell::new();
    static STDERR_LEVEL: OnceCell<ColorLevel> = OnceCell::new();

    let (cell, is_terminal) = match stream {
        Stream::Stdout => (&STDOUT_LEVEL, std::io::stdout().is_terminal()),
        Stream::Stderr => (&STDERR_LEVEL, std::io::stderr().is_terminal()),
    };
    *cell.get_or_init(|| {
        let level = detect_color_level(|key| env::var(key).ok(), is_terminal);
        debug!(?stream, ?level, "detected terminal color level");
        level
    })
}

/// Decides the color level from environment lookups and terminal status.
///
/// `FORCE_COLOR` wins over everything, then `NO_COLOR`, then the terminal
/// check, then `TERM`/`COLORTERM` capabilities.
pub fn detect_color_level<F>(lookup: F, is_terminal: bool) -> ColorLevel
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(forced) = lookup("FORCE_COLOR") {
        return match forced.trim().to_ascii_lowercase().as_str() {
            "0" | "false" => ColorLevel::None,
            "2" => ColorLevel::Ansi256,
            "3" => ColorLevel::TrueColor,
            _ => ColorLevel::Basic,
        };
    }

    if lookup("NO_COLOR").is_some_and(|value| !value.is_empty()) {
        return ColorLevel::None;
    }

    if !is_terminal {
        return ColorLevel::None;
    }

    let term = lookup("TERM").unwrap_or_default().to_ascii_lowercase();
    if term == "dumb" {
        return ColorLevel::None;
    }

    if cfg!(windows) {
        return if lookup("WT_SESSION").is_some() { ColorLevel::TrueColor } else { ColorLevel::Basic };
    }

    if let Some(colorterm) = lookup("COLORTERM") {
        let colorterm = colorterm.to_ascii_lowercase();
        if colorterm == "truecolor" || colorterm == "24bit" {
            return ColorLevel::TrueColor;
        }
    }

    if term.contains("256") {
        return ColorLevel::Ansi256;
    }

    ColorLevel::Basic
}

/// A foreground or background color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
    Ansi256(u8),
    Rgb(u8, u8, u8),
}

const NAMED_COLORS: [(&str, Color); 16] = [
    ("black", Color::Black),
    ("red", Color::Red),
    ("green", Color::Green),
    ("yellow", Color::Yellow),
    ("blue", Color::Blue),
    ("magenta", Color::Magenta),
    ("cyan", Color::Cyan),
    ("white", Color::White),
    ("bright-black", Color::BrightBlack),
    ("bright-red", Color::BrightRed),
    ("bright-green", Color::BrightGreen),
    ("bright-yellow", Color::BrightYellow),
    ("bright-blue", Color::BrightBlue),
    ("bright-magenta", Color::BrightMagenta),
    ("bright-cyan", Color::BrightCyan),
    ("bright-white", Color::BrightWhite),
];

impl Color {
    /// Parses `#rgb` or `#rrggbb` (the `#` is optional).
    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || ColorError::InvalidHex(hex.to_string());
        if !digits.chars().all(|character| character.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let expanded = match digits.len() {
            3 => digits.chars().flat_map(|character| [character, character]).collect::<String>(),
            6 => digits.to_string(),
            _ => return Err(invalid()),
        };
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&expanded[range], 16).map_err(|_| invalid());
        Ok(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    fn basic_index(self) -> Option<u8> {
        NAMED_COLORS
            .iter()
            .position(|(_, color)| *color == self)
            .map(|index| index as u8)
    }

    /// SGR parameters selecting this color at `level`, or `None` when the
    /// level disables color.
    fn sgr_parameters(self, level: ColorLevel, background: bool) -> Option<String> {
        let offset = if background { 10 } else { 0 };
        let extended = if background { 48 } else { 38 };
        match level {
            ColorLevel::None => None,
            ColorLevel::TrueColor => Some(match self {
                Color::Rgb(red, green, blue) => format!("{};2;{};{};{}", extended, red, green, blue),
                Color::Ansi256(index) => format!("{};5;{}", extended, index),
                named => basic_code(named.basic_index().unwrap_or(7), offset).to_string(),
            }),
            ColorLevel::Ansi256 => Some(match self {
                Color::Rgb(red, green, blue) => format!("{};5;{}", extended, rgb_to_ansi256(red, green, blue)),
                Color::Ansi256(index) => format!("{};5;{}", extended, index),
                named => basic_code(named.basic_index().unwrap_or(7), offset).to_string(),
            }),
            ColorLevel::Basic => Some(
                match self {
                    Color::Rgb(red, green, blue) => ansi256_to_basic(rgb_to_ansi256(red, green, blue)) + offset,
                    Color::Ansi256(index) => ansi256_to_basic(index) + offset,
                    named => basic_code(named.basic_index().unwrap_or(7), offset),
                }
                .to_string(),
            ),
        }
    }
}

fn basic_code(index: u8, offset: u16) -> u16 {
    let index = u16::from(index);
    if index < 8 { 30 + index + offset } else { 90 + (index - 8) + offset }
}

impl FromStr for Color {
    type Err = ColorError;

    /// Accepts color names (`red`, `bright-red`, `redBright`), 256-color
    /// indexes (`208`) and hex values (`#ff8800`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        if normalized.starts_with('#') {
            return Color::from_hex(&normalized);
        }
        if let Ok(index) = normalized.parse::<u8>() {
            return Ok(Color::Ansi256(index));
        }
        let normalized = match normalized.strip_suffix("bright") {
            Some(base) if !base.is_empty() => format!("bright-{}", base.trim_end_matches('-')),
            _ => normalized,
        };
        let normalized = if normalized == "gray" || normalized == "grey" {
            "bright-black".to_string()
        } else {
            normalized
        };
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == normalized)
            .map(|(_, color)| *color)
            .ok_or_else(|| ColorError::UnknownColor(value.to_string()))
    }
}

/// Maps an RGB triple onto the xterm 256-color palette.
///
/// Near-gray colors use the 24-step grayscale ramp, everything else the
/// 6×6×6 cube.
pub fn rgb_to_ansi256(red: u8, green: u8, blue: u8) -> u8 {
    if red == green && green == blue {
        if red < 8 {
            return 16;
        }
        if red > 248 {
            return 231;
        }
        return (((f64::from(red) - 8.0) / 247.0) * 24.0).round() as u8 + 232;
    }
    let scale = |channel: u8| (f64::from(channel) / 255.0 * 5.0).round() as u8;
    16 + 36 * scale(red) + 6 * scale(green) + scale(blue)
}

/// Maps a 256-color index onto a basic foreground SGR code (30–37, 90–97).
pub fn ansi256_to_basic(code: u8) -> u16 {
    if code < 8 {
        return 30 + u16::from(code);
    }
    if code < 16 {
        return 90 + u16::from(code - 8);
    }

    let (red, green, blue) = if code >= 232 {
        let gray = ((f64::from(code) - 232.0) * 10.0 + 8.0) / 255.0;
        (gray, gray, gray)
    } else {
        let cube = code - 16;
        let remainder = cube % 36;
        (
            f64::from(cube / 36) / 5.0,
            f64::from(remainder / 6) / 5.0,
            f64::from(remainder % 6) / 5.0,
        )
    };

    let value = red.max(green).max(blue) * 2.0;
    if value == 0.0 {
        return 30;
    }
    let bits = ((blue.round() as u16) << 2) | ((green.round() as u16) << 1) | red.round() as u16;
    let code = 30 + bits;
    if value == 2.0 { code + 60 } else { code }
}

/// Text attributes with their SGR open and close codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Bold,
    Dim,
    Italic,
    Underline,
    Inverse,
    Hidden,
    Strikethrough,
}

impl Modifier {
    const ALL: [Modifier; 7] = [
        Modifier::Bold,
        Modifier::Dim,
        Modifier::Italic,
        Modifier::Underline,
        Modifier::Inverse,
        Modifier::Hidden,
        Modifier::Strikethrough,
    ];

    pub fn codes(self) -> (u16, u16) {
        match self {
            Modifier::Bold => (1, 22),
            Modifier::Dim => (2, 22),
            Modifier::Italic => (3, 23),
            Modifier::Underline => (4, 24),
            Modifier::Inverse => (7, 27),
            Modifier::Hidden => (8, 28),
            Modifier::Strikethrough => (9, 29),
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// A composable set of colors and modifiers.
///
/// # Example
/// ```rust
/// use knit_util::ansi::{Color, ColorLevel, Style};
///
/// let style = Style::new().fg(Color::Red).bold();
/// assert_eq!(
///     style.paint_with_level("hi", ColorLevel::Basic),
///     "\u{1b}[1m\u{1b}[31mhi\u{1b}[39m\u{1b}[22m"
/// );
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Style {
    foreground: Option<Color>,
    background: Option<Color>,
    modifiers: u8,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fg(mut self, color: Color) -> Self {
        self.foreground = Some(color);
        self
    }

    pub fn bg(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers |= modifier.bit();
        self
    }

    pub fn bold(self) -> Self {
        self.modifier(Modifier::Bold)
    }

    pub fn dim(self) -> Self {
        self.modifier(Modifier::Dim)
    }

    pub fn italic(self) -> Self {
        self.modifier(Modifier::Italic)
    }

    pub fn underline(self) -> Self {
        self.modifier(Modifier::Underline)
    }

    pub fn inverse(self) -> Self {
        self.modifier(Modifier::Inverse)
    }

    pub fn hidden(self) -> Self {
        self.modifier(Modifier::Hidden)
    }

    pub fn strikethrough(self) -> Self {
        self.modifier(Modifier::Strikethrough)
    }

    /// Paints `text` using the color level detected for stdout.
    pub fn paint(&self, text: &str) -> String {
        self.paint_with_level(text, color_level(Stream::Stdout))
    }

    /// Paints `text` for an explicit color level.
    ///
    /// Close codes already inside `text` are followed by this style's open
    /// code again, so nested styles don't end the outer one early. Every line
    /// break is wrapped so the style never bleeds into the next line.
    pub fn paint_with_level(&self, text: &str, level: ColorLevel) -> String {
        if text.is_empty() {
            return String::new();
        }
        let pairs = self.sequence_pairs(level);
        if level == ColorLevel::None || pairs.is_empty() {
            return text.to_string();
        }

        let open: String = pairs.iter().map(|(open, _)| open.as_str()).collect();
        let close: String = pairs.iter().rev().map(|(_, close)| close.as_str()).collect();

        let mut body = text.to_string();
        if body.contains(ESC) {
            for (pair_open, pair_close) in pairs.iter().rev() {
                body = body.replace(pair_close.as_str(), &format!("{}{}", pair_close, pair_open));
            }
        }
        if body.contains('\n') {
            body = encase_line_breaks(&body, &close, &open);
        }

        format!("{}{}{}", open, body, close)
    }

    fn sequence_pairs(&self, level: ColorLevel) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for modifier in Modifier::ALL {
            if self.modifiers & modifier.bit() != 0 {
                let (open, close) = modifier.codes();
                pairs.push((format!("\u{1b}[{}m", open), format!("\u{1b}[{}m", close)));
            }
        }
        if let Some(parameters) = self.foreground.and_then(|color| color.sgr_parameters(level, false)) {
            pairs.push((format!("\u{1b}[{}m", parameters), "\u{1b}[39m".to_string()));
        }
        if let Some(parameters) = self.background.and_then(|color| color.sgr_parameters(level, true)) {
            pairs.push((format!("\u{1b}[{}m", parameters), "\u{1b}[49m".to_string()));
        }
        pairs
    }
}

fn encase_line_breaks(text: &str, close: &str, open: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pieces = text.split('\n').peekable();
    while let Some(piece) = pieces.next() {
        if pieces.peek().is_none() {
            out.push_str(piece);
            break;
        }
        match piece.strip_suffix('\r') {
            Some(stripped) => {
                out.push_str(stripped);
                out.push_str(close);
                out.push_str("\r\n");
            }
            None => {
                out.push_str(piece);
                out.push_str(close);
                out.push('\n');
            }
        }
        out.push_str(open);
    }
    out
}

/// Wraps `text` in an OSC 8 hyperlink pointing at `url`.
pub fn hyperlink(text: &str, url: &str) -> String {
    format!("\u{1b}]8;;{}\u{7}{}{}", url, text, OSC_HYPERLINK_CLOSE)
}

impl fmt::Display for ColorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColorLevel::None => "none",
            ColorLevel::Basic => "basic",
            ColorLevel::Ansi256 => "ansi256",
            ColorLevel::TrueColor => "truecolor",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn strips_csi_and_osc_sequences() {
        assert_eq!(strip_ansi("\u{1b}[4mcake\u{1b}[0m"), "cake");
        assert_eq!(strip_ansi("\u{1b}[38;2;255;0;0mred\u{1b}[39m"), "red");
        assert_eq!(strip_ansi(&hyperlink("docs", "https://example.com")), "docs");
        assert_eq!(strip_ansi("\u{1b}[2K\u{1b}[1Gdone"), "done");
        assert_eq!(strip_ansi("no escapes"), "no escapes");
    }

    #[test]
    fn detects_presence_of_escapes() {
        assert!(has_ansi("\u{1b}[31mx"));
        assert!(!has_ansi("x"));
    }

    #[test]
    fn splits_segments_in_order() {
        let parts = segments("a\u{1b}[1mb\u{1b}[22m");
        assert_eq!(
            parts,
            vec![
                AnsiSegment::Text("a"),
                AnsiSegment::Escape("\u{1b}[1m"),
                AnsiSegment::Text("b"),
                AnsiSegment::Escape("\u{1b}[22m"),
            ]
        );
    }

    #[test]
    fn style_state_tracks_open_and_close_codes() {
        let mut state = StyleState::default();
        state.apply("\u{1b}[31m");
        state.apply("\u{1b}[1m");
        assert_eq!(state.open_sequence(), "\u{1b}[31m\u{1b}[1m");
        assert_eq!(state.close_sequence(), "\u{1b}[22m\u{1b}[39m");

        state.apply("\u{1b}[39m");
        assert_eq!(state.open_sequence(), "\u{1b}[1m");

        state.apply("\u{1b}[0m");
        assert!(state.is_plain());
    }

    #[test]
    fn style_state_keeps_extended_colors_whole() {
        let mut state = StyleState::default();
        state.apply("\u{1b}[38;5;208;1m");
        assert_eq!(state.open_sequence(), "\u{1b}[38;5;208m\u{1b}[1m");
    }

    #[test]
    fn style_state_tracks_hyperlinks() {
        let mut state = StyleState::default();
        state.apply("\u{1b}]8;;https://example.com\u{7}");
        assert_eq!(state.open_sequence(), "\u{1b}]8;;https://example.com\u{7}");
        state.apply(OSC_HYPERLINK_CLOSE);
        assert!(state.is_plain());
    }

    #[test]
    fn paints_with_nested_reopen() {
        let red = Style::new().fg(Color::Red);
        let inner = Style::new().fg(Color::Blue).paint_with_level("blue", ColorLevel::Basic);
        let painted = red.paint_with_level(&format!("a {} b", inner), ColorLevel::Basic);
        assert_eq!(
            painted,
            "\u{1b}[31ma \u{1b}[34mblue\u{1b}[39m\u{1b}[31m b\u{1b}[39m"
        );
    }

    #[test]
    fn paints_each_line_separately() {
        let painted = Style::new().bold().paint_with_level("a\nb", ColorLevel::Basic);
        assert_eq!(painted, "\u{1b}[1ma\u{1b}[22m\n\u{1b}[1mb\u{1b}[22m");
    }

    #[test]
    fn no_color_level_leaves_text_untouched() {
        assert_eq!(Style::new().fg(Color::Red).paint_with_level("x", ColorLevel::None), "x");
        assert_eq!(Style::new().fg(Color::Red).paint_with_level("", ColorLevel::TrueColor), "");
    }

    #[test]
    fn downsamples_rgb_colors() {
        let style = Style::new().fg(Color::Rgb(255, 0, 0));
        assert_eq!(style.paint_with_level("x", ColorLevel::TrueColor), "\u{1b}[38;2;255;0;0mx\u{1b}[39m");
        assert_eq!(style.paint_with_level("x", ColorLevel::Ansi256), "\u{1b}[38;5;196mx\u{1b}[39m");
        assert_eq!(style.paint_with_level("x", ColorLevel::Basic), "\u{1b}[91mx\u{1b}[39m");
        let background = Style::new().bg(Color::Ansi256(196));
        assert_eq!(background.paint_with_level("x", ColorLevel::Basic), "\u{1b}[101mx\u{1b}[49m");
    }

    #[test]
    fn converts_between_palettes() {
        assert_eq!(rgb_to_ansi256(0, 0, 0), 16);
        assert_eq!(rgb_to_ansi256(255, 255, 255), 231);
        assert_eq!(rgb_to_ansi256(128, 128, 128), 244);
        assert_eq!(rgb_to_ansi256(0, 0, 255), 21);
        assert_eq!(ansi256_to_basic(1), 31);
        assert_eq!(ansi256_to_basic(9), 91);
        assert_eq!(ansi256_to_basic(16), 30);
        assert_eq!(ansi256_to_basic(21), 94);
    }

    #[test]
    fn parses_color_names() {
        assert_eq!("red".parse::<Color>(), Ok(Color::Red));
        assert_eq!("redBright".parse::<Color>(), Ok(Color::BrightRed));
        assert_eq!("bright_blue".parse::<Color>(), Ok(Color::BrightBlue));
        assert_eq!("gray".parse::<Color>(), Ok(Color::BrightBlack));
        assert_eq!("208".parse::<Color>(), Ok(Color::Ansi256(208)));
        assert_eq!("#f80".parse::<Color>(), Ok(Color::Rgb(255, 136, 0)));
        assert_eq!(Color::from_hex("#ff8800"), Ok(Color::Rgb(255, 136, 0)));
        assert!(matches!(Color::from_hex("#ff88"), Err(ColorError::InvalidHex(_))));
        assert!(matches!("chartreuse".parse::<Color>(), Err(ColorError::UnknownColor(_))));
    }

    #[test]
    fn detects_color_levels() {
        assert_eq!(detect_color_level(env_of(&[("FORCE_COLOR", "0")]), true), ColorLevel::None);
        assert_eq!(detect_color_level(env_of(&[("FORCE_COLOR", "")]), false), ColorLevel::Basic);
        assert_eq!(detect_color_level(env_of(&[("FORCE_COLOR", "3")]), false), ColorLevel::TrueColor);
        assert_eq!(detect_color_level(env_of(&[("NO_COLOR", "1"), ("TERM", "xterm")]), true), ColorLevel::None);
        assert_eq!(detect_color_level(env_of(&[("TERM", "xterm-256color")]), false), ColorLevel::None);
        assert_eq!(detect_color_level(env_of(&[("TERM", "dumb")]), true), ColorLevel::None);
        if !cfg!(windows) {
            assert_eq!(
                detect_color_level(env_of(&[("TERM", "xterm"), ("COLORTERM", "truecolor")]), true),
                ColorLevel::TrueColor
            );
            assert_eq!(detect_color_level(env_of(&[("TERM", "xterm-256color")]), true), ColorLevel::Ansi256);
            assert_eq!(detect_color_level(env_of(&[("TERM", "xterm")]), true), ColorLevel::Basic);
            assert_eq!(detect_color_level(env_of(&[]), true), ColorLevel::Basic);
        }
    }

    #[test]
    fn unknown_terminal_falls_back_to_basic() {
        assert_eq!(detect_color_level(env_of(&[("TERM", "foo")]), true), ColorLevel::Basic);
        assert_eq!(detect_color_level(env_of(&[("TERM", "foo"), ("CI", "true")]), true), ColorLevel::Basic);
        assert_eq!(detect_color_level(env_of(&[("TERM", "foo")]), false), ColorLevel::None);
    }
}
