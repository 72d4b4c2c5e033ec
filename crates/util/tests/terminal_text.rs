use knit_util::ansi::{Color, ColorLevel, Style, strip_ansi};
use knit_util::text_width::{string_width, widest_line};
use knit_util::text_wrap::{TruncateOptions, TruncatePosition, WrapOptions, slice_ansi, truncate, wrap_ansi};

#[test]
fn painted_text_wraps_with_style_on_every_row() {
    let painted = Style::new().fg(Color::Red).paint_with_level("hello world", ColorLevel::Basic);
    let wrapped = wrap_ansi(&painted, 5, &WrapOptions::default());

    assert_eq!(strip_ansi(&wrapped), "hello\nworld");
    let rows: Vec<&str> = wrapped.split('\n').collect();
    assert_eq!(rows, vec!["\u{1b}[31mhello\u{1b}[39m", "\u{1b}[31mworld\u{1b}[39m"]);
    assert_eq!(widest_line(&wrapped), 5);
}

#[test]
fn wrapped_rows_never_exceed_columns_with_hard_breaks() {
    let text = "古池や 蛙飛び込む 水の音 and a verylongwordthatmustbreak";
    let options = WrapOptions {
        hard: true,
        ..WrapOptions::default()
    };
    let wrapped = wrap_ansi(text, 8, &options);
    for row in wrapped.split('\n') {
        assert!(string_width(row) <= 8, "row {:?} is too wide", row);
    }
    assert_eq!(wrapped.replace('\n', "").replace(' ', ""), text.replace(' ', ""));
}

#[test]
fn truncation_keeps_styles_balanced() {
    let painted = Style::new().bold().paint_with_level("unicorns and rainbows", ColorLevel::Basic);
    let options = TruncateOptions {
        position: TruncatePosition::Middle,
        ..TruncateOptions::default()
    };
    let truncated = truncate(&painted, 9, &options);

    assert_eq!(string_width(&truncated), 9);
    assert_eq!(strip_ansi(&truncated), "unic…bows");
    assert!(truncated.starts_with("\u{1b}[1m"));
    assert!(truncated.ends_with("\u{1b}[22m"));
}

#[test]
fn slicing_wide_characters_measures_cells() {
    assert_eq!(slice_ansi("古池や", 2, Some(4)), "池");
    assert_eq!(slice_ansi("古池や", 1, Some(4)), "池");
    assert_eq!(slice_ansi("古池や", 0, Some(3)), "古");
}
