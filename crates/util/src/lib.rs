//! Helpers for terminal-facing tools: display width, ANSI styling and
//! wrapping, Git and web URLs, durations, signals and paths.

pub mod ansi;
pub mod git_url;
pub mod path_processing;
pub mod preferences;
pub mod signals;
pub mod text_width;
pub mod text_wrap;
pub mod time_format;
pub mod url_normalize;

pub use ansi::{Color, ColorLevel, Modifier, Stream, Style, color_level, has_ansi, hyperlink, strip_ansi};
pub use git_url::{GitUrlError, HostedGit, Provider, Representation};
pub use path_processing::{
    PathError, RunPathOptions, expand_tilde, find_up, is_dir, is_file, is_path_inside, path_exists, path_key,
    run_path, run_path_env, temp_dir_name, temp_file_name, to_slash,
};
pub use preferences::{ColorChoice, Preferences, PreferencesError, UserPreferences};
pub use signals::{
    SignalInfo, describe_termination, on_exit, run_exit_hooks, signal_by_name, signal_by_number, signals,
    wait_for_shutdown,
};
pub use text_width::{string_width, widest_line};
pub use text_wrap::{TruncateOptions, TruncatePosition, WrapOptions, slice_ansi, truncate, wrap_ansi};
pub use time_format::{DurationError, MsOptions, format_ms, format_ms_long, format_ms_short, parse_duration};
pub use url_normalize::{NormalizeOptions, UrlError, normalize_url};
