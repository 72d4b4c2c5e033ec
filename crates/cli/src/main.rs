use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use knit_util::ansi::{Color, Stream, Style, hyperlink, strip_ansi};
use knit_util::git_url::HostedGit;
use knit_util::path_processing::{RunPathOptions, run_path};
use knit_util::preferences::{ColorChoice, Preferences, UserPreferences};
use knit_util::signals::{describe_termination, signal_by_name, signal_by_number, signals, wait_for_shutdown};
use knit_util::text_width::{WidthOptions, string_width_with};
use knit_util::text_wrap::{TruncateOptions, TruncatePosition, WrapOptions, truncate, wrap_ansi};
use knit_util::time_format::{MsOptions, format_ms, format_ms_long, format_ms_short, parse_duration};
use knit_util::url_normalize::normalize_url;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_WRAP_WIDTH: usize = 80;

#[derive(Debug, Parser)]
#[command(name = "knit", version, about = "Terminal text, URL, duration, signal and path helpers")]
struct Cli {
    /// When to emit ANSI colors.
    #[arg(long, value_enum, global = true)]
    color: Option<ColorArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Auto => ColorChoice::Auto,
            ColorArg::Always => ColorChoice::Always,
            ColorArg::Never => ColorChoice::Never,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the display width of TEXT in terminal cells.
    Width {
        text: Option<String>,
        /// Count East Asian ambiguous characters as two cells.
        #[arg(long)]
        wide_ambiguous: bool,
        /// Measure escape sequences instead of ignoring them.
        #[arg(long)]
        count_ansi: bool,
    },
    /// Remove ANSI escape sequences.
    Strip { text: Option<String> },
    /// Wrap text to a column count, keeping styles intact.
    Wrap(WrapArgs),
    /// Shorten text to a column count with an ellipsis.
    Truncate(TruncateArgs),
    /// Style text with colors and modifiers.
    Style(StyleArgs),
    /// Parse a hosted git reference and print every rendering as JSON.
    GitUrl {
        input: String,
        /// File path used for the browse and raw file links.
        #[arg(long)]
        path: Option<String>,
    },
    /// Normalize a URL.
    NormalizeUrl {
        url: String,
        #[arg(long)]
        strip_hash: bool,
        #[arg(long)]
        force_https: bool,
        #[arg(long)]
        strip_protocol: bool,
    },
    /// Format a millisecond count as a human-readable duration.
    Ms(MsArgs),
    /// Convert a duration such as `1.5h` to milliseconds.
    ParseDuration { text: String },
    /// Look up a signal by name or number, or list all of them.
    Signal {
        name_or_number: Option<String>,
        /// Summarize a termination with this exit code instead.
        #[arg(long)]
        exit_code: Option<i32>,
    },
    /// Print a PATH that prefers locally installed executables.
    RunPath {
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(long, default_value = "node_modules/.bin")]
        bin_dir: PathBuf,
        #[arg(long)]
        no_exec_path: bool,
    },
    /// Wait for SIGINT, SIGTERM or SIGHUP and report which arrived.
    WaitSignal,
}

#[derive(Debug, Args)]
struct WrapArgs {
    text: Option<String>,
    #[arg(short, long)]
    columns: Option<usize>,
    #[arg(long)]
    hard: bool,
    #[arg(long)]
    no_word_wrap: bool,
    #[arg(long)]
    no_trim: bool,
}

#[derive(Debug, Args)]
struct TruncateArgs {
    text: Option<String>,
    #[arg(short, long)]
    columns: usize,
    #[arg(long, value_enum, default_value = "end")]
    position: PositionArg,
    #[arg(long)]
    ellipsis: Option<String>,
    /// Put a space between the text and the ellipsis.
    #[arg(long)]
    space: bool,
    /// Cut at a nearby space when there is one.
    #[arg(long)]
    prefer_space: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PositionArg {
    Start,
    Middle,
    End,
}

#[derive(Debug, Args)]
struct StyleArgs {
    text: Option<String>,
    /// Named color, 0-255 palette index or #rrggbb.
    #[arg(long)]
    fg: Option<String>,
    #[arg(long)]
    bg: Option<String>,
    #[arg(long)]
    bold: bool,
    #[arg(long)]
    dim: bool,
    #[arg(long)]
    italic: bool,
    #[arg(long)]
    underline: bool,
    #[arg(long)]
    inverse: bool,
    #[arg(long)]
    strikethrough: bool,
    /// Turn the text into a terminal hyperlink.
    #[arg(long)]
    link: Option<String>,
}

#[derive(Debug, Args)]
struct MsArgs {
    #[arg(allow_negative_numbers = true)]
    milliseconds: f64,
    #[arg(long)]
    compact: bool,
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    colon: bool,
    #[arg(long)]
    unit_count: Option<usize>,
    /// Round to a single unit (`1m`).
    #[arg(long, conflicts_with = "long")]
    short: bool,
    /// Round to a single unit with its full name (`1 minute`).
    #[arg(long)]
    long: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let preferences = load_preferences();
    let color = cli.color.map(ColorChoice::from).unwrap_or(preferences.color);
    run_command(cli.command, &preferences, color).await
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_filter(std::env::var("RUST_LOG").ok()))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter built from `RUST_LOG` directives, `info` when unset or invalid.
fn tracing_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn load_preferences() -> Preferences {
    match UserPreferences::new() {
        Ok(store) => {
            debug!(path = %store.path().display(), "loaded preferences");
            store.snapshot()
        }
        Err(error) => {
            warn!(error = %error, "could not read preferences; using defaults");
            UserPreferences::ephemeral().snapshot()
        }
    }
}

async fn run_command(command: Command, preferences: &Preferences, color: ColorChoice) -> Result<()> {
    match command {
        Command::Width {
            text,
            wide_ambiguous,
            count_ansi,
        } => {
            let options = WidthOptions {
                ambiguous_is_narrow: !wide_ambiguous,
                count_ansi_escape_codes: count_ansi,
            };
            println!("{}", string_width_with(&text_or_stdin(text)?, &options));
        }
        Command::Strip { text } => println!("{}", strip_ansi(&text_or_stdin(text)?)),
        Command::Wrap(args) => {
            let columns = args.columns.or(preferences.wrap_width).unwrap_or(DEFAULT_WRAP_WIDTH);
            let options = WrapOptions {
                hard: args.hard,
                word_wrap: !args.no_word_wrap,
                trim: !args.no_trim,
            };
            println!("{}", wrap_ansi(&text_or_stdin(args.text)?, columns, &options));
        }
        Command::Truncate(args) => {
            let options = TruncateOptions {
                position: match args.position {
                    PositionArg::Start => TruncatePosition::Start,
                    PositionArg::Middle => TruncatePosition::Middle,
                    PositionArg::End => TruncatePosition::End,
                },
                ellipsis: args.ellipsis.unwrap_or_else(|| preferences.ellipsis.clone()),
                space: args.space,
                prefer_truncation_on_space: args.prefer_space,
            };
            println!("{}", truncate(&text_or_stdin(args.text)?, args.columns, &options));
        }
        Command::Style(args) => println!("{}", render_style(args, color)?),
        Command::GitUrl { input, path } => {
            let info = HostedGit::parse(&input).with_context(|| format!("failed to parse `{}`", input))?;
            let out = serde_json::json!({
                "info": info,
                "default": info.to_string(),
                "https": info.https(),
                "ssh": info.ssh(),
                "sshurl": info.sshurl(),
                "git": info.git(),
                "shortcut": info.shortcut(),
                "browse": info.browse(path.as_deref(), None),
                "file": path.as_deref().map(|path| info.file(path)),
                "tarball": info.tarball(),
                "bugs": info.bugs(),
                "docs": info.docs(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::NormalizeUrl {
            url,
            strip_hash,
            force_https,
            strip_protocol,
        } => {
            let mut options = preferences.normalize.clone();
            options.strip_hash |= strip_hash;
            options.force_https |= force_https;
            options.strip_protocol |= strip_protocol;
            println!("{}", normalize_url(&url, &options)?);
        }
        Command::Ms(args) => {
            let rendered = if args.short {
                format_ms_short(args.milliseconds)?
            } else if args.long {
                format_ms_long(args.milliseconds)?
            } else {
                let options = MsOptions {
                    compact: args.compact || preferences.compact_durations,
                    verbose: args.verbose,
                    colon_notation: args.colon,
                    unit_count: args.unit_count,
                    ..MsOptions::default()
                };
                format_ms(args.milliseconds, &options)?
            };
            println!("{}", rendered);
        }
        Command::ParseDuration { text } => println!("{}", parse_duration(&text)?),
        Command::Signal {
            name_or_number,
            exit_code,
        } => match (name_or_number, exit_code) {
            (signal, Some(code)) => println!("{}", describe_termination(Some(code), signal.as_deref())),
            (Some(query), None) => {
                let signal = match query.parse::<i32>() {
                    Ok(number) => signal_by_number(number),
                    Err(_) => signal_by_name(&query),
                }
                .ok_or_else(|| anyhow!("unknown signal `{}`", query))?;
                let out = serde_json::json!({
                    "signal": signal,
                    "exit_code": signal.exit_code(),
                    "platform_number": signal.platform_number(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            (None, None) => {
                for signal in signals() {
                    println!("{:>3}  {:<10} {}", signal.number, signal.name, signal.description);
                }
            }
        },
        Command::RunPath {
            cwd,
            bin_dir,
            no_exec_path,
        } => {
            let options = RunPathOptions {
                cwd: cwd.unwrap_or_else(|| PathBuf::from(".")),
                bin_dir,
                add_exec_path: !no_exec_path,
                ..RunPathOptions::default()
            };
            println!("{}", run_path(&options)?.to_string_lossy());
        }
        Command::WaitSignal => {
            let signal = wait_for_shutdown().await.context("failed to listen for signals")?;
            println!("{}", signal);
        }
    }
    Ok(())
}

fn render_style(args: StyleArgs, color: ColorChoice) -> Result<String> {
    let mut style = Style::new();
    if let Some(fg) = &args.fg {
        style = style.fg(fg.parse::<Color>().with_context(|| format!("invalid --fg color `{}`", fg))?);
    }
    if let Some(bg) = &args.bg {
        style = style.bg(bg.parse::<Color>().with_context(|| format!("invalid --bg color `{}`", bg))?);
    }
    for (enabled, apply) in [
        (args.bold, Style::bold as fn(Style) -> Style),
        (args.dim, Style::dim),
        (args.italic, Style::italic),
        (args.underline, Style::underline),
        (args.inverse, Style::inverse),
        (args.strikethrough, Style::strikethrough),
    ] {
        if enabled {
            style = apply(style);
        }
    }

    let text = text_or_stdin(args.text)?;
    let painted = style.paint_with_level(&text, color.resolve(Stream::Stdout));
    Ok(match args.link {
        Some(url) => hyperlink(&painted, &url),
        None => painted,
    })
}

/// Uses the positional argument, or reads stdin when it is absent.
fn text_or_stdin(text: Option<String>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("failed to read text from stdin")?;
    if buffer.is_empty() {
        bail!("no text given and stdin was empty");
    }
    Ok(buffer.strip_suffix('\n').map(str::to_string).unwrap_or(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tracing_filter_honours_rust_log() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(tracing_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            tracing_filter(Some("knit_util=debug".to_string())).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(tracing_filter(Some("trace".to_string())).max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn parses_global_color_after_subcommand() {
        let cli = Cli::try_parse_from(["knit", "wrap", "hello", "--columns", "3", "--color", "never"]).unwrap();
        assert!(matches!(cli.color, Some(ColorArg::Never)));
        match cli.command {
            Command::Wrap(args) => {
                assert_eq!(args.columns, Some(3));
                assert_eq!(args.text.as_deref(), Some("hello"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn style_renders_plain_text_without_color() {
        let args = StyleArgs {
            text: Some("hi".to_string()),
            fg: Some("red".to_string()),
            bg: None,
            bold: true,
            dim: false,
            italic: false,
            underline: false,
            inverse: false,
            strikethrough: false,
            link: None,
        };
        assert_eq!(render_style(args, ColorChoice::Never).unwrap(), "hi");
    }

    #[test]
    fn style_rejects_unknown_colors() {
        let args = StyleArgs {
            text: Some("hi".to_string()),
            fg: Some("not-a-color".to_string()),
            bg: None,
            bold: false,
            dim: false,
            italic: false,
            underline: false,
            inverse: false,
            strikethrough: false,
            link: None,
        };
        assert!(render_style(args, ColorChoice::Always).is_err());
    }
}
