//! # Signal Utilities
//!
//! A table describing every known signal (name, default action, a short
//! human description and the standard that defined it), plus the plumbing to
//! react to termination signals: a process-wide registry of exit hooks and a
//! future that resolves on the first shutdown signal.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info};

/// What the operating system does with a signal by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Terminate,
    /// Terminate and dump core.
    Core,
    Ignore,
    Pause,
    Unpause,
}

/// The standard a signal was introduced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStandard {
    Ansi,
    Posix,
    Bsd,
    SystemV,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalInfo {
    pub name: String,
    /// Linux numbering; see [`SignalInfo::platform_number`].
    pub number: i32,
    pub action: SignalAction,
    pub description: String,
    pub standard: SignalStandard,
    /// The signal cannot be caught, blocked or ignored.
    pub forced: bool,
}

impl SignalInfo {
    /// Exit code a shell reports for a process killed by this signal.
    pub fn exit_code(&self) -> i32 {
        128 + self.number
    }

    /// The signal number on the running platform, falling back to the table
    /// number where the platform does not define the signal.
    pub fn platform_number(&self) -> i32 {
        platform_signal_number(&self.name).unwrap_or(self.number)
    }
}

impl fmt::Display for SignalInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.description)
    }
}

const REALTIME_MIN: i32 = 34;
const REALTIME_MAX: i32 = 64;

type StandardSignal = (&'static str, i32, SignalAction, &'static str, SignalStandard, bool);

#[rustfmt::skip]
const STANDARD_SIGNALS: &[StandardSignal] = {
    use SignalAction::*;
    use SignalStandard::*;
    &[
        ("SIGHUP", 1, Terminate, "Terminal closed", Posix, false),
        ("SIGINT", 2, Terminate, "User interruption with CTRL-C", Ansi, false),
        ("SIGQUIT", 3, Core, "User interruption with CTRL-\\", Posix, false),
        ("SIGILL", 4, Core, "Invalid machine instruction", Ansi, false),
        ("SIGTRAP", 5, Core, "Debugger breakpoint", Posix, false),
        ("SIGABRT", 6, Core, "Aborted", Ansi, false),
        ("SIGIOT", 6, Core, "Aborted", Bsd, false),
        ("SIGBUS", 7, Core, "Bus error due to misaligned, non-existing address or paging error", Bsd, false),
        ("SIGEMT", 7, Terminate, "Command should be emulated but is not implemented", Other, false),
        ("SIGFPE", 8, Core, "Floating point arithmetic error", Ansi, false),
        ("SIGKILL", 9, Terminate, "Forced termination", Posix, true),
        ("SIGUSR1", 10, Terminate, "Application-specific signal", Posix, false),
        ("SIGSEGV", 11, Core, "Segmentation fault", Ansi, false),
        ("SIGUSR2", 12, Terminate, "Application-specific signal", Posix, false),
        ("SIGPIPE", 13, Terminate, "Broken pipe or socket", Posix, false),
        ("SIGALRM", 14, Terminate, "Timeout or timer", Posix, false),
        ("SIGTERM", 15, Terminate, "Termination", Ansi, false),
        ("SIGSTKFLT", 16, Terminate, "Stack is empty or overflowed", Other, false),
        ("SIGCHLD", 17, Ignore, "Child process terminated, paused or unpaused", Posix, false),
        ("SIGCLD", 17, Ignore, "Child process terminated, paused or unpaused", Other, false),
        ("SIGCONT", 18, Unpause, "Unpaused", Posix, true),
        ("SIGSTOP", 19, Pause, "Paused", Posix, true),
        ("SIGTSTP", 20, Pause, "Paused using CTRL-Z or \"suspend\"", Posix, false),
        ("SIGTTIN", 21, Pause, "Background process cannot read terminal input", Posix, false),
        ("SIGBREAK", 21, Terminate, "User interruption with CTRL-BREAK", Other, false),
        ("SIGTTOU", 22, Pause, "Background process cannot write to terminal output", Posix, false),
        ("SIGURG", 23, Ignore, "Socket received out-of-band data", Bsd, false),
        ("SIGXCPU", 24, Core, "Process timed out", Bsd, false),
        ("SIGXFSZ", 25, Core, "File too big", Bsd, false),
        ("SIGVTALRM", 26, Terminate, "Timeout or timer", Bsd, false),
        ("SIGPROF", 27, Terminate, "Timeout or timer", Bsd, false),
        ("SIGWINCH", 28, Ignore, "Terminal window size changed", Bsd, false),
        ("SIGIO", 29, Terminate, "I/O is available", Other, false),
        ("SIGPOLL", 29, Terminate, "Watched event", Other, false),
        ("SIGINFO", 29, Ignore, "Request for process information", Other, false),
        ("SIGPWR", 30, Terminate, "Device running out of power", SystemV, false),
        ("SIGSYS", 31, Core, "Invalid system call", Other, false),
        ("SIGUNUSED", 31, Terminate, "Invalid system call", Other, false),
    ]
};

static SIGNALS: Lazy<Vec<SignalInfo>> = Lazy::new(|| {
    let standard = STANDARD_SIGNALS
        .iter()
        .map(|&(name, number, action, description, standard, forced)| SignalInfo {
            name: name.to_string(),
            number,
            action,
            description: description.to_string(),
            standard,
            forced,
        });

    let realtime = (REALTIME_MIN..=REALTIME_MAX).map(|number| SignalInfo {
        name: format!("SIGRT{}", number - REALTIME_MIN + 1),
        number,
        action: SignalAction::Terminate,
        description: "Application-specific signal (realtime)".to_string(),
        standard: SignalStandard::Posix,
        forced: false,
    });

    standard.chain(realtime).collect()
});

/// Every known signal: the standard ones (aliases included) followed by the
/// real-time signals `SIGRT1` to `SIGRT31`.
pub fn signals() -> &'static [SignalInfo] {
    &SIGNALS
}

/// Looks a signal up by name. Case-insensitive; the `SIG` prefix is optional.
///
/// # Example
/// ```rust
/// use knit_util::signals::signal_by_name;
///
/// assert_eq!(signal_by_name("sigterm").map(|signal| signal.number), Some(15));
/// assert_eq!(signal_by_name("INT").map(|signal| signal.exit_code()), Some(130));
/// assert!(signal_by_name("SIGNOPE").is_none());
/// ```
pub fn signal_by_name(name: &str) -> Option<&'static SignalInfo> {
    let upper = name.trim().to_ascii_uppercase();
    let full = if upper.starts_with("SIG") { upper } else { format!("SIG{}", upper) };
    SIGNALS.iter().find(|signal| signal.name == full)
}

/// Looks a signal up by number. Where several names share a number the
/// primary one (`SIGABRT` over `SIGIOT`) is returned.
pub fn signal_by_number(number: i32) -> Option<&'static SignalInfo> {
    SIGNALS.iter().find(|signal| signal.number == number)
}

#[cfg(unix)]
fn platform_signal_number(name: &str) -> Option<i32> {
    let number = match name {
        "SIGHUP" => libc::SIGHUP,
        "SIGINT" => libc::SIGINT,
        "SIGQUIT" => libc::SIGQUIT,
        "SIGILL" => libc::SIGILL,
        "SIGTRAP" => libc::SIGTRAP,
        "SIGABRT" => libc::SIGABRT,
        "SIGIOT" => libc::SIGIOT,
        "SIGBUS" => libc::SIGBUS,
        "SIGFPE" => libc::SIGFPE,
        "SIGKILL" => libc::SIGKILL,
        "SIGUSR1" => libc::SIGUSR1,
        "SIGSEGV" => libc::SIGSEGV,
        "SIGUSR2" => libc::SIGUSR2,
        "SIGPIPE" => libc::SIGPIPE,
        "SIGALRM" => libc::SIGALRM,
        "SIGTERM" => libc::SIGTERM,
        "SIGCHLD" => libc::SIGCHLD,
        "SIGCONT" => libc::SIGCONT,
        "SIGSTOP" => libc::SIGSTOP,
        "SIGTSTP" => libc::SIGTSTP,
        "SIGTTIN" => libc::SIGTTIN,
        "SIGTTOU" => libc::SIGTTOU,
        "SIGURG" => libc::SIGURG,
        "SIGXCPU" => libc::SIGXCPU,
        "SIGXFSZ" => libc::SIGXFSZ,
        "SIGVTALRM" => libc::SIGVTALRM,
        "SIGPROF" => libc::SIGPROF,
        "SIGWINCH" => libc::SIGWINCH,
        "SIGIO" => libc::SIGIO,
        "SIGSYS" => libc::SIGSYS,
        #[cfg(target_os = "linux")]
        "SIGSTKFLT" => libc::SIGSTKFLT,
        #[cfg(target_os = "linux")]
        "SIGPOLL" => libc::SIGPOLL,
        #[cfg(target_os = "linux")]
        "SIGPWR" => libc::SIGPWR,
        #[cfg(any(target_os = "macos", target_os = "freebsd"))]
        "SIGEMT" => libc::SIGEMT,
        #[cfg(any(target_os = "macos", target_os = "freebsd"))]
        "SIGINFO" => libc::SIGINFO,
        _ => return None,
    };
    Some(number)
}

#[cfg(not(unix))]
fn platform_signal_number(_name: &str) -> Option<i32> {
    None
}

/// One-line summary of how a child process ended.
///
/// # Arguments
/// * `exit_code` - The exit status, when the process exited normally
/// * `signal` - The name of the terminating signal, when it was killed
///
/// # Returns
/// `was killed with SIGTERM (Termination)`, `exited with code 1`, or
/// `exited` when neither is known
pub fn describe_termination(exit_code: Option<i32>, signal: Option<&str>) -> String {
    match (signal, exit_code) {
        (Some(name), _) => match signal_by_name(name) {
            Some(info) => format!("was killed with {}", info),
            None => format!("was killed with {}", name),
        },
        (None, Some(code)) => format!("exited with code {}", code),
        (None, None) => "exited".to_string(),
    }
}

type ExitHook = Box<dyn FnOnce(&SignalInfo) + Send>;

struct Registration {
    id: u64,
    description: String,
    hook: ExitHook,
}

/// Callbacks to run once when the process is asked to shut down.
///
/// Hooks run in reverse registration order, each at most once.
#[derive(Default)]
pub struct ExitHooks {
    next_id: AtomicU64,
    hooks: Mutex<Vec<Registration>>,
}

impl ExitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook`. Dropping the returned guard removes the hook again;
    /// call [`ExitHookGuard::keep`] to leave it registered.
    pub fn register<F>(&self, description: impl Into<String>, hook: F) -> ExitHookGuard<'_>
    where
        F: FnOnce(&SignalInfo) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let description = description.into();
        debug!(id, description = %description, "registered exit hook");
        self.lock().push(Registration {
            id,
            description,
            hook: Box::new(hook),
        });
        ExitHookGuard {
            hooks: self,
            id,
            armed: true,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs and removes every registered hook, returning how many ran.
    pub fn run(&self, signal: &SignalInfo) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let count = drained.len();
        for registration in drained.into_iter().rev() {
            debug!(description = %registration.description, signal = %signal.name, "running exit hook");
            (registration.hook)(signal);
        }
        count
    }

    fn remove(&self, id: u64) {
        self.lock().retain(|registration| registration.id != id);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deregisters its hook when dropped.
#[must_use = "dropping the guard removes the exit hook immediately"]
pub struct ExitHookGuard<'a> {
    hooks: &'a ExitHooks,
    id: u64,
    armed: bool,
}

impl ExitHookGuard<'_> {
    /// Leaves the hook registered for the rest of the process.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for ExitHookGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.hooks.remove(self.id);
        }
    }
}

static EXIT_HOOKS: Lazy<ExitHooks> = Lazy::new(ExitHooks::new);

fn exit_hooks() -> &'static ExitHooks {
    &EXIT_HOOKS
}

/// Registers a process-wide exit hook.
pub fn on_exit<F>(description: impl Into<String>, hook: F) -> ExitHookGuard<'static>
where
    F: FnOnce(&SignalInfo) + Send + 'static,
{
    exit_hooks().register(description, hook)
}

/// Runs the process-wide exit hooks for `signal`.
pub fn run_exit_hooks(signal: &SignalInfo) -> usize {
    exit_hooks().run(signal)
}

/// Resolves on the first SIGINT, SIGTERM or SIGHUP (Ctrl-C on platforms
/// without Unix signals), runs the process-wide exit hooks and returns the
/// signal received.
pub async fn wait_for_shutdown() -> io::Result<&'static SignalInfo> {
    let name = next_shutdown_signal().await?;
    let signal = signal_by_name(name).ok_or_else(|| io::Error::other(format!("{} missing from signal table", name)))?;
    info!(signal = %signal.name, "received shutdown signal");
    let ran = run_exit_hooks(signal);
    debug!(hooks = ran, "exit hooks finished");
    Ok(signal)
}

/// Blocking form of [`wait_for_shutdown`] for synchronous callers. Reuses
/// the current Tokio runtime when it is multi-threaded; a current-thread
/// runtime cannot be blocked on from inside and yields an
/// [`io::ErrorKind::Unsupported`] error.
pub fn wait_for_shutdown_blocking() -> io::Result<&'static SignalInfo> {
    use tokio::runtime::{Handle, RuntimeFlavor};

    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "cannot block on shutdown from inside a current-thread runtime",
        )),
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(wait_for_shutdown())),
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(wait_for_shutdown()),
    }
}

#[cfg(unix)]
async fn next_shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn next_shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT")
}
