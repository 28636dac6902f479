//! User-facing console lines.
//! Prefixed, and colored only when stdout is a TTY; logs go through tracing instead.

use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy)]
enum Tone {
    Info,
    Warn,
    Error,
    Success,
}

fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

fn emit(tone: Tone, msg: &str) {
    let tty = is_tty();
    let line = match (tone, tty) {
        (Tone::Info, true) => format!("{} {}", "info:".cyan().bold(), msg),
        (Tone::Warn, true) => format!("{} {}", "warn:".yellow().bold(), msg),
        (Tone::Error, true) => format!("{} {}", "error:".red().bold(), msg),
        (Tone::Success, true) => format!("{} {}", "ok:".green().bold(), msg),
        (Tone::Info, false) => format!("info: {msg}"),
        (Tone::Warn, false) => format!("warn: {msg}"),
        (Tone::Error, false) => format!("error: {msg}"),
        (Tone::Success, false) => format!("ok: {msg}"),
    };
    match tone {
        Tone::Info | Tone::Success => println!("{line}"),
        Tone::Warn | Tone::Error => eprintln!("{line}"),
    }
}

pub fn print_info(msg: &str) {
    emit(Tone::Info, msg);
}

pub fn print_warn(msg: &str) {
    emit(Tone::Warn, msg);
}

pub fn print_error(msg: &str) {
    emit(Tone::Error, msg);
}

pub fn print_success(msg: &str) {
    emit(Tone::Success, msg);
}

/// Plain line without prefix, for output users may script against
/// (e.g. the dry-run list of threatened paths).
pub fn print_user(msg: &str) {
    println!("{}", msg);
}
