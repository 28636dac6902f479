//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the signal handler,
//! validates paths, then runs preserve -> command -> rollback.
//!
//! Rollback runs whatever happens in between: a failed command, a command
//! that could not be spawned, or an interrupt all still put the preserved
//! paths back before the process exits.

use anyhow::{Context, Result, anyhow, bail};
use std::env;
use std::process::{Command, ExitStatus};
use tracing::{debug, error, info, warn};

use preserve_paths::cli::Args;
use preserve_paths::config::{
    CONFIG_ENV_VAR, default_config_path, ensure_default_config_exists, load_config,
    validate_and_normalize,
};
use preserve_paths::output as out;
use preserve_paths::{
    ConsoleNotifier, LocalFs, LogNotifier, Notify, PreserveError, PreserveSessions, Preserver,
    shutdown,
};

use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // Handle --print-config before logging init
    if args.print_config {
        print_config();
        return Ok(());
    }

    if let Some(path) = ensure_default_config_exists() {
        out::print_success(&format!("A template config was written to: {}", path.display()));
        out::print_info("Add <path> entries under <preserve_paths> to keep them across installs.");
    }

    // Config file first, then CLI overrides (CLI wins).
    let (mut cfg, cfg_path) = load_config()?;
    args.apply_overrides(&mut cfg);

    // Hold the guard until the end so file logs are flushed.
    let _guard = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {}", e));
        e
    })?;
    if let Some(p) = &cfg_path {
        debug!(path = %p.display(), "Using config file");
    }

    // The child gets the signal from the terminal itself; we only remember it
    // so nothing new starts and rollback still happens.
    ctrlc::set_handler(|| {
        shutdown::request();
        out::print_warn("Received interrupt; restoring preserved paths before exit...");
    })
    .context("install signal handler")?;

    let base_dir = env::current_dir().context("determine working directory")?;
    let roots = validate_and_normalize(&mut cfg, &args.install_paths, &base_dir)?;
    let key = args.operation_key(&roots);
    debug!(operation = %key, ?cfg, "Starting preserve-paths");

    let fs = LocalFs::new();
    let console = ConsoleNotifier;
    let quiet = LogNotifier;
    let notifier: &dyn Notify = if args.json { &quiet } else { &console };

    if cfg.dry_run {
        let preserver = Preserver::new(&roots, &cfg.preserve_paths, &cfg.cache_dir, &fs, notifier)?;
        let mut count = 0usize;
        for root in preserver.install_roots() {
            for path in preserver.threatened_paths(root)? {
                out::print_user(&path.display().to_string());
                count += 1;
            }
        }
        out::print_info(&format!("Dry-run: {count} path(s) would be moved aside during '{key}'"));
        return Ok(());
    }

    let mut sessions = PreserveSessions::new(&base_dir, &cfg.preserve_paths, &cfg.cache_dir, &fs, notifier);

    if let Err(e) = sessions.begin(&key, &roots) {
        log_preserve_error(&e, "Preserving paths failed");
        // Bring back whatever was already moved before reporting.
        if let Err(rollback_err) = sessions.finish(&key) {
            report_stranded(&sessions, &key);
            return Err(anyhow!(rollback_err).context(e.to_string()));
        }
        return Err(e.into());
    }
    let moved = sessions.pending_backups(&key).map_or(0, |b| b.len());
    info!(operation = %key, moved, "Paths preserved");

    let status = if shutdown::is_requested() {
        warn!("Interrupted before the command started");
        None
    } else {
        run_command(&args)
    };

    match sessions.finish(&key) {
        Ok(_) => {
            if moved > 0 {
                out::print_success(&format!("Restored {moved} preserved path(s)"));
            }
        }
        Err(e) => {
            log_preserve_error(&e, "Rollback failed");
            report_stranded(&sessions, &key);
            return Err(e.into());
        }
    }

    match status {
        None if shutdown::is_requested() => bail!("interrupted"),
        None => Ok(()),
        Some(Ok(st)) if st.success() => Ok(()),
        Some(Ok(st)) => bail!("command exited unsuccessfully ({st})"),
        Some(Err(e)) => Err(e),
    }
}

/// Spawn the trailing command and wait. `None` when no command was given.
fn run_command(args: &Args) -> Option<Result<ExitStatus>> {
    let (program, rest) = args.command.split_first()?;
    info!(command = ?args.command, "Running command");
    let result = Command::new(program)
        .args(rest)
        .status()
        .with_context(|| format!("failed to run '{}'", program.to_string_lossy()));
    match &result {
        Ok(st) => debug!(status = %st, "Command finished"),
        Err(e) => error!(error = %e, "Command could not be started"),
    }
    Some(result)
}

fn log_preserve_error(e: &PreserveError, what: &str) {
    error!(code = e.code(), kind = e.kind(), error = %e, "{what}");
}

/// Tell the user where backups that could not be restored are kept.
fn report_stranded(sessions: &PreserveSessions<'_>, key: &str) {
    let Some(pending) = sessions.pending_backups(key) else {
        return;
    };
    if pending.is_empty() {
        return;
    }
    out::print_error("Some preserved paths could not be restored. They are still kept at:");
    for (original, entry) in pending {
        out::print_error(&format!("  {} -> {}", entry.location.display(), original.display()));
    }
}

fn print_config() {
    if let Some(cfg_env) = env::var_os(CONFIG_ENV_VAR) {
        out::print_info(&format!(
            "Using {CONFIG_ENV_VAR} (explicit):\n  {}\n",
            std::path::Path::new(&cfg_env).display()
        ));
        out::print_info(&format!("To override, unset {CONFIG_ENV_VAR} or set it to another file."));
        return;
    }
    match default_config_path() {
        Ok(p) => {
            out::print_info(&format!("Default preserve-paths config path:\n  {}\n", p.display()));
            if p.exists() {
                out::print_info("A config file already exists at that location.");
            } else {
                out::print_info("No config file exists there yet. Run once to create a template.");
            }
        }
        Err(e) => {
            out::print_error(&format!("Could not determine a default config path: {e}"));
        }
    }
}
