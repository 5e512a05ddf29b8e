/*
 * This file is part of bayled.
 *
 * Copyright (C) 2025 Bayled contributors
 *
 * Bayled is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Bayled is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with bayled. If not, see <https://www.gnu.org/licenses/>.
 */

use std::process::ExitCode;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use bayled::config::Config;
use bayled::disks::{StatsProvider, SysBlockStats};
use bayled::leds::LedController;
use bayled::portio::DevPort;
use bayled::supervisor::{RunFlags, Supervisor};

const VERSION: &str = env!("CARGO_PKG_VERSION");

lazy_static! {
    // the C signal handler needs a fixed place to reach the flags
    static ref RUN_FLAGS: Arc<RunFlags> = Arc::new(RunFlags::new());
}

extern "C" fn handle_signal(_sig: libc::c_int) {
    // async-signal-safe: only atomics are touched
    RUN_FLAGS.request_terminate();
}

fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int);
    for sig in [libc::SIGTERM, libc::SIGINT, libc::SIGQUIT, libc::SIGILL] {
        unsafe {
            libc::signal(sig, handler as libc::sighandler_t);
        }
    }
}

/// Once `/dev/port` is open root is no longer needed; run the rest of the
/// daemon as nobody. Best effort: a missing passwd entry keeps us as root.
fn drop_privileges() {
    let name = b"nobody\0";
    let pw = unsafe { libc::getpwnam(name.as_ptr() as *const libc::c_char) };
    if pw.is_null() {
        warn!("no passwd entry for nobody; keeping root privileges");
        return;
    }
    unsafe {
        if libc::setgid((*pw).pw_gid) != 0 || libc::setuid((*pw).pw_uid) != 0 {
            warn!(
                "unable to drop privileges to nobody: {}",
                std::io::Error::last_os_error()
            );
            return;
        }
    }
    debug!("dropped privileges to nobody");
}

/// Log to the systemd journal when it is there, stdout otherwise.
fn init_logging(debug_mode: bool) -> bool {
    let log_level = if debug_mode {
        "debug".to_string()
    } else {
        std::env::var("BAYLED_LOG").unwrap_or_else(|_| "info".to_string())
    };

    let mut use_journald = std::path::Path::new("/run/systemd/journal/socket").exists();

    if use_journald {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
                use_journald = false;
                tracing_subscriber::fmt()
                    .with_target(false)
                    .with_level(true)
                    .with_env_filter(&log_level)
                    .init();
            }
        }
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_env_filter(&log_level)
            .init();
    }
    use_journald
}

fn print_help() {
    eprintln!("bayledd {} - drive bay LED daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    bayledd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -d, --debug         Log debug messages");
    eprintln!("    -D, --daemon        Detach and run in the background - do not use under systemd");
    eprintln!("    -u, --update        Note a pending system update (handled externally)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    BAYLED_LOG          Log level (trace, debug, info, warn, error)");
    eprintln!();
    eprintln!("CONFIGURATION:");
    eprintln!("    {}", bayled::config::CONFIG_PATH);
    eprintln!("    Selects the board variant and LED brightness.");
}

fn print_version() {
    println!("bayledd {}", VERSION);
}

fn main() -> ExitCode {
    if unsafe { libc::geteuid() } != 0 {
        eprintln!("Error: bayledd requires root privileges for raw port access.");
        eprintln!(
            "Please run with: sudo {}",
            std::env::args()
                .next()
                .unwrap_or_else(|| "bayledd".to_string())
        );
        return ExitCode::FAILURE;
    }

    let args: Vec<String> = std::env::args().collect();
    let mut debug_mode = false;
    let mut daemonize = false;
    let mut update_requested = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            "-d" | "--debug" => debug_mode = true,
            "-D" | "--daemon" => daemonize = true,
            "-u" | "--update" => update_requested = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                return ExitCode::FAILURE;
            }
        }
    }

    let use_journald = init_logging(debug_mode);
    info!("STARTUP: bayledd {} starting", VERSION);
    info!(
        "STARTUP: Logging to {}",
        if use_journald { "systemd journal" } else { "stdout" }
    );

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("STARTUP: board variant {}", config.variant.name());
    if update_requested {
        // system-update watching belongs to the external update helper
        info!("update monitoring requested; delegated to the update helper");
    }

    let port = match DevPort::open() {
        Ok(port) => port,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    // fork before any thread exists
    if daemonize {
        if unsafe { libc::daemon(0, 0) } != 0 {
            error!("unable to daemonize: {}", std::io::Error::last_os_error());
            return ExitCode::FAILURE;
        }
        info!("forked to background, running in daemon mode");
    }

    let flags = Arc::clone(&RUN_FLAGS);
    install_signal_handlers();
    drop_privileges();

    let leds = Arc::new(LedController::new(Box::new(port), Arc::clone(&flags)));
    let stats: Arc<Mutex<dyn StatsProvider>> = Arc::new(Mutex::new(SysBlockStats::new()));
    let supervisor = Supervisor::new(Arc::clone(&leds), stats, flags, &config);

    match supervisor.run() {
        Ok(()) => {
            info!("bayledd exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fatal: {}", e);
            // startup-path failures have not been through the supervisor's
            // own LED cleanup yet
            leds.force_all_off();
            ExitCode::FAILURE
        }
    }
}
