use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, error, info};
use serde::Serialize;
use syslog::{BasicLogger, Facility, Formatter3164};

use blyncd::{
    application::Application,
    cli::{Cli, Command},
    config::locate_config_dir,
    instance::{self, Acquisition, EXIT_LOCK_FAILURE, InstanceGuard},
    schedule,
    settings::{ScheduleUpdate, SettingsClient},
    store::ConfigStore,
};

const LOG_FILE: &str = "blyncd.log";

fn init_log(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: "blyncd".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

/// Opens the daemon log for appending, keeping output of earlier runs.
fn open_log(dir: &Path) -> Result<File> {
    fs::create_dir_all(dir)
        .and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE))
        })
        .with_context(|| format!("Failed to open {}", dir.join(LOG_FILE).display()))
}

fn into_daemon(dir: &Path) -> Result<()> {
    open_log(dir)
        .and_then(|out| Ok((out.try_clone().context("Failed to duplicate log handle")?, out)))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .working_directory(dir)
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_log(cli.verbose) {
        eprintln!("Warning: syslog unavailable, logging disabled: {e}");
    }

    let command = cli.command();
    let dir = match locate_config_dir(cli.config_dir.clone()) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // The lock is claimed in the foreground so the caller sees an already
    // running daemon or a bind failure directly.
    let guard = match command {
        Command::Run => match InstanceGuard::acquire(cli.port) {
            Ok(Acquisition::Acquired(guard)) => Some(guard),
            Ok(Acquisition::AlreadyRunning) => {
                info!("blyncd is already running on port {}, showing settings", cli.port);
                None
            }
            Err(e) => {
                error!("{e:#}");
                eprintln!("Error: {e:#}");
                return ExitCode::from(EXIT_LOCK_FAILURE);
            }
        },
        _ => None,
    };

    // Forking is only safe before the runtime starts its threads.
    if guard.is_some() && cli.daemonize {
        if let Err(e) = into_daemon(&dir) {
            eprintln!("Error: failed to daemonize: {e:#}");
            return ExitCode::FAILURE;
        }
    }

    #[cfg(feature = "tokio-console")]
    console_subscriber::init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(command, dir, cli.port, guard)) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(
    command: Command,
    dir: PathBuf,
    port: u16,
    guard: Option<InstanceGuard>,
) -> Result<ExitCode> {
    let store = Arc::new(ConfigStore::open(&dir).await?);
    let settings = SettingsClient::new(store.clone());
    let now = Local::now().naive_local();

    match command {
        Command::Run => match guard {
            Some(guard) => run_daemon(store, guard).await?,
            None => print_json(&settings.snapshot(now).await)?,
        },
        Command::Settings => print_json(&settings.snapshot(now).await)?,
        Command::Status => {
            print!("{}", settings.snapshot(now).await.summary());
            let daemon = if instance::is_running(port).await {
                "running"
            } else {
                "not running"
            };
            println!("Daemon: {daemon}");
        }
        Command::Force { label } => {
            settings.force(label).await?;
            println!("Forced status '{label}'");
        }
        Command::Resume => {
            settings.resume().await?;
            println!("Following the schedule");
        }
        Command::Apply { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let update = ScheduleUpdate::from_json(&raw)?;
            let rules = update.rules.len();
            if settings.save_schedule(update).await? {
                println!("Schedule saved ({rules} rules)");
            } else {
                println!("Schedule unchanged");
            }
        }
        Command::Preview { at } => {
            let at = at.unwrap_or(now);
            let config = store.config().await;
            println!("{}", schedule::resolve(&at, &config));
        }
        Command::SetPoll { seconds } => {
            settings.set_poll_seconds(seconds).await?;
            println!("Polling every {seconds}s");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_daemon(store: Arc<ConfigStore>, guard: InstanceGuard) -> Result<()> {
    info!("Starting blyncd with settings in {}", store.paths().dir.display());
    Application::builder()
        .with_store(store)
        .with_instance_guard(guard)
        .build()?
        .run()
        .await
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}
