/// Storytime - audiobook player that remembers where you were
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storytime_cli::{input, Cli, ClockBackend, Settings, StatusWriter};
use storytime_playback::{CommandRouter, Controller};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout is left to the status writer
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storytime=info,storytime_cli=info,storytime_playback=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;

    if cli.print_config {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    settings.validate()?;
    run(&settings)
}

fn run(settings: &Settings) -> anyhow::Result<()> {
    tracing::info!("Opening audiobook {}", settings.directory.display());

    let backend = ClockBackend::new()?;
    let controller = Controller::new(settings.playback(), Box::new(backend))?;

    let status = match settings.status_interval() {
        Some(interval) => Some(StatusWriter::spawn(
            controller.clone(),
            controller.subscribe(),
            interval,
            std::io::stdout(),
        )?),
        None => None,
    };

    // A book without playable files still accepts commands
    if let Err(e) = controller.start() {
        tracing::error!("Failed to resume: {}", e);
    }

    let router = Arc::new(CommandRouter::new(controller.clone()));
    let stop = Arc::new(AtomicBool::new(false));
    let (quit_tx, quit_rx) = crossbeam_channel::unbounded();

    if settings.stdin {
        input::spawn_stdin(Arc::clone(&router), quit_tx.clone(), Arc::clone(&stop))?;
    }
    if let Some(fifo) = &settings.fifo {
        input::spawn_fifo(
            fifo.clone(),
            Arc::clone(&router),
            quit_tx.clone(),
            Arc::clone(&stop),
        )?;
    }
    drop(quit_tx);

    // Either a quit command or every source running dry
    let _ = quit_rx.recv();
    tracing::info!("Shutting down");

    stop.store(true, Ordering::SeqCst);
    controller.shutdown();
    if let Some(status) = status {
        status.shutdown();
    }

    Ok(())
}
