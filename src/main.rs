use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use simple_logger::SimpleLogger;

mod console;
mod wav;

#[derive(Parser)]
#[command(name = "murmur", version, about = "Local speech-to-text from the console")]
struct Cli {
    /// Log debug output from every crate.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Catalog id of the model to use instead of the configured one.
    #[arg(short, long, global = true)]
    model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List catalog models and whether their files are present.
    Models,
    /// List audio input devices.
    Devices,
    /// Transcribe a WAV file.
    Transcribe { path: PathBuf },
    /// Transcribe the microphone until Enter is pressed.
    Listen {
        /// Stop after this many seconds instead of waiting for Enter.
        #[arg(short, long)]
        seconds: Option<u64>,
        /// Capture from this device id and remember it.
        #[arg(short, long)]
        device: Option<String>,
    },
}

fn logger(verbose: bool) -> SimpleLogger {
    SimpleLogger::new()
        .with_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .with_colors(true)
        .with_threads(true)
        .with_local_timestamps()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logger(cli.verbose)
        .init()
        .context("failed to build logger instance")?;

    let channels = murmur_bridge::BridgeChannels::default();
    let backend = murmur_backend::run(channels.backend_rx, channels.backend_tx);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the console runtime")?;
    let mut console = console::Console::new(channels.frontend_rx, channels.frontend_tx);
    let outcome = runtime.block_on(async {
        match cli.command {
            Command::Models => console.models().await,
            Command::Devices => console.devices().await,
            Command::Transcribe { path } => {
                console.ready_model(cli.model).await?;
                console.transcribe(path).await
            }
            Command::Listen { seconds, device } => {
                if let Some(device) = device {
                    console.select_device(device).await?;
                }
                console.ready_model(cli.model).await?;
                console.listen(seconds).await
            }
        }
    });

    // a pending stdin read must not hold the process open
    runtime.shutdown_background();
    // closing the command channel shuts the backend down
    drop(console);
    if backend.join().is_err() {
        log::error!("Backend thread panicked");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_raises_the_log_level() {
        assert_eq!(logger(true).max_level(), log::LevelFilter::Debug);
        assert_eq!(logger(false).max_level(), log::LevelFilter::Warn);
    }
}
