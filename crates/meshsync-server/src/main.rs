use clap::Parser;
use meshsync_common::ShutdownSignal;
use meshsync_server::logging::{LoggingConfig, init_logging};
use meshsync_server::signal::spawn_signal_handler;
use meshsync_server::{App, Cli, settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = settings::load(&cli)?;

    let _logging_guard = init_logging(&LoggingConfig::from_settings(&config.log, config.debug))?;

    let shutdown = ShutdownSignal::new();
    spawn_signal_handler(shutdown.clone());

    let app = App::new(config).await?;
    app.run(shutdown).await
}
