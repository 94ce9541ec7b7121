use clap::Parser;
use tracing::Instrument;
use webpanel::{
    Application, Config,
    config::{Args, Command},
    db::{Database, initializer::DatabaseInitializer},
    telemetry,
};

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(&config.logging)?;

    let root = telemetry::root_span(&config.logging);
    async move {
        tracing::debug!("{:?}", args);
        run(args.command.unwrap_or(Command::Serve), config).await
    }
    .instrument(root)
    .await
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Serve => {
            let shutdown = shutdown_signal();
            Application::new(config).await?.serve(shutdown).await
        }
        Command::InitDb => {
            let db = Database::connect(&config.database).await?;
            let initializer = DatabaseInitializer::from_yaml(&config.database.seed_path, Some(config.password.argon2_params()))?;
            db.create_tables(&initializer).await?;
            db.close().await;
            Ok(())
        }
        Command::DropDb => {
            let db = Database::connect(&config.database).await?;
            db.drop_tables().await?;
            db.close().await;
            Ok(())
        }
    }
}
