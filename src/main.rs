use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ntag_bridge::commands;
use ntag_bridge::config::{Backend, Config};
use ntag_bridge::nfc::{MemoryTag, TagDriver};
use ntag_bridge::Session;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

fn driver(config: &Config) -> Result<Box<dyn TagDriver>> {
    match config.backend {
        Backend::Memory => {
            info!("using simulated in-memory tag");
            Ok(Box::new(MemoryTag::new()))
        }
        #[cfg(feature = "pcsc")]
        Backend::Pcsc => {
            let reader = ntag_bridge::nfc::NfcReader::new(config.reader.as_deref())?;
            Ok(Box::new(reader))
        }
        #[cfg(not(feature = "pcsc"))]
        Backend::Pcsc => anyhow::bail!("this build has no PC/SC support, rebuild with --features pcsc"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new("ntag_bridge=info"))
                .context("invalid log filter")?,
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    config.validate()?;

    let session = Arc::new(Session::new(driver(&config)?, config.discovery()));
    let app = commands::router(session.clone());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("could not listen on {}", config.bind))?;
    info!(addr = %config.bind, backend = ?config.backend, "NFC API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            session.shutdown();
        })
        .await
        .context("server error")?;

    Ok(())
}
