use actix_web::{App, HttpServer, web};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

use garbage_classifier::cli::Cli;
use garbage_classifier::config::Validate;
use garbage_classifier::fetch::ImageFetcher;
use garbage_classifier::{AppState, Classifier, logger, routes};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose, cli.json_logs);

    let config = cli.load_config().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    tracing::debug!("Config: {:?}", config);

    let classifier = Classifier::from_config(&config.model).with_context(|| {
        format!("Failed to initialize classifier from {}", config.model.path.display())
    })?;
    tracing::info!("Labels: {}", classifier.labels().join(", "));

    let app_state = web::Data::new(AppState {
        classifier: Arc::new(classifier),
        fetcher: ImageFetcher::new(&config.download)?,
        response: config.response.clone(),
        body_limit_bytes: config.server.body_limit_bytes,
    });

    let (host, port) = (config.server.host.clone(), config.server.port);
    tracing::info!("Starting garbage classifier on http://{}:{}", host, port);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server.bind((host.as_str(), port))?.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
