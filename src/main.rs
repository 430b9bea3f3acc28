use clap::Parser;
use monument_mixer::config::setup_logging;
use monument_mixer::gemini::{ApiKey, GeminiClient};
use monument_mixer::studio::Studio;
use tracing::{error, info, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = monument_mixer::cli::CliOptions::parse();

    if let Err(err) = setup_logging(cli.debug) {
        eprintln!("Logging unavailable: {}", err);
    }

    let settings = match cli.gemini.settings() {
        Ok(settings) => settings,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };

    let key = match cli.gemini.api_key.as_deref().map(ApiKey::new).transpose() {
        Ok(key) => key,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };
    if key.is_none() {
        warn!("GEMINI_API_KEY is not set; every generation request will be rejected");
    }

    let client = match GeminiClient::new(settings, key) {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to build generation client: {}", err);
            return;
        }
    };
    info!(
        "Generating with {} (images) and {} (text) via {}",
        client.settings().image_model,
        client.settings().text_model,
        client.settings().api_base
    );

    if let Err(err) = monument_mixer::web::setup_server(
        &cli.listen_address,
        cli.port,
        Studio::new(client),
        cli.body_limit,
    )
    .await
    {
        error!("Application error: {}", err);
    }
}
