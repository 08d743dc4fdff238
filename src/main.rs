use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trial_match::config::{LoggingSettings, Settings, SourceKind};
use trial_match::core::sources::{CatalogSource, ProfileSource};
use trial_match::core::{PipelineOptions, TrialMatcher};
use trial_match::routes::{self, trials::AppState};
use trial_match::services::fixtures::load_sources;
use trial_match::services::{
    AppwriteClient, AzureOpenAiOracle, FixtureCatalog, FixtureProfileSource, PostgresCatalog,
};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_tracing(logging: &LoggingSettings) {
    // LOG_LEVEL / LOG_FORMAT win over the [logging] section
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

async fn build_sources(
    settings: &Settings,
    timeout: Duration,
) -> std::io::Result<(Arc<dyn ProfileSource>, Arc<dyn CatalogSource>)> {
    match settings.sources.kind {
        SourceKind::Fixture => match &settings.sources.fixture_path {
            Some(path) => {
                let (profiles, catalog) = load_sources(path).map_err(|e| {
                    error!("Failed to load fixture file {}: {}", path.display(), e);
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
                })?;
                info!(
                    "Fixture sources loaded from {} ({} patients, {} trials)",
                    path.display(),
                    profiles.len(),
                    catalog.trials().len()
                );
                let profiles: Arc<dyn ProfileSource> = Arc::new(profiles);
                let catalog: Arc<dyn CatalogSource> = Arc::new(catalog);
                Ok((profiles, catalog))
            }
            None => {
                info!("Using built-in demo patients and trials");
                let profiles: Arc<dyn ProfileSource> = Arc::new(FixtureProfileSource::demo());
                let catalog: Arc<dyn CatalogSource> = Arc::new(FixtureCatalog::demo());
                Ok((profiles, catalog))
            }
        },
        SourceKind::Remote => {
            let appwrite = settings.appwrite.as_ref().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "[appwrite] section required for remote sources")
            })?;
            let database = settings.database.as_ref().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "[database] section required for remote sources")
            })?;

            let profiles = AppwriteClient::new(
                appwrite.endpoint.clone(),
                appwrite.api_key.clone(),
                appwrite.project_id.clone(),
                appwrite.database_id.clone(),
                appwrite.patients_collection.clone(),
                timeout,
            )
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

            info!("Appwrite patient registry initialized");

            let catalog = PostgresCatalog::from_settings(
                &database.url,
                database.max_connections,
                database.min_connections,
            )
            .await
            .map_err(|e| {
                error!("Failed to connect to PostgreSQL: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
            })?;

            info!("PostgreSQL trial catalog initialized");

            let profiles: Arc<dyn ProfileSource> = Arc::new(profiles);
            let catalog: Arc<dyn CatalogSource> = Arc::new(catalog);
            Ok((profiles, catalog))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_tracing(&settings.logging);

    info!("Starting trial matching service...");

    let options = PipelineOptions::from(&settings.pipeline);
    let timeout = options.retry.call_timeout.unwrap_or(Duration::from_secs(30));

    let (profiles, catalog) = build_sources(&settings, timeout).await?;

    let oracle = AzureOpenAiOracle::new(
        settings.oracle.endpoint.clone(),
        settings.oracle.api_key.clone(),
        settings.oracle.deployment.clone(),
        settings.oracle.api_version.clone(),
        settings.oracle.temperature,
        timeout,
    )
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    info!("Reasoning oracle initialized (deployment: {})", settings.oracle.deployment);

    let matcher = TrialMatcher::new(profiles, catalog, Arc::new(oracle), options);

    info!(
        "Pipeline initialized (max_attempts: {}, max_in_flight: {:?}, ordering: {:?})",
        options.retry.max_attempts, options.max_in_flight, options.ordering
    );

    let app_state = AppState {
        matcher: Arc::new(matcher),
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
