//! vehicle-vision server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use vehicle_vision::api;
use vehicle_vision::app_state::AppState;
use vehicle_vision::config::{LogFormat, ServiceConfig};
use vehicle_vision::domain::{EventBus, ProcessorRegistry};
use vehicle_vision::enrichment::{NhtsaVinDecoder, VinDecoder};
use vehicle_vision::metrics::VisionMetrics;
use vehicle_vision::service::DocumentService;
use vehicle_vision::vision::OpenAiVision;
use vehicle_vision::ws::handler::ws_handler;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("invalid LISTEN_ADDR")?;
    init_tracing(config.log_format);
    tracing::info!(
        addr = %config.listen_addr,
        model = %config.vision_model,
        "starting vehicle-vision"
    );
    if config.vision_api_key.is_none() {
        tracing::warn!("VISION_API_KEY is not set; vision calls will be unauthenticated");
    }

    // Outbound clients
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;
    let vision = Arc::new(OpenAiVision::new(
        http.clone(),
        &config.vision_api_url,
        config.vision_api_key.clone(),
        &config.vision_model,
        config.vision_max_tokens,
    ));
    let vin_decoder: Option<Arc<dyn VinDecoder>> = config
        .vin_decoder_enabled
        .then(|| Arc::new(NhtsaVinDecoder::new(http, &config.vin_decoder_url)) as Arc<dyn VinDecoder>);

    // Domain and service layers
    let registry = Arc::new(ProcessorRegistry::with_default_processors(vin_decoder));
    let metrics = Arc::new(VisionMetrics::new());
    let event_bus = EventBus::new(config.event_bus_capacity);
    let service = Arc::new(DocumentService::new(
        registry,
        vision,
        metrics,
        event_bus,
        config.service_options(),
    ));

    let options = config.service_options();
    let app_state = AppState::new(service);

    let router = Router::new()
        .merge(api::build_router(&options))
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        )
    };

    let app = router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
