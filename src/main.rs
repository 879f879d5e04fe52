use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use dubbing_api::config::{
    HandlerConfig, MetricsConfig, PipelineConfig, SynthesizerConfig, TranslatorConfig,
};
use dubbing_api::config_loader::load_config;
use dubbing_api::config_validator::ConfigValidator;
use dubbing_api::gateway::{
    ChatCompletionTranslator, EdgeTtsSynthesizer, FfmpegTool, Gateways, WhisperCli,
};
use dubbing_api::handlers::{
    api_status, cancel_dubbing, dubbing_options, dubbing_result, dubbing_status, metrics_handler,
    submit_dubbing, Authentication,
};
use dubbing_api::metrics::{create_metrics_exporter, Metrics};
use dubbing_api::pipeline::PipelineOrchestrator;
use dubbing_api::run_manager::{RetentionPolicy, RunManager};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if load_config() {
        info!("Using settings from dubbing_api.conf");
    }
    if ConfigValidator::validate_critical().is_err() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "invalid configuration, see the log for details",
        ));
    }
    ConfigValidator::validate_all();

    let handler_config = HandlerConfig::default();
    let pipeline_config = Arc::new(PipelineConfig::default());
    let translator_config = TranslatorConfig::default();
    let synthesizer_config = SynthesizerConfig::default();
    let metrics_config = MetricsConfig::default();

    let metrics = Metrics::new(create_metrics_exporter(&metrics_config.exporter_type));

    if let Err(e) = pipeline_config.ensure_directories() {
        warn!("Failed to create working directories: {}", e);
    }

    if translator_config.api_key.is_none() {
        warn!("TRANSLATION_API_KEY is not set, translation requests will be unauthenticated");
    }
    let translator = ChatCompletionTranslator::new(translator_config).map_err(|e| {
        error!("Failed to build the translation client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let gateways = Gateways {
        media: Arc::new(FfmpegTool::new(&pipeline_config)),
        transcriber: Arc::new(WhisperCli::new(&pipeline_config)),
        translator: Arc::new(translator),
        synthesizer: Arc::new(EdgeTtsSynthesizer::new(&synthesizer_config)),
    };
    let orchestrator =
        PipelineOrchestrator::new(pipeline_config.clone(), gateways, metrics.clone());
    let run_manager = RunManager::new(
        orchestrator,
        RetentionPolicy {
            max_age: handler_config.run_retention,
            sweep_interval: handler_config.cleanup_interval,
        },
        metrics.clone(),
    );

    let bind_address = format!("{}:{}", handler_config.host, handler_config.port);
    let workers = handler_config.workers();
    let timeout = Duration::from_secs(handler_config.timeout_seconds);
    let keep_alive = Duration::from_secs(handler_config.keepalive_seconds);

    info!("Starting dubbing API server on http://{}", bind_address);
    info!("Using temp directory: {}", pipeline_config.temp_dir.display());
    info!("Using output directory: {}", pipeline_config.output_dir.display());
    info!("Whisper command: {}", pipeline_config.whisper_command);
    info!("Metrics exporter: {}", metrics_config.exporter_type);
    info!("HTTP workers: {}", workers);

    HttpServer::new(move || {
        App::new()
            .wrap(Authentication)
            .wrap(Logger::default())
            .app_data(web::Data::new(run_manager.clone()))
            .app_data(web::Data::new(pipeline_config.clone()))
            .app_data(web::Data::new(handler_config.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .service(web::resource("/metrics").route(web::get().to(metrics_handler)))
            .service(submit_dubbing)
            .service(dubbing_status)
            .service(dubbing_result)
            .service(cancel_dubbing)
            .service(dubbing_options)
            .service(api_status)
    })
    .workers(workers)
    .bind(bind_address)?
    .client_disconnect_timeout(timeout)
    .keep_alive(keep_alive)
    .run()
    .await
}
