//! Image Worker - Kafka consumer for image processing commands
//!
//! Environment variables (all optional):
//! - KAFKA_BROKERS / KAFKA_TOPIC / KAFKA_GROUP_ID
//! - MESSAGE_FORMAT: json | protobuf (preferred payload format)
//! - PROCESSOR_MODE: stub | real
//! - STORAGE_BACKEND: s3 | local, OUTPUT_DIR for the local backend
//! - S3_ENDPOINT / S3_REGION / S3_ACCESS_KEY / S3_SECRET_KEY / S3_BUCKET / S3_PREFIX
//! - HTTP_HOST / HTTP_PORT
//! - LOG_LEVEL / LOG_FORMAT (RUST_LOG overrides LOG_LEVEL)

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use image_worker::config::{Config, ProcessorMode, StorageBackend};
use image_worker::handlers::{self, AppState};
use image_worker::kafka::{
    CommandConsumer, CommandSender, KafkaCommandProducer, KafkaMessageSource, KafkaSourceConfig,
    MessageDecoder,
};
use image_worker::metrics::{ProcessingMetrics, PrometheusMetrics};
use image_worker::middleware::HttpMetrics;
use image_worker::services::{
    CommandProcessor, DryRunProcessor, HttpImageFetcher, ImageCommandProcessor,
};
use image_worker::{logging, shutdown, ServiceStats};
use media_storage::{LocalStorage, ObjectStorage, S3Storage};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    logging::init(&config);

    info!(
        kafka_brokers = %config.brokers(),
        kafka_topic = %config.kafka_topic,
        group_id = %config.kafka_group_id,
        message_format = %config.message_format,
        processor_mode = ?config.processor_mode,
        "Starting image worker"
    );

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(shutdown::listen_for_os_signals(trigger.clone()));

    let stats = Arc::new(ServiceStats::new());
    let processor = build_processor(&config).await?;

    let source = KafkaMessageSource::new(&KafkaSourceConfig {
        brokers: config.brokers(),
        topic: config.kafka_topic.clone(),
        group_id: config.kafka_group_id.clone(),
    })
    .context("failed to create Kafka consumer")?;
    info!("Kafka consumer initialized");

    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(config.message_format),
        processor,
        stats.clone(),
        shutdown.clone(),
    )
    .with_processing_timeout(config.processing_timeout());

    // The worker still consumes without a producer; /send answers 503
    let sender: Option<Arc<dyn CommandSender>> = match KafkaCommandProducer::new(
        &config.brokers(),
        &config.kafka_topic,
        config.message_format,
    ) {
        Ok(producer) => Some(Arc::new(producer)),
        Err(e) => {
            warn!(error = %e, "Kafka producer unavailable, /send disabled");
            None
        }
    };

    let state = web::Data::new(AppState::new(stats.clone(), sender, config.send_timeout()));
    let bind_address = config.http_bind_address();
    info!(address = %bind_address, "Starting HTTP server");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(HttpMetrics)
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {}", bind_address))?
    .disable_signals()
    .shutdown_timeout(config.shutdown_timeout_secs)
    .run();

    let server_handle = server.handle();
    let mut server_task = tokio::spawn(server);

    let consumer_trigger = trigger.clone();
    let consumer_task = tokio::spawn(async move {
        let result = consumer.run().await;
        if let Err(e) = &result {
            error!(error = %e, "Consumer stopped with a fatal error");
        }
        consumer_trigger.trigger();
        result
    });

    tokio::select! {
        _ = shutdown.wait() => {
            info!("Stopping HTTP server");
            server_handle.stop(true).await;
            if let Err(e) = server_task.await {
                warn!(error = %e, "HTTP server task failed");
            }
        }
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => warn!("HTTP server exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task failed"),
            }
            trigger.trigger();
        }
    }

    let counters = consumer_task
        .await
        .context("consumer task panicked")?
        .context("consumer failed")?;

    info!(
        fetched = counters.fetched,
        committed = counters.committed,
        messages_processed = stats.messages_processed(),
        "Image worker stopped"
    );
    Ok(())
}

async fn build_processor(config: &Config) -> anyhow::Result<Arc<dyn CommandProcessor>> {
    let metrics: Arc<dyn ProcessingMetrics> = Arc::new(PrometheusMetrics);

    match config.processor_mode {
        ProcessorMode::Stub => {
            info!("Using dry-run processor, images will not be downloaded");
            Ok(Arc::new(DryRunProcessor::with_metrics(metrics)))
        }
        ProcessorMode::Real => {
            let fetcher = Arc::new(
                HttpImageFetcher::new(config.download_timeout(), config.max_download_bytes)
                    .context("failed to build HTTP client")?,
            );

            let storage: Arc<dyn ObjectStorage> = match config.storage_backend {
                StorageBackend::S3 => {
                    let storage = S3Storage::new(config.s3())
                        .await
                        .context("failed to initialize S3 storage")?;
                    if let Err(e) = storage.health_check().await {
                        warn!(error = %e, bucket = %config.s3_bucket, "S3 bucket not reachable yet");
                    }
                    info!(bucket = %config.s3_bucket, "S3 storage initialized");
                    Arc::new(storage)
                }
                StorageBackend::Local => {
                    let storage = LocalStorage::new(config.output_dir.clone())
                        .context("failed to initialize local storage")?;
                    info!(path = %config.output_dir.display(), "Local storage initialized");
                    Arc::new(storage)
                }
            };

            Ok(Arc::new(ImageCommandProcessor::new(fetcher, storage, metrics)))
        }
    }
}
