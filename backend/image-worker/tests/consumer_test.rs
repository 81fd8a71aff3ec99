/// Consume loop tests against a scripted message source
mod common;

use async_trait::async_trait;
use common::{message, png_bytes, ScriptedSource, Step, StubFetcher};
use image_worker::kafka::{
    encode, CommandConsumer, ConsumerError, MessageDecoder, MessageFormat, SourceError,
};
use image_worker::models::{Command, Operation, ProcessingResult, ResizeParams};
use image_worker::services::{
    CommandProcessor, DryRunProcessor, ImageCommandProcessor, ProcessError, ProcessingContext,
    ProcessingFailure,
};
use image_worker::shutdown::{self, ShutdownTrigger};
use image_worker::ServiceStats;
use media_storage::MemoryStorage;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn resize(id: &str) -> Command {
    Command::new(
        id,
        "http://images.local/a.png",
        Operation::Resize(Some(ResizeParams {
            width: 8,
            height: 8,
            maintain_aspect_ratio: false,
        })),
    )
}

fn json_payload(id: &str) -> Vec<u8> {
    encode(&resize(id), MessageFormat::Json).unwrap()
}

async fn run_with_timeout<S>(
    consumer: CommandConsumer<S>,
) -> Result<image_worker::kafka::ConsumerStats, ConsumerError>
where
    S: image_worker::kafka::MessageSource + 'static,
{
    tokio::time::timeout(Duration::from_secs(5), consumer.run())
        .await
        .expect("consumer did not stop")
}

#[tokio::test]
async fn test_decode_failure_is_committed_and_loop_continues() {
    let (trigger, signal) = shutdown::channel();
    let source = ScriptedSource::new(
        vec![
            Step::Deliver(message(0, vec![0xff, 0xff, 0xff])),
            Step::Deliver(message(1, json_payload("after-garbage"))),
        ],
        trigger,
    );
    let committed = source.committed();
    let closed = source.closed();

    let processor = Arc::new(DryRunProcessor::new());
    let stats = Arc::new(ServiceStats::new());
    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(MessageFormat::Json),
        processor.clone(),
        stats.clone(),
        signal,
    );

    let counters = run_with_timeout(consumer).await.unwrap();

    assert_eq!(*committed.lock().unwrap(), vec![0, 1]);
    assert_eq!(counters.decode_failures, 1);
    assert_eq!(counters.committed, 2);
    assert_eq!(processor.processed_count(), 1);
    assert_eq!(stats.messages_processed(), 1);
    assert!(closed.load(Ordering::SeqCst));
    assert!(!stats.broker_connected());
}

#[tokio::test]
async fn test_messages_processed_in_fetch_order() {
    let (trigger, signal) = shutdown::channel();
    let source = ScriptedSource::new(
        vec![
            Step::Deliver(message(10, json_payload("first"))),
            Step::Deliver(message(11, encode(&resize("second"), MessageFormat::Protobuf).unwrap())),
            Step::Deliver(message(12, json_payload("third"))),
        ],
        trigger,
    );
    let committed = source.committed();

    let processor = Arc::new(DryRunProcessor::new());
    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(MessageFormat::Json),
        processor.clone(),
        Arc::new(ServiceStats::new()),
        signal,
    );

    run_with_timeout(consumer).await.unwrap();

    let ids: Vec<String> = processor
        .processed_commands()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
    assert_eq!(*committed.lock().unwrap(), vec![10, 11, 12]);
}

#[tokio::test]
async fn test_processing_failure_is_committed() {
    let (trigger, signal) = shutdown::channel();
    let source = ScriptedSource::new(vec![Step::Deliver(message(0, json_payload("p1")))], trigger);
    let committed = source.committed();

    let storage = MemoryStorage::new();
    let processor = Arc::new(ImageCommandProcessor::new(
        Arc::new(StubFetcher::failing(500)),
        Arc::new(storage.clone()),
        Arc::new(common::RecordingMetrics::default()),
    ));
    let stats = Arc::new(ServiceStats::new());
    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(MessageFormat::Json),
        processor,
        stats.clone(),
        signal,
    );

    let counters = run_with_timeout(consumer).await.unwrap();

    assert_eq!(counters.processing_failures, 1);
    assert_eq!(*committed.lock().unwrap(), vec![0]);
    assert_eq!(stats.messages_processed(), 1);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn test_successful_processing_stores_output() {
    let (trigger, signal) = shutdown::channel();
    let source = ScriptedSource::new(vec![Step::Deliver(message(3, json_payload("ok-1")))], trigger);

    let storage = MemoryStorage::new();
    let processor = Arc::new(ImageCommandProcessor::new(
        Arc::new(StubFetcher::serving(png_bytes(20, 20, [5, 5, 5, 255]))),
        Arc::new(storage.clone()),
        Arc::new(common::RecordingMetrics::default()),
    ));
    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(MessageFormat::Json),
        processor,
        Arc::new(ServiceStats::new()),
        signal,
    )
    .with_processing_timeout(Some(Duration::from_secs(5)));

    let counters = run_with_timeout(consumer).await.unwrap();

    assert_eq!(counters.committed, 1);
    assert!(storage.contains("ok-1.png"));
}

#[tokio::test]
async fn test_transient_fetch_error_is_retried() {
    let (trigger, signal) = shutdown::channel();
    let source = ScriptedSource::new(
        vec![
            Step::Fail(SourceError::Transient("broker hiccup".into())),
            Step::Deliver(message(5, json_payload("after-error"))),
        ],
        trigger,
    );
    let committed = source.committed();

    let processor = Arc::new(DryRunProcessor::new());
    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(MessageFormat::Json),
        processor.clone(),
        Arc::new(ServiceStats::new()),
        signal,
    )
    .with_fetch_retry_delay(Duration::from_millis(5));

    let counters = run_with_timeout(consumer).await.unwrap();

    assert_eq!(counters.fetch_errors, 1);
    assert_eq!(*committed.lock().unwrap(), vec![5]);
    assert_eq!(processor.processed_count(), 1);
}

#[tokio::test]
async fn test_fatal_fetch_error_stops_consumer() {
    let (trigger, signal) = shutdown::channel();
    let source = ScriptedSource::new(
        vec![
            Step::Deliver(message(0, json_payload("before-fatal"))),
            Step::Fail(SourceError::Fatal("authentication failed".into())),
            Step::Deliver(message(1, json_payload("never-seen"))),
        ],
        trigger,
    );
    let committed = source.committed();
    let closed = source.closed();

    let processor = Arc::new(DryRunProcessor::new());
    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(MessageFormat::Json),
        processor.clone(),
        Arc::new(ServiceStats::new()),
        signal,
    );

    let err = run_with_timeout(consumer).await.unwrap_err();

    assert!(matches!(err, ConsumerError::Source(SourceError::Fatal(_))));
    assert_eq!(*committed.lock().unwrap(), vec![0]);
    assert_eq!(processor.processed_count(), 1);
    assert!(closed.load(Ordering::SeqCst));
}

/// Requests shutdown mid-flight, then waits on the context
struct InterruptedProcessor {
    trigger: ShutdownTrigger,
}

#[async_trait]
impl CommandProcessor for InterruptedProcessor {
    async fn process(
        &self,
        ctx: &ProcessingContext,
        command: &Command,
    ) -> Result<ProcessingResult, ProcessingFailure> {
        self.trigger.trigger();
        let error = ctx
            .run(std::future::pending::<Result<(), ProcessError>>())
            .await
            .unwrap_err();

        Err(ProcessingFailure {
            result: ProcessingResult::failed(&command.id, error.to_string()),
            error,
        })
    }
}

#[tokio::test]
async fn test_cancelled_processing_is_not_committed() {
    let (trigger, signal) = shutdown::channel();
    let processor = Arc::new(InterruptedProcessor {
        trigger: trigger.clone(),
    });
    let source = ScriptedSource::new(vec![Step::Deliver(message(7, json_payload("cut-short")))], trigger);
    let committed = source.committed();

    let stats = Arc::new(ServiceStats::new());
    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(MessageFormat::Json),
        processor,
        stats.clone(),
        signal,
    );

    let counters = run_with_timeout(consumer).await.unwrap();

    assert!(committed.lock().unwrap().is_empty());
    assert_eq!(counters.committed, 0);
    assert_eq!(stats.messages_processed(), 0);
}

#[tokio::test]
async fn test_shutdown_before_start_exits_cleanly() {
    let (trigger, signal) = shutdown::channel();
    trigger.trigger();
    let source = ScriptedSource::new(vec![Step::Deliver(message(0, json_payload("x")))], trigger);
    let committed = source.committed();

    let consumer = CommandConsumer::new(
        source,
        MessageDecoder::new(MessageFormat::Json),
        Arc::new(DryRunProcessor::new()),
        Arc::new(ServiceStats::new()),
        signal,
    );

    let counters = run_with_timeout(consumer).await.unwrap();
    assert_eq!(counters.fetched, 0);
    assert!(committed.lock().unwrap().is_empty());
}
