#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageOutputFormat, Rgba, RgbaImage};
use image_worker::kafka::{MessageSource, SourceError, SourceMessage};
use image_worker::metrics::ProcessingMetrics;
use image_worker::services::{FetchError, ImageFetcher};
use image_worker::shutdown::ShutdownTrigger;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// PNG-encoded solid image
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .expect("encode test png");
    buffer.into_inner()
}

pub struct StubFetcher {
    response: Result<Bytes, u16>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn serving(body: Vec<u8>) -> Self {
        Self {
            response: Ok(Bytes::from(body)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            response: Err(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for StubFetcher {
    async fn fetch(&self, _url: &str) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(body) => Ok(body.clone()),
            Err(status) => Err(FetchError::Status { status: *status }),
        }
    }
}

#[derive(Default)]
pub struct RecordingMetrics {
    pub processed: Mutex<Vec<(String, String)>>,
    pub durations: Mutex<Vec<String>>,
}

impl ProcessingMetrics for RecordingMetrics {
    fn record_processed(&self, command: &str, status: &str) {
        self.processed
            .lock()
            .unwrap()
            .push((command.to_string(), status.to_string()));
    }

    fn observe_duration(&self, command: &str, _seconds: f64) {
        self.durations.lock().unwrap().push(command.to_string());
    }
}

pub enum Step {
    Deliver(SourceMessage),
    Fail(SourceError),
}

/// Replays a fixed script, then requests shutdown and blocks
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    committed: Arc<Mutex<Vec<i64>>>,
    closed: Arc<AtomicBool>,
    trigger: ShutdownTrigger,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>, trigger: ShutdownTrigger) -> Self {
        Self {
            steps: steps.into(),
            committed: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            trigger,
        }
    }

    pub fn committed(&self) -> Arc<Mutex<Vec<i64>>> {
        self.committed.clone()
    }

    pub fn closed(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn fetch(&mut self) -> Result<SourceMessage, SourceError> {
        match self.steps.pop_front() {
            Some(Step::Deliver(message)) => Ok(message),
            Some(Step::Fail(err)) => Err(err),
            None => {
                self.trigger.trigger();
                std::future::pending().await
            }
        }
    }

    async fn commit(&mut self, message: &SourceMessage) -> Result<(), SourceError> {
        self.committed.lock().unwrap().push(message.offset);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub fn message(offset: i64, payload: Vec<u8>) -> SourceMessage {
    SourceMessage {
        topic: "image-commands".to_string(),
        partition: 0,
        offset,
        key: None,
        payload,
    }
}
