//! OCR 增强 - 启发式置信度达到下限后，识别目标区域文字并按规则校验
//!
//! OCR never downgrades a result: on recognizer error, load failure, timeout or
//! a text mismatch the heuristic result is used as is.

use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::{GrayImage, ImageOutputFormat};
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;

use super::classifier::{DetectionResult, DetectionSource};
use super::error::CaptureError;
use super::validation::ValidationPattern;

pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, crop: &GrayImage) -> Result<String, CaptureError>;
}

type RecognizerFactory =
    Box<dyn Fn() -> Result<Box<dyn TextRecognizer>, CaptureError> + Send + Sync>;

/// Recognizer handle created on first use.
///
/// Concurrent first callers block until the single in-flight initialization
/// finishes; a failed initialization is retried by the next caller.
pub struct OcrEngine {
    factory: RecognizerFactory,
    recognizer: OnceCell<Box<dyn TextRecognizer>>,
}

impl OcrEngine {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TextRecognizer>, CaptureError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            recognizer: OnceCell::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.recognizer.get().is_some()
    }

    pub fn recognizer(&self) -> Result<&dyn TextRecognizer, CaptureError> {
        self.recognizer
            .get_or_try_init(|| {
                info!("🔧 Loading OCR recognizer");
                let recognizer = (self.factory)()?;
                info!("✅ OCR recognizer ready");
                Ok(recognizer)
            })
            .map(|r| &**r)
    }

    pub fn recognize(&self, crop: &GrayImage) -> Result<String, CaptureError> {
        self.recognizer()?.recognize(crop)
    }
}

pub struct OcrEnhancer {
    engine: Arc<OcrEngine>,
    threshold: f32,
}

impl OcrEnhancer {
    /// `threshold` is the session's effective detection threshold.
    pub fn new(engine: Arc<OcrEngine>, threshold: f32) -> Self {
        Self { engine, threshold }
    }

    pub fn should_attempt(result: &DetectionResult) -> bool {
        result.confidence >= result.target_type.profile().ocr_trigger
    }

    pub fn enhance(&self, crop: &GrayImage, heuristic: DetectionResult) -> DetectionResult {
        if !Self::should_attempt(&heuristic) {
            return heuristic;
        }

        let text = match self.engine.recognize(crop) {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ OCR failed, keeping heuristic result: {}", e);
                return heuristic;
            }
        };

        let target = heuristic.target_type;
        let Some(matched) = ValidationPattern::for_target(target).validate(&text) else {
            debug!("OCR text did not match {} pattern: {:?}", target, text.trim());
            return heuristic;
        };

        let confidence = heuristic.confidence.max(target.profile().ocr_confidence);
        debug!("🔤 OCR matched {}: {} ({:.2})", target, matched, confidence);

        DetectionResult {
            detected: confidence >= self.threshold,
            confidence,
            target_type: target,
            rationale: format!("{}, OCR: {}", heuristic.rationale, matched),
            timestamp_ms: heuristic.timestamp_ms,
            source: DetectionSource::Ocr,
            recognized_text: Some(matched),
        }
    }
}

pub struct OcrJob {
    pub id: u64,
    pub crop: GrayImage,
    pub heuristic: DetectionResult,
}

#[derive(Debug)]
pub struct OcrOutcome {
    pub id: u64,
    pub result: DetectionResult,
}

/// Dedicated OCR thread. Holds at most one job; submissions while busy are dropped.
pub struct OcrWorker {
    jobs: Option<Sender<OcrJob>>,
    outcomes: Receiver<OcrOutcome>,
    busy: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl OcrWorker {
    pub fn spawn(enhancer: OcrEnhancer) -> Result<Self, CaptureError> {
        let (job_tx, job_rx) = mpsc::channel::<OcrJob>();
        let (outcome_tx, outcome_rx) = mpsc::channel::<OcrOutcome>();
        let busy = Arc::new(AtomicBool::new(false));

        let worker_busy = Arc::clone(&busy);
        let handle = thread::Builder::new()
            .name("ocr-worker".to_string())
            .spawn(move || run_ocr_worker(enhancer, job_rx, outcome_tx, worker_busy))?;

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: outcome_rx,
            busy,
            handle: Some(handle),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Returns `false` when the job was dropped (worker busy or gone).
    pub fn submit(&self, job: OcrJob) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("OCR worker busy, dropping job {}", job.id);
            return false;
        }

        let id = job.id;
        if jobs.send(job).is_err() {
            error!("❌ OCR worker is gone, job {} dropped", id);
            return false;
        }
        true
    }

    pub fn try_outcome(&self) -> Option<OcrOutcome> {
        match self.outcomes.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for OcrWorker {
    fn drop(&mut self) {
        // closing the channel ends the worker loop after its current job
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        info!("🗑️ OcrWorker: released");
    }
}

fn run_ocr_worker(
    enhancer: OcrEnhancer,
    jobs: Receiver<OcrJob>,
    outcomes: Sender<OcrOutcome>,
    busy: Arc<AtomicBool>,
) {
    info!("🔤 OCR worker started");

    while let Ok(job) = jobs.recv() {
        debug!("OCR worker: processing job {}", job.id);
        let result = enhancer.enhance(&job.crop, job.heuristic);
        let sent = outcomes.send(OcrOutcome { id: job.id, result });
        busy.store(false, Ordering::SeqCst);

        if sent.is_err() {
            break;
        }
    }

    info!("OCR worker: channel closed, exiting");
}

/// Pipes the crop as PNG into a tesseract-compatible executable.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    /// Checks that `program` runs before handing out a recognizer.
    pub fn load(program: &str) -> Result<Self, CaptureError> {
        let output = Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CaptureError::EngineLoad(format!("{}: {}", program, e)))?;

        if !output.status.success() {
            return Err(CaptureError::EngineLoad(format!(
                "{} --version exited with {}",
                program, output.status
            )));
        }

        Ok(Self {
            program: program.to_string(),
            args: ["stdin", "stdout", "--psm", "6"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    }
}

impl TextRecognizer for CommandRecognizer {
    fn recognize(&self, crop: &GrayImage) -> Result<String, CaptureError> {
        let mut png = Cursor::new(Vec::new());
        crop.write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| CaptureError::Recognition(format!("PNG encode failed: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| CaptureError::Recognition("stdin unavailable".to_string()))?;
            stdin.write_all(png.get_ref())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(CaptureError::Recognition(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
