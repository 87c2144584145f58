//! 检测会话 - 轮询节拍、OCR 单飞、倒计时与拍摄信号
//!
//! The caller drives the session with `tick(frame, now_ms)` on its own timer (or
//! for every camera frame). A tick only acts once `detection_interval_ms` has
//! passed since the last acted tick. Per acted tick exactly one of these happens:
//! - armed: the countdown advances, no frame is scored
//! - OCR pending: the outcome (or its timeout) is applied, no frame is scored
//! - otherwise the frame is scored, and either handed to OCR or applied directly

use std::sync::Arc;

use log::{debug, info, warn};

use super::analyzer::analyze_region;
use super::classifier::{DetectionResult, DetectionSource, HeuristicClassifier};
use super::config::CaptureConfig;
use super::error::CaptureError;
use super::frame::FrameSample;
use super::ocr::{CommandRecognizer, OcrEngine, OcrEnhancer, OcrJob, OcrWorker, TextRecognizer};
use super::state_machine::{CapturePhase, DetectionState, StabilityStateMachine, StateAction};

/// Receiver of the session's outputs. Called synchronously from `tick`.
pub trait CaptureListener: Send {
    /// Every applied detection result, hit or miss.
    ///
    /// A tick that hands its frame to OCR reports nothing, and so do the ticks
    /// that poll the pending job. The fused result (or the heuristic fallback)
    /// is reported once, on the tick that applies it, and carries the timestamp
    /// of the tick that scored the frame.
    fn on_detection_result(&mut self, result: &DetectionResult);
    /// Each tick while armed; the first call carries the full countdown.
    fn on_countdown_tick(&mut self, remaining_ms: u64);
    /// Exactly once per fired cycle.
    fn on_capture(&mut self);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub ticks_scored: u64,
    pub detections: u64,
    pub captures: u64,
    pub ocr_attempts: u64,
    /// OCR timeouts, dropped triggers and passes that left the heuristic result as is
    pub ocr_fallbacks: u64,
}

struct PendingOcr {
    id: u64,
    submitted_at_ms: u64,
    heuristic: DetectionResult,
}

pub struct DetectionSession {
    config: CaptureConfig,
    classifier: HeuristicClassifier,
    state_machine: StabilityStateMachine,
    listener: Box<dyn CaptureListener>,
    ocr: Option<OcrWorker>,
    pending_ocr: Option<PendingOcr>,
    next_job_id: u64,
    last_tick_ms: Option<u64>,
    stopped: bool,
    stats: SessionStats,
}

impl DetectionSession {
    /// OCR, when enabled, uses `config.ocr_command`, loaded on first use.
    pub fn new(config: CaptureConfig, listener: Box<dyn CaptureListener>) -> Result<Self, CaptureError> {
        let command = config.ocr_command.clone();
        let engine = OcrEngine::new(move || {
            CommandRecognizer::load(&command).map(|r| Box::new(r) as Box<dyn TextRecognizer>)
        });
        Self::with_engine(config, listener, Arc::new(engine))
    }

    pub fn with_engine(
        config: CaptureConfig,
        listener: Box<dyn CaptureListener>,
        engine: Arc<OcrEngine>,
    ) -> Result<Self, CaptureError> {
        let classifier = HeuristicClassifier::with_threshold(config.target_type, config.confidence_threshold);

        let ocr = if config.enable_ocr {
            Some(OcrWorker::spawn(OcrEnhancer::new(engine, classifier.threshold()))?)
        } else {
            None
        };

        info!(
            "🎯 DetectionSession: target={}, threshold={:.2}, required={}, ocr={}",
            config.target_type,
            classifier.threshold(),
            config.consecutive_detections_required,
            config.enable_ocr
        );

        Ok(Self {
            state_machine: StabilityStateMachine::with_config(config.state_config()),
            classifier,
            config,
            listener,
            ocr,
            pending_ocr: None,
            next_job_id: 0,
            last_tick_ms: None,
            stopped: false,
            stats: SessionStats::default(),
        })
    }

    pub fn tick(&mut self, frame: &FrameSample, now_ms: u64) {
        if !self.begin_tick(now_ms) {
            return;
        }
        if self.advance_countdown(now_ms) || self.poll_ocr(now_ms) {
            return;
        }

        let region = self.config.target_type.profile().region;
        let score = analyze_region(frame, &region);
        let heuristic = self.classifier.classify(&score, now_ms);
        self.stats.ticks_scored += 1;
        debug!(
            "🔍 {} tick @{}ms: confidence={:.2} ({})",
            self.config.target_type, now_ms, heuristic.confidence, heuristic.rationale
        );

        if self.try_submit_ocr(frame, &heuristic, now_ms) {
            return;
        }
        self.apply(heuristic, now_ms);
    }

    /// A tick whose frame could not be decoded counts as a miss.
    pub fn reject_frame(&mut self, error: &CaptureError, now_ms: u64) {
        if !self.begin_tick(now_ms) {
            return;
        }
        if self.advance_countdown(now_ms) || self.poll_ocr(now_ms) {
            return;
        }

        warn!("⚠️ Skipping frame @{}ms: {}", now_ms, error);
        let miss = DetectionResult::miss(self.config.target_type, format!("Invalid frame: {}", error), now_ms);
        self.apply(miss, now_ms);
    }

    /// Back to idle; the session keeps running. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        if self.state_machine.is_armed() {
            info!("⏹️ Countdown canceled");
        }
        self.state_machine.cancel();
        // a late outcome for this job no longer matches and is discarded
        self.pending_ocr = None;
    }

    /// Ends the session; later ticks are no-ops. Safe to call repeatedly.
    ///
    /// After a single-shot capture the session is already stopped and the
    /// fired state stays readable.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.cancel();
        self.shutdown();
    }

    /// Cancels and clears statistics. Does not revive a stopped session.
    pub fn reset(&mut self) {
        self.cancel();
        self.last_tick_ms = None;
        self.stats = SessionStats::default();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_ocr_pending(&self) -> bool {
        self.pending_ocr.is_some()
    }

    pub fn state(&self) -> DetectionState {
        self.state_machine.state()
    }

    pub fn phase(&self) -> &CapturePhase {
        self.state_machine.phase()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.clone()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn begin_tick(&mut self, now_ms: u64) -> bool {
        if self.stopped {
            return false;
        }
        if let Some(last) = self.last_tick_ms {
            if now_ms.saturating_sub(last) < self.config.detection_interval_ms {
                return false;
            }
        }
        self.last_tick_ms = Some(now_ms);
        true
    }

    /// Returns `true` when the tick was consumed by the countdown.
    fn advance_countdown(&mut self, now_ms: u64) -> bool {
        if !self.state_machine.is_armed() {
            return false;
        }

        match self.state_machine.on_timer(now_ms) {
            StateAction::CountdownTick { remaining_ms } => {
                debug!("⏳ Countdown: {}ms", remaining_ms);
                self.listener.on_countdown_tick(remaining_ms);
            }
            StateAction::Fire => {
                self.stats.captures += 1;
                info!("📸 Capture fired ({} total)", self.stats.captures);
                self.listener.on_capture();
                if !self.config.batch_mode {
                    self.shutdown();
                }
            }
            _ => {}
        }
        true
    }

    /// Returns `true` when the tick was consumed by a pending OCR job.
    fn poll_ocr(&mut self, now_ms: u64) -> bool {
        let Some(pending_id) = self.pending_ocr.as_ref().map(|p| p.id) else {
            return false;
        };

        let mut finished = None;
        if let Some(worker) = &self.ocr {
            while let Some(outcome) = worker.try_outcome() {
                if outcome.id == pending_id {
                    finished = Some(outcome.result);
                    break;
                }
                debug!("Discarding stale OCR outcome {}", outcome.id);
            }
        }

        if let Some(result) = finished {
            self.pending_ocr = None;
            if result.source != DetectionSource::Ocr {
                self.stats.ocr_fallbacks += 1;
            }
            self.apply(result, now_ms);
            return true;
        }

        let timeout_ms = self.config.ocr_timeout_ms;
        let timed_out = self
            .pending_ocr
            .as_ref()
            .is_some_and(|p| now_ms.saturating_sub(p.submitted_at_ms) >= timeout_ms);
        if timed_out {
            if let Some(pending) = self.pending_ocr.take() {
                warn!(
                    "⚠️ {}, using heuristic result",
                    CaptureError::Timeout(now_ms.saturating_sub(pending.submitted_at_ms))
                );
                self.stats.ocr_fallbacks += 1;
                self.apply(pending.heuristic, now_ms);
            }
        }
        true
    }

    /// Returns `true` when the job was handed to the OCR worker.
    fn try_submit_ocr(&mut self, frame: &FrameSample, heuristic: &DetectionResult, now_ms: u64) -> bool {
        let Some(worker) = &self.ocr else {
            return false;
        };
        if !OcrEnhancer::should_attempt(heuristic) {
            return false;
        }

        self.stats.ocr_attempts += 1;
        let crop = match frame.crop_luma(&self.config.target_type.profile().region) {
            Ok(crop) => crop,
            Err(e) => {
                warn!("⚠️ OCR crop failed: {}", e);
                self.stats.ocr_fallbacks += 1;
                return false;
            }
        };

        self.next_job_id += 1;
        let id = self.next_job_id;
        let submitted = worker.submit(OcrJob {
            id,
            crop,
            heuristic: heuristic.clone(),
        });

        if !submitted {
            self.stats.ocr_fallbacks += 1;
            return false;
        }

        debug!("🔤 OCR job {} submitted @{}ms", id, now_ms);
        self.pending_ocr = Some(PendingOcr {
            id,
            submitted_at_ms: now_ms,
            heuristic: heuristic.clone(),
        });
        true
    }

    /// 释放 OCR 线程，不动状态机
    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.pending_ocr = None;
        self.ocr = None;
        self.stopped = true;
        info!("🛑 DetectionSession stopped: {:?}", self.stats);
    }

    fn apply(&mut self, result: DetectionResult, now_ms: u64) {
        if result.detected {
            self.stats.detections += 1;
        }
        self.listener.on_detection_result(&result);

        match self.state_machine.on_detection(result, now_ms) {
            StateAction::Armed { countdown_ms } => {
                info!("🔔 {} stable, countdown {}ms", self.config.target_type, countdown_ms);
                self.listener.on_countdown_tick(countdown_ms);
            }
            StateAction::Reset => debug!("Stability reset"),
            StateAction::Disarmed => info!("⏹️ Countdown canceled by miss"),
            _ => {}
        }
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        info!("🗑️ DetectionSession: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capture::target::CaptureTargetType;
    use image::GrayImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Result(DetectionResult),
        Countdown(u64),
        Capture,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl CaptureListener for Recorder {
        fn on_detection_result(&mut self, result: &DetectionResult) {
            self.events.lock().unwrap().push(Event::Result(result.clone()));
        }

        fn on_countdown_tick(&mut self, remaining_ms: u64) {
            self.events.lock().unwrap().push(Event::Countdown(remaining_ms));
        }

        fn on_capture(&mut self) {
            self.events.lock().unwrap().push(Event::Capture);
        }
    }

    /// 200x100 Y plane: bright VIN plate with a dark 2px outline in the VIN region.
    fn vin_frame() -> FrameSample {
        let (w, h) = (200u32, 100u32);
        let mut data = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let in_region = (40..160).contains(&x) && (40..60).contains(&y);
                let outline = x < 42 || x >= 158 || y < 42 || y >= 58;
                data.push(match (in_region, outline) {
                    (true, true) => 20,
                    (true, false) => 230,
                    _ => 128,
                });
            }
        }
        FrameSample::from_y_plane(w, h, data).unwrap()
    }

    fn blank_frame() -> FrameSample {
        FrameSample::from_y_plane(200, 100, vec![128; 200 * 100]).unwrap()
    }

    fn session(config: CaptureConfig) -> (DetectionSession, Recorder) {
        let recorder = Recorder::default();
        let session = DetectionSession::new(config, Box::new(recorder.clone())).unwrap();
        (session, recorder)
    }

    fn results(events: &[Event]) -> Vec<&DetectionResult> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Result(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_vin_frame_is_detected() {
        let classifier = HeuristicClassifier::new(CaptureTargetType::Vin);
        let score = analyze_region(&vin_frame(), &CaptureTargetType::Vin.profile().region);
        let result = classifier.classify(&score, 0);
        assert!(result.detected, "{:?} {:?}", score, result);

        let blank = analyze_region(&blank_frame(), &CaptureTargetType::Vin.profile().region);
        assert!(!classifier.classify(&blank, 0).detected);
    }

    #[test]
    fn test_vin_capture_scenario() {
        let (mut session, recorder) = session(CaptureConfig::for_target(CaptureTargetType::Vin));
        let frame = vin_frame();

        for t in [0, 500, 1000] {
            session.tick(&frame, t);
        }
        let events = recorder.take();
        assert_eq!(results(&events).len(), 3);
        assert!(results(&events).iter().all(|r| r.detected));
        assert_eq!(events.last(), Some(&Event::Countdown(3000)));
        assert!(session.state().armed);

        for t in (1500..=3500).step_by(500) {
            session.tick(&frame, t);
        }
        assert_eq!(
            recorder.take(),
            vec![
                Event::Countdown(2500),
                Event::Countdown(2000),
                Event::Countdown(1500),
                Event::Countdown(1000),
                Event::Countdown(500),
            ]
        );

        session.tick(&frame, 4000);
        assert_eq!(recorder.take(), vec![Event::Capture]);
        assert!(session.is_stopped());
        assert_eq!(session.phase(), &CapturePhase::Fired);
        let state = session.state();
        assert!(!state.armed);
        assert_eq!(state.last_result.map(|r| r.timestamp_ms), Some(1000));

        // an explicit stop after the fire keeps the fired state
        session.stop();
        assert_eq!(session.phase(), &CapturePhase::Fired);
        assert!(session.state().last_result.is_some());

        // single-shot: later ticks do nothing
        session.tick(&frame, 4500);
        session.tick(&frame, 10_000);
        assert!(recorder.take().is_empty());
        assert_eq!(session.stats().captures, 1);
        assert_eq!(session.stats().ticks_scored, 3);
    }

    #[test]
    fn test_interval_gating() {
        let (mut session, recorder) = session(CaptureConfig::default());
        let frame = vin_frame();

        session.tick(&frame, 0);
        session.tick(&frame, 100);
        session.tick(&frame, 499);
        assert_eq!(recorder.take().len(), 1);

        session.tick(&frame, 500);
        assert_eq!(recorder.take().len(), 1);
        assert_eq!(session.state().consecutive_hits, 2);
    }

    #[test]
    fn test_miss_resets_stability() {
        let (mut session, recorder) = session(CaptureConfig::default());

        session.tick(&vin_frame(), 0);
        session.tick(&vin_frame(), 500);
        session.tick(&blank_frame(), 1000);
        assert_eq!(session.state().consecutive_hits, 0);
        assert!(!session.state().armed);

        session.tick(&vin_frame(), 1500);
        session.tick(&vin_frame(), 2000);
        assert!(!session.state().armed);
        session.tick(&vin_frame(), 2500);
        assert!(session.state().armed);

        let events = recorder.take();
        assert_eq!(events.iter().filter(|e| matches!(e, Event::Countdown(_))).count(), 1);
    }

    #[test]
    fn test_invalid_frame_is_a_miss() {
        let (mut session, recorder) = session(CaptureConfig::default());
        session.tick(&vin_frame(), 0);

        let err = FrameSample::from_rgba(10, 10, vec![0; 3]).unwrap_err();
        session.reject_frame(&err, 500);

        let events = recorder.take();
        let last = results(&events).pop().unwrap().clone();
        assert!(!last.detected);
        assert_eq!(last.confidence, 0.0);
        assert!(last.rationale.starts_with("Invalid frame"));
        assert_eq!(session.state().consecutive_hits, 0);
    }

    #[test]
    fn test_cancel_while_armed() {
        let (mut session, recorder) = session(CaptureConfig::default());
        let frame = vin_frame();
        for t in [0, 500, 1000] {
            session.tick(&frame, t);
        }
        assert!(session.state().armed);

        session.cancel();
        session.cancel();
        let state = session.state();
        assert!(!state.armed);
        assert_eq!(state.countdown_remaining_ms, None);
        assert_eq!(state.consecutive_hits, 0);
        assert!(state.last_result.is_none());
        assert!(!session.is_stopped());
        recorder.take();

        // well past the old deadline: the frame is scored again, nothing fires
        session.tick(&frame, 5000);
        let events = recorder.take();
        assert_eq!(results(&events).len(), 1);
        assert!(!events.contains(&Event::Capture));
        assert_eq!(session.state().consecutive_hits, 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut session, recorder) = session(CaptureConfig::default());
        session.stop();
        session.stop();
        session.cancel();

        session.tick(&vin_frame(), 0);
        assert!(recorder.take().is_empty());
        assert!(session.is_stopped());
    }

    #[test]
    fn test_batch_mode_captures_repeatedly() {
        let config = CaptureConfig {
            consecutive_detections_required: 1,
            countdown_ms: 1000,
            batch_mode: true,
            ..Default::default()
        };
        let (mut session, recorder) = session(config);
        let frame = vin_frame();

        for t in (0..=4000).step_by(500) {
            session.tick(&frame, t);
        }

        let captures = recorder.take().into_iter().filter(|e| *e == Event::Capture).count();
        // arm @0, fire @1000, arm @1500, fire @2500, arm @3000, fire @4000
        assert_eq!(captures, 3);
        assert_eq!(session.stats().captures, 3);
        assert!(!session.is_stopped());
    }

    struct Failing;

    impl TextRecognizer for Failing {
        fn recognize(&self, _crop: &GrayImage) -> Result<String, CaptureError> {
            Err(CaptureError::Recognition("engine crashed".to_string()))
        }
    }

    struct FixedText(&'static str);

    impl TextRecognizer for FixedText {
        fn recognize(&self, _crop: &GrayImage) -> Result<String, CaptureError> {
            Ok(self.0.to_string())
        }
    }

    /// Blocks until the test sends (or drops) the release signal.
    struct Blocking(Arc<Mutex<Receiver<()>>>);

    impl TextRecognizer for Blocking {
        fn recognize(&self, _crop: &GrayImage) -> Result<String, CaptureError> {
            let _ = self.0.lock().unwrap().recv();
            Ok("1HGCM82633A004352".to_string())
        }
    }

    fn ocr_session(config: CaptureConfig, engine: OcrEngine) -> (DetectionSession, Recorder) {
        let recorder = Recorder::default();
        let session = DetectionSession::with_engine(
            CaptureConfig {
                enable_ocr: true,
                ..config
            },
            Box::new(recorder.clone()),
            Arc::new(engine),
        )
        .unwrap();
        (session, recorder)
    }

    /// Ticks until a detection result is reported.
    fn tick_until_result(session: &mut DetectionSession, recorder: &Recorder, mut now: u64) -> DetectionResult {
        let frame = vin_frame();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            session.tick(&frame, now);
            if let Some(Event::Result(r)) = recorder.take().into_iter().find(|e| matches!(e, Event::Result(_))) {
                return r;
            }
            assert!(Instant::now() < deadline, "no result reported");
            thread::sleep(Duration::from_millis(5));
            now += 500;
        }
    }

    #[test]
    fn test_ocr_failure_keeps_heuristic_result() {
        let config = CaptureConfig {
            ocr_timeout_ms: u64::MAX,
            ..Default::default()
        };
        let engine = OcrEngine::new(|| Ok(Box::new(Failing) as Box<dyn TextRecognizer>));
        let (mut session, recorder) = ocr_session(config, engine);

        session.tick(&vin_frame(), 0);
        assert!(session.is_ocr_pending());
        assert!(recorder.take().is_empty());

        let result = tick_until_result(&mut session, &recorder, 500);
        assert_eq!(result.source, DetectionSource::Heuristic);
        assert_eq!(result.timestamp_ms, 0);
        assert!(result.detected);

        let stats = session.stats();
        assert_eq!(stats.ocr_attempts, 1);
        assert_eq!(stats.ocr_fallbacks, 1);
    }

    #[test]
    fn test_ocr_match_boosts_result() {
        let config = CaptureConfig {
            ocr_timeout_ms: u64::MAX,
            ..Default::default()
        };
        let engine = OcrEngine::new(|| Ok(Box::new(FixedText("1HGCM82633A004352")) as Box<dyn TextRecognizer>));
        let (mut session, recorder) = ocr_session(config, engine);

        session.tick(&vin_frame(), 0);
        let result = tick_until_result(&mut session, &recorder, 500);

        assert_eq!(result.source, DetectionSource::Ocr);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.recognized_text.as_deref(), Some("1HGCM82633A004352"));
        assert_eq!(session.state().consecutive_hits, 1);
        assert_eq!(session.stats().ocr_fallbacks, 0);
    }

    #[test]
    fn test_ocr_timeout_and_busy_worker_fall_back() {
        let (release, gate) = mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(gate));
        let engine = OcrEngine::new(move || Ok(Box::new(Blocking(Arc::clone(&gate))) as Box<dyn TextRecognizer>));
        let (mut session, recorder) = ocr_session(CaptureConfig::default(), engine);
        let frame = vin_frame();

        session.tick(&frame, 0);
        session.tick(&frame, 500);
        session.tick(&frame, 2500);
        assert!(recorder.take().is_empty());
        assert!(session.is_ocr_pending());

        // 3000ms on the session clock
        session.tick(&frame, 3000);
        let events = recorder.take();
        let fallback = results(&events)[0].clone();
        assert_eq!(fallback.source, DetectionSource::Heuristic);
        assert_eq!(fallback.timestamp_ms, 0);
        assert!(!session.is_ocr_pending());

        // worker still stuck on job 1: the new trigger is dropped, heuristic applies now
        session.tick(&frame, 3500);
        let events = recorder.take();
        assert_eq!(results(&events).len(), 1);
        assert_eq!(results(&events)[0].timestamp_ms, 3500);
        assert!(!session.is_ocr_pending());

        let stats = session.stats();
        assert_eq!(stats.ocr_attempts, 2);
        assert_eq!(stats.ocr_fallbacks, 2);
        assert_eq!(session.state().consecutive_hits, 2);

        release.send(()).unwrap();
        session.stop();
    }

    /// First call blocks until released and reads a valid VIN, later calls read nothing useful.
    struct SlowFirstRead {
        calls: AtomicUsize,
        gate: Arc<Mutex<Receiver<()>>>,
    }

    impl TextRecognizer for SlowFirstRead {
        fn recognize(&self, _crop: &GrayImage) -> Result<String, CaptureError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = self.gate.lock().unwrap().recv();
                return Ok("1HGCM82633A004352".to_string());
            }
            Ok("-- glare --".to_string())
        }
    }

    fn wait_until_idle(session: &DetectionSession) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.ocr.as_ref().is_some_and(|w| w.is_busy()) {
            assert!(Instant::now() < deadline, "OCR worker stuck");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_late_outcome_of_timed_out_job_is_discarded() {
        let (release, gate) = mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(gate));
        let engine = OcrEngine::new(move || {
            Ok(Box::new(SlowFirstRead {
                calls: AtomicUsize::new(0),
                gate: Arc::clone(&gate),
            }) as Box<dyn TextRecognizer>)
        });
        let (mut session, recorder) = ocr_session(CaptureConfig::default(), engine);
        let frame = vin_frame();

        // job 1 times out on the session clock
        session.tick(&frame, 0);
        session.tick(&frame, 3000);
        let events = recorder.take();
        assert_eq!(results(&events).len(), 1);
        assert_eq!(results(&events)[0].timestamp_ms, 0);

        // job 1 finishes late; its outcome waits in the channel
        release.send(()).unwrap();
        wait_until_idle(&session);

        session.tick(&frame, 3500);
        assert!(session.is_ocr_pending());
        assert!(recorder.take().is_empty());
        wait_until_idle(&session);

        session.tick(&frame, 4000);
        let events = recorder.take();
        let applied = results(&events);
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].timestamp_ms, 3500);
        assert_eq!(applied[0].source, DetectionSource::Heuristic);
        assert!(applied[0].recognized_text.is_none());
        assert!(!session.is_ocr_pending());

        // the 0.95 read of job 1 was never applied
        let last = session.state().last_result.unwrap();
        assert_eq!(last.timestamp_ms, 3500);
        assert_ne!(last.confidence, 0.95);
        assert_eq!(session.state().consecutive_hits, 2);

        let stats = session.stats();
        assert_eq!(stats.ocr_attempts, 2);
        assert_eq!(stats.ocr_fallbacks, 2);
    }

    #[test]
    fn test_cancel_discards_pending_ocr() {
        let (release, gate) = mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(gate));
        let engine = OcrEngine::new(move || Ok(Box::new(Blocking(Arc::clone(&gate))) as Box<dyn TextRecognizer>));
        let (mut session, recorder) = ocr_session(CaptureConfig::default(), engine);

        session.tick(&vin_frame(), 0);
        assert!(session.is_ocr_pending());
        session.cancel();
        assert!(!session.is_ocr_pending());

        release.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));

        // the late outcome for job 1 never surfaces; a blank frame is scored instead
        session.tick(&blank_frame(), 500);
        let events = recorder.take();
        assert_eq!(results(&events).len(), 1);
        assert!(!results(&events)[0].detected);
        assert_eq!(session.state().consecutive_hits, 0);
    }

    #[test]
    fn test_reset_clears_stats() {
        let (mut session, _recorder) = session(CaptureConfig::default());
        session.tick(&vin_frame(), 0);
        assert_eq!(session.stats().ticks_scored, 1);

        session.reset();
        assert_eq!(session.stats(), SessionStats::default());
        assert_eq!(session.state().consecutive_hits, 0);

        // gating restarts too
        session.tick(&vin_frame(), 100);
        assert_eq!(session.stats().ticks_scored, 1);
    }
}
