//! 自动拍摄 - 相机帧检测 + 稳定倒计时

use std::sync::{Arc, Mutex};

use flutter_rust_bridge::frb;
use log::{error, info};

use crate::api::models::capture::{CaptureApiError, CaptureEvent, CaptureStateInfo, CaptureStatsInfo, DetectionInfo};
use crate::core::capture::{
    CaptureConfig, CaptureError, CaptureListener, DetectionResult, DetectionSession, FrameSample,
};

/// Listener that buffers callbacks until the current tick returns.
struct EventCollector {
    events: Arc<Mutex<Vec<CaptureEvent>>>,
}

impl EventCollector {
    fn push(&self, event: CaptureEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl CaptureListener for EventCollector {
    fn on_detection_result(&mut self, result: &DetectionResult) {
        self.push(CaptureEvent::Detection(DetectionInfo::from(result)));
    }

    fn on_countdown_tick(&mut self, remaining_ms: u64) {
        self.push(CaptureEvent::CountdownTick { remaining_ms });
    }

    fn on_capture(&mut self) {
        self.push(CaptureEvent::Capture);
    }
}

/// 自动拍摄会话 - 每个相机页面一个
///
/// ```dart
/// final capture = AutoCapture.create(configJson: '{"target_type":"vin"}');
/// // 相机帧回调
/// final events = capture.tickYPlane(width: w, height: h, yPlane: y, timestampMs: t);
/// // 页面关闭
/// capture.stop();
/// ```
#[frb(opaque)]
pub struct AutoCapture {
    session: Mutex<DetectionSession>,
    events: Arc<Mutex<Vec<CaptureEvent>>>,
}

impl AutoCapture {
    /// 创建会话，config_json 中缺省的字段使用默认值
    #[frb(sync)]
    pub fn create(config_json: String) -> Result<Self, CaptureApiError> {
        crate::init_logging();

        let config = CaptureConfig::from_json(&config_json)?;
        let events = Arc::new(Mutex::new(Vec::new()));
        let listener = EventCollector {
            events: Arc::clone(&events),
        };
        let session = DetectionSession::new(config, Box::new(listener))?;

        info!("📷 AutoCapture: created");
        Ok(Self {
            session: Mutex::new(session),
            events,
        })
    }

    /// 处理一帧 RGBA 数据
    #[frb(sync)]
    pub fn tick_rgba(&self, width: u32, height: u32, rgba: Vec<u8>, timestamp_ms: u64) -> Vec<CaptureEvent> {
        self.run_tick(FrameSample::from_rgba(width, height, rgba), timestamp_ms)
    }

    /// 处理一帧相机 Y 平面数据
    #[frb(sync)]
    pub fn tick_y_plane(&self, width: u32, height: u32, y_plane: Vec<u8>, timestamp_ms: u64) -> Vec<CaptureEvent> {
        self.run_tick(FrameSample::from_y_plane(width, height, y_plane), timestamp_ms)
    }

    /// 取消倒计时，回到空闲状态
    #[frb(sync)]
    pub fn cancel(&self) {
        self.with_session(|s| s.cancel());
    }

    /// 结束会话，之后的 tick 不再处理
    #[frb(sync)]
    pub fn stop(&self) {
        self.with_session(|s| s.stop());
    }

    /// 重置状态与统计
    #[frb(sync)]
    pub fn reset(&self) {
        self.with_session(|s| s.reset());
    }

    #[frb(sync, getter)]
    pub fn state(&self) -> Option<CaptureStateInfo> {
        self.with_session(|s| CaptureStateInfo::from_state(&s.state(), s.is_stopped()))
    }

    #[frb(sync, getter)]
    pub fn stats(&self) -> CaptureStatsInfo {
        self.with_session(|s| CaptureStatsInfo::from(s.stats()))
            .unwrap_or_default()
    }

    fn run_tick(&self, frame: Result<FrameSample, CaptureError>, timestamp_ms: u64) -> Vec<CaptureEvent> {
        self.with_session(|session| match &frame {
            Ok(frame) => session.tick(frame, timestamp_ms),
            Err(e) => session.reject_frame(e, timestamp_ms),
        });

        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(e) => {
                error!("❌ Event buffer lock poisoned: {}", e);
                Vec::new()
            }
        }
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut DetectionSession) -> T) -> Option<T> {
        match self.session.lock() {
            Ok(mut session) => Some(f(&mut session)),
            Err(e) => {
                error!("❌ Session lock poisoned: {}", e);
                None
            }
        }
    }
}

impl Drop for AutoCapture {
    fn drop(&mut self) {
        self.stop();
        info!("🗑️ AutoCapture: released");
    }
}
