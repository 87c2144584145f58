use super::classifier::DetectionResult;

#[derive(Debug, Clone, PartialEq)]
pub enum CapturePhase {
    Idle,
    Accumulating {
        consecutive_hits: u32,
    },
    Armed {
        consecutive_hits: u32,
        armed_at_ms: u64,
        remaining_ms: u64,
    },
    Fired,
}

impl CapturePhase {
    pub fn consecutive_hits(&self) -> u32 {
        match self {
            CapturePhase::Accumulating { consecutive_hits }
            | CapturePhase::Armed {
                consecutive_hits, ..
            } => *consecutive_hits,
            CapturePhase::Idle | CapturePhase::Fired => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateAction {
    Continue,
    /// accumulated hits were dropped by a miss
    Reset,
    Armed { countdown_ms: u64 },
    CountdownTick { remaining_ms: u64 },
    /// countdown canceled by a miss
    Disarmed,
    Fire,
    /// input not accepted in the current phase
    Ignored,
}

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub consecutive_detections_required: u32,
    pub countdown_ms: u64,
    /// Re-arm after firing instead of ending the cycle
    pub batch_mode: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            consecutive_detections_required: 3,
            countdown_ms: 3000,
            batch_mode: false,
        }
    }
}

impl StateConfig {
    pub fn for_quick_capture() -> Self {
        Self {
            consecutive_detections_required: 2,
            countdown_ms: 1500,
            batch_mode: false,
        }
    }

    pub fn for_steady_capture() -> Self {
        Self {
            consecutive_detections_required: 5,
            countdown_ms: 3000,
            batch_mode: false,
        }
    }

    fn required_hits(&self) -> u32 {
        self.consecutive_detections_required.max(1)
    }
}

/// Snapshot of the session's mutable detection state.
///
/// `countdown_remaining_ms.is_some() == armed` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionState {
    pub consecutive_hits: u32,
    pub armed: bool,
    pub countdown_remaining_ms: Option<u64>,
    pub last_result: Option<DetectionResult>,
}

pub struct StabilityStateMachine {
    phase: CapturePhase,
    config: StateConfig,
    last_result: Option<DetectionResult>,
    captures: u64,
}

impl StabilityStateMachine {
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    pub fn with_config(config: StateConfig) -> Self {
        Self {
            phase: CapturePhase::Idle,
            config,
            last_result: None,
            captures: 0,
        }
    }

    /// Applies one tick's detection result; a countdown started here runs from `now_ms`.
    pub fn on_detection(&mut self, result: DetectionResult, now_ms: u64) -> StateAction {
        let detected = result.detected;

        let (next, action) = match &self.phase {
            CapturePhase::Fired => return StateAction::Ignored,

            CapturePhase::Armed { .. } => {
                if detected {
                    // polling is suspended while armed
                    return StateAction::Ignored;
                }
                (CapturePhase::Idle, StateAction::Disarmed)
            }

            CapturePhase::Idle | CapturePhase::Accumulating { .. } => {
                let hits = self.phase.consecutive_hits();
                if !detected {
                    let action = if hits > 0 {
                        StateAction::Reset
                    } else {
                        StateAction::Continue
                    };
                    (CapturePhase::Idle, action)
                } else {
                    let new_hits = hits + 1;
                    if new_hits >= self.config.required_hits() {
                        (
                            CapturePhase::Armed {
                                consecutive_hits: new_hits,
                                armed_at_ms: now_ms,
                                remaining_ms: self.config.countdown_ms,
                            },
                            StateAction::Armed {
                                countdown_ms: self.config.countdown_ms,
                            },
                        )
                    } else {
                        (
                            CapturePhase::Accumulating {
                                consecutive_hits: new_hits,
                            },
                            StateAction::Continue,
                        )
                    }
                }
            }
        };

        self.phase = next;
        self.last_result = Some(result);
        action
    }

    /// Advances the countdown; only meaningful while armed.
    pub fn on_timer(&mut self, now_ms: u64) -> StateAction {
        let CapturePhase::Armed {
            consecutive_hits,
            armed_at_ms,
            ..
        } = self.phase
        else {
            return StateAction::Ignored;
        };

        let elapsed = now_ms.saturating_sub(armed_at_ms);
        let remaining_ms = self.config.countdown_ms.saturating_sub(elapsed);

        if remaining_ms == 0 {
            self.captures += 1;
            self.phase = if self.config.batch_mode {
                CapturePhase::Idle
            } else {
                CapturePhase::Fired
            };
            return StateAction::Fire;
        }

        self.phase = CapturePhase::Armed {
            consecutive_hits,
            armed_at_ms,
            remaining_ms,
        };
        StateAction::CountdownTick { remaining_ms }
    }

    /// Returns to idle from any phase. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        self.phase = CapturePhase::Idle;
        self.last_result = None;
    }

    pub fn phase(&self) -> &CapturePhase {
        &self.phase
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, CapturePhase::Armed { .. })
    }

    pub fn is_fired(&self) -> bool {
        self.phase == CapturePhase::Fired
    }

    pub fn captures(&self) -> u64 {
        self.captures
    }

    pub fn state(&self) -> DetectionState {
        let countdown_remaining_ms = match self.phase {
            CapturePhase::Armed { remaining_ms, .. } => Some(remaining_ms),
            _ => None,
        };

        DetectionState {
            consecutive_hits: self.phase.consecutive_hits(),
            armed: countdown_remaining_ms.is_some(),
            countdown_remaining_ms,
            last_result: self.last_result.clone(),
        }
    }
}

impl Default for StabilityStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
