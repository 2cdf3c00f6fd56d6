use strike_telemetry::{phase_log, LogPhase};

/// Confirmed presence frames required before the latch may arm.
pub const MIN_PRESENCE_FRAMES: u32 = 4;

/// Frames of presence loss the latch bridges after an impact signature.
pub const MAX_LATCHED_FRAMES: u32 = 10;

/// Bridges transient presence loss around an impact.
///
/// After enough confirmed presences, an observed impact signature latches
/// the gate; while latched, downstream treats loss of the cluster as the
/// same physical object. The latch burns one frame per frame of real
/// loss and expires back to unlatched.
#[derive(Debug, Default)]
pub struct PresenceContinuityLatch {
    frames_of_presence: u32,
    latched: bool,
    frames_remaining: u32,
}

impl PresenceContinuityLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_arm(&self) -> bool {
        self.frames_of_presence >= MIN_PRESENCE_FRAMES
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn frames_remaining(&self) -> u32 {
        self.frames_remaining
    }

    /// Advance one frame. Returns the latch state after this frame.
    pub fn update(&mut self, raw_present: bool, impact_signature: bool) -> bool {
        if impact_signature && self.can_arm() && !self.latched {
            self.latched = true;
            self.frames_remaining = MAX_LATCHED_FRAMES;
            phase_log!(LogPhase::Shot, "presence continuity latched");
        }

        if raw_present {
            self.frames_of_presence += 1;
            if self.latched {
                // presence is back; the latch re-covers a full loss window
                self.frames_remaining = MAX_LATCHED_FRAMES;
            }
        } else {
            self.frames_of_presence = 0;
            if self.latched {
                if self.frames_remaining > 0 {
                    self.frames_remaining -= 1;
                }
                if self.frames_remaining == 0 {
                    self.latched = false;
                    phase_log!(LogPhase::Shot, "presence continuity latch expired");
                }
            }
        }

        self.latched
    }

    pub fn reset(&mut self) {
        self.frames_of_presence = 0;
        self.latched = false;
        self.frames_remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cannot_arm_without_presence_history() {
        let mut latch = PresenceContinuityLatch::new();
        assert!(!latch.update(false, true));
        assert!(!latch.is_latched());
    }

    #[test]
    fn latches_after_presence_then_bridges_loss() {
        let mut latch = PresenceContinuityLatch::new();
        for _ in 0..MIN_PRESENCE_FRAMES {
            latch.update(true, false);
        }
        assert!(latch.can_arm());
        assert!(latch.update(true, true));
        // bridges exactly MAX_LATCHED_FRAMES lost frames
        for i in 0..MAX_LATCHED_FRAMES {
            assert!(latch.is_latched(), "dropped early at lost frame {}", i);
            latch.update(false, false);
        }
        assert!(!latch.is_latched());
    }

    #[test]
    fn presence_refreshes_the_window() {
        let mut latch = PresenceContinuityLatch::new();
        for _ in 0..MIN_PRESENCE_FRAMES {
            latch.update(true, false);
        }
        latch.update(true, true);
        for _ in 0..5 {
            latch.update(false, false);
        }
        assert!(latch.is_latched());
        latch.update(true, false); // ball seen again
        for _ in 0..MAX_LATCHED_FRAMES - 1 {
            latch.update(false, false);
            assert!(latch.is_latched());
        }
        latch.update(false, false);
        assert!(!latch.is_latched());
    }
}
