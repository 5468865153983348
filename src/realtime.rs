//! Backlog/live classification of writer payloads.
//!
//! When a session starts the writer first replays whatever steno is already
//! in its log. The first empty response means the backlog is exhausted; from
//! then on every non-empty payload is a stroke happening now.

/// Detector phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Still reading stored steno; payloads are dropped
    #[default]
    Backlog,
    /// Caught up; payloads are live strokes
    Live,
}

/// What to do with one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection<'a> {
    /// Historical data, not replayed
    Backlog,
    /// First empty payload: the session just went live
    CaughtUp,
    /// Empty payload while live
    Idle,
    /// Live payload to decode
    Live(&'a [u8]),
}

/// Two-state backlog/live classifier
#[derive(Debug, Default)]
pub struct RealtimeDetector {
    phase: Phase,
}

impl RealtimeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    /// Classify one accepted payload (empty = writer had nothing more to send)
    pub fn observe<'a>(&mut self, payload: &'a [u8]) -> Detection<'a> {
        match (self.phase, payload.is_empty()) {
            (Phase::Backlog, true) => {
                self.phase = Phase::Live;
                Detection::CaughtUp
            }
            (Phase::Backlog, false) => Detection::Backlog,
            (Phase::Live, true) => Detection::Idle,
            (Phase::Live, false) => Detection::Live(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backlog_dropped_until_first_empty() {
        let mut detector = RealtimeDetector::new();
        let backlog_a = [0x3Fu8; 12];
        let backlog_b = [0x01u8; 8];
        let live = [0x01u8, 0, 0, 0];

        assert_eq!(detector.observe(&backlog_a), Detection::Backlog);
        assert_eq!(detector.observe(&backlog_b), Detection::Backlog);
        assert_eq!(detector.phase(), Phase::Backlog);
        assert_eq!(detector.observe(&[]), Detection::CaughtUp);
        assert!(detector.is_live());
        assert_eq!(detector.observe(&live), Detection::Live(&live[..]));
    }

    #[test]
    fn caught_up_happens_once() {
        let mut detector = RealtimeDetector::new();
        assert_eq!(detector.observe(&[]), Detection::CaughtUp);
        assert_eq!(detector.observe(&[]), Detection::Idle);
        assert_eq!(detector.observe(&[]), Detection::Idle);
        assert_eq!(detector.phase(), Phase::Live);
    }
}
