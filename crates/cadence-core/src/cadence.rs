//! Pure cadence arithmetic: when the ledger is checked and what it must see.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::period::Period;

pub const ALIGNER_POLL: Duration = Duration::from_secs(30);
pub const WINDOW_POLL: Duration = Duration::from_secs(60);
pub const SETTLE_DELAY: Duration = Duration::from_secs(60);

/// Upper bound on aligner checks: roughly one full period of polling.
pub fn aligner_max_checks(period: Period, poll: Duration) -> u32 {
    let poll_secs = poll.as_secs().max(1);
    (period.as_duration().as_secs() / poll_secs).max(1) as u32
}

/// Pre-window minute `i` (0-based) is polled unless it is the last minute of the period,
/// which races the first scheduled snapshot.
pub fn pre_window_polls_at(minute_index: u32, period: Period) -> bool {
    minute_index + 1 < period.minutes()
}

/// Ledger length required after the `iteration`-th full-period sleep: one snapshot from the
/// first boundary plus one per elapsed period.
pub fn expected_cadence_len(iteration: u32) -> usize {
    iteration as usize + 2
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointKind {
    PreWindow,
    Cadence,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub kind: CheckpointKind,
    pub index: u32,
    /// Offset from the activation call.
    pub offset: Duration,
    pub expected_len: usize,
}

/// Planned observation schedule for one run, measured from activation.
#[derive(Clone, Debug)]
pub struct Timeline {
    pub period: Period,
    pub verify_times: u32,
    pub checkpoints: Vec<Checkpoint>,
    /// Longest the aligner may block before activation.
    pub alignment_bound: Duration,
}

impl Timeline {
    pub fn plan(period: Period, verify_times: u32, aligner_poll: Duration, settle_delay: Duration) -> Self {
        let mut checkpoints = Vec::new();
        let mut t = Duration::ZERO;
        for i in 0..period.minutes() {
            t += WINDOW_POLL;
            if pre_window_polls_at(i, period) {
                checkpoints.push(Checkpoint { kind: CheckpointKind::PreWindow, index: i, offset: t, expected_len: 0 });
            }
        }
        t += settle_delay;
        for i in 0..verify_times {
            t += period.as_duration();
            checkpoints.push(Checkpoint {
                kind: CheckpointKind::Cadence,
                index: i,
                offset: t,
                expected_len: expected_cadence_len(i),
            });
        }
        let alignment_bound = aligner_poll * aligner_max_checks(period, aligner_poll);
        Self { period, verify_times, checkpoints, alignment_bound }
    }

    /// Offset of the final ledger observation; the window is over when it passes.
    pub fn last_check(&self) -> Duration {
        self.checkpoints.last().map(|c| c.offset).unwrap_or(Duration::ZERO)
    }

    /// Alignment plus every sleep up to the last observation.
    pub fn worst_case_duration(&self) -> Duration {
        self.alignment_bound + self.last_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn aligner_bound_is_one_period_of_checks() {
        assert_eq!(aligner_max_checks(Period::new(3).unwrap(), ALIGNER_POLL), 6);
        assert_eq!(aligner_max_checks(Period::new(1).unwrap(), ALIGNER_POLL), 2);
        assert_eq!(aligner_max_checks(Period::new(1).unwrap(), Duration::from_secs(600)), 1);
    }

    #[test]
    fn period_three_five_verifications() {
        let tl = Timeline::plan(Period::new(3).unwrap(), 5, ALIGNER_POLL, SETTLE_DELAY);
        let pre: Vec<_> = tl.checkpoints.iter().filter(|c| c.kind == CheckpointKind::PreWindow).collect();
        assert_eq!(pre.len(), 2);
        assert_eq!(pre[0].offset, mins(1));
        assert_eq!(pre[1].offset, mins(2));
        assert!(pre.iter().all(|c| c.expected_len == 0));

        let cadence: Vec<_> = tl.checkpoints.iter().filter(|c| c.kind == CheckpointKind::Cadence).collect();
        let lens: Vec<_> = cadence.iter().map(|c| c.expected_len).collect();
        assert_eq!(lens, vec![2, 3, 4, 5, 6]);
        assert_eq!(cadence[0].offset, mins(7));
        assert_eq!(tl.last_check(), mins(19));
        assert_eq!(tl.worst_case_duration(), mins(22));
    }

    #[test]
    fn period_one_has_no_pre_window_polls() {
        let tl = Timeline::plan(Period::new(1).unwrap(), 1, ALIGNER_POLL, SETTLE_DELAY);
        assert_eq!(tl.checkpoints.len(), 1);
        assert_eq!(tl.checkpoints[0].offset, mins(3));
    }
}
