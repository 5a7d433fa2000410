//! Per-run outcome counters, accumulated across chunks and merged with
//! `AddAssign` (mirrors the teacher's `FastqMersExtractionCounters`).

#[derive(Debug, Default, Clone, Copy)]
pub struct CorrectionCounters {
    pub total: u64,
    pub already_trusted: u64,
    pub trimmed: u64,
    pub corrected: u64,
    pub ambiguous: u64,
    pub low_coverage: u64,
    pub queue_aborted: u64,
    pub quit_early: u64,
}

impl std::ops::AddAssign for CorrectionCounters {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.already_trusted += other.already_trusted;
        self.trimmed += other.trimmed;
        self.corrected += other.corrected;
        self.ambiguous += other.ambiguous;
        self.low_coverage += other.low_coverage;
        self.queue_aborted += other.queue_aborted;
        self.quit_early += other.quit_early;
    }
}

impl CorrectionCounters {
    pub fn record(&mut self, outcome: &crate::correct::driver::RecordOutcome) {
        use crate::correct::driver::{FailureReason, RecordOutcome};
        self.total += 1;
        match outcome {
            RecordOutcome::AlreadyTrusted => self.already_trusted += 1,
            RecordOutcome::Trimmed { .. } => self.trimmed += 1,
            RecordOutcome::Corrected { .. } => self.corrected += 1,
            RecordOutcome::Failed { reason: FailureReason::LowCoverage, .. } => self.low_coverage += 1,
            RecordOutcome::Failed { reason: FailureReason::QuitEarly, .. } => self.quit_early += 1,
            RecordOutcome::Failed { reason: FailureReason::QueueAborted, .. } => self.queue_aborted += 1,
            // Ambiguous and Exhausted share the `-` output marker (both are
            // "search ran, no unique correction found") and are folded into
            // one counter; queue-aborted and quit-early are distinguished
            // above because they reflect resource limits, not the read.
            RecordOutcome::Failed { reason: FailureReason::Ambiguous, .. } => self.ambiguous += 1,
            RecordOutcome::Failed { reason: FailureReason::Exhausted, .. } => self.ambiguous += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::driver::{FailureReason, RecordOutcome};

    #[test]
    fn add_assign_sums_every_field() {
        let mut a = CorrectionCounters {
            total: 10,
            corrected: 3,
            ..Default::default()
        };
        let b = CorrectionCounters {
            total: 5,
            corrected: 1,
            ambiguous: 2,
            ..Default::default()
        };
        a += b;
        assert_eq!(a.total, 15);
        assert_eq!(a.corrected, 4);
        assert_eq!(a.ambiguous, 2);
    }

    #[test]
    fn record_classifies_each_outcome() {
        let mut c = CorrectionCounters::default();
        c.record(&RecordOutcome::AlreadyTrusted);
        c.record(&RecordOutcome::Trimmed { trimmed_len: 10 });
        c.record(&RecordOutcome::Failed {
            marker: '+',
            reason: FailureReason::LowCoverage,
        });
        assert_eq!(c.total, 3);
        assert_eq!(c.already_trusted, 1);
        assert_eq!(c.trimmed, 1);
        assert_eq!(c.low_coverage, 1);
    }

    #[test]
    fn record_distinguishes_queue_aborted_from_ambiguous() {
        let mut c = CorrectionCounters::default();
        c.record(&RecordOutcome::Failed {
            marker: '-',
            reason: FailureReason::QueueAborted,
        });
        c.record(&RecordOutcome::Failed {
            marker: '-',
            reason: FailureReason::Ambiguous,
        });
        assert_eq!(c.queue_aborted, 1);
        assert_eq!(c.ambiguous, 1);
    }
}
