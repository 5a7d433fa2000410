//! Component E: per-record orchestration. Trim, then search; rewrite
//! qualities at corrected positions; classify the record into an
//! [`Outcome`] for the caller to render into an output record.

use crate::correct::read::{Correction, Read};
use crate::correct::search::{self, Outcome as SearchOutcome};
use crate::correct::trusted_set::TrustedSet;
use crate::correct::Config;

/// What happened to one record, in enough detail for the writer to
/// render the output line and header annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Every k-mer was already trusted; emit verbatim (spec §8 property 7:
    /// idempotence — no header annotation, no quality mutation).
    AlreadyTrusted,
    /// The BWA 3' trim alone produced an all-trusted read of sufficient
    /// length. `trimmed_len` is the retained length.
    Trimmed { trimmed_len: usize },
    /// The search engine found a unique all-trusted correction.
    Corrected { corrections: Vec<Correction> },
    /// Correction failed for the given reason; the record may still be
    /// emitted verbatim if `Config::emit_uncorrected` is set. `marker` is
    /// the external single-character annotation (several reasons share
    /// `-`, per spec.md's output contract); `reason` keeps those distinct
    /// for run-counter accounting.
    Failed { marker: char, reason: FailureReason },
}

/// Why a search failed to produce a unique correction. Several of these
/// share the same output `marker` (ambiguous, queue-aborted, and
/// exhausted are all annotated `-`) but are worth counting separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    LowCoverage,
    QueueAborted,
    QuitEarly,
    Ambiguous,
    Exhausted,
}

/// Process one record: scan untrusted k-mers, try a BWA trim, then fall
/// back to the full search. Returns the classification and the
/// (possibly rewritten) bases/quality to emit.
pub fn process_record(read: &Read, trusted: &TrustedSet, cfg: &Config) -> (RecordOutcome, Read) {
    let k = cfg.k;
    if read.len() < k {
        return (RecordOutcome::AlreadyTrusted, read.clone());
    }

    let untrusted = trusted.scan_untrusted(&read.bases);
    if untrusted.is_empty() {
        return (RecordOutcome::AlreadyTrusted, read.clone());
    }

    if let Some(trimmed) = try_trim(read, trusted, cfg) {
        return trimmed;
    }

    let probs = read.probabilities();
    let outcome = search::search(read, &probs, &untrusted, trusted, &cfg.search);
    match outcome {
        SearchOutcome::Accepted { corrections } => {
            let corrected_read = apply_corrections(read, &corrections, cfg);
            (RecordOutcome::Corrected { corrections }, corrected_read)
        }
        other => {
            let marker = other.marker().expect("non-accepted outcomes always carry a marker");
            let reason = match other {
                SearchOutcome::AbandonedLowCoverage => FailureReason::LowCoverage,
                SearchOutcome::AbandonedQueue => FailureReason::QueueAborted,
                SearchOutcome::AbandonedQuitEarly => FailureReason::QuitEarly,
                SearchOutcome::Ambiguous => FailureReason::Ambiguous,
                SearchOutcome::Exhausted => FailureReason::Exhausted,
                SearchOutcome::Accepted { .. } => unreachable!("Accepted handled above"),
            };
            (RecordOutcome::Failed { marker, reason }, read.clone())
        }
    }
}

/// Attempt the BWA 3'-end trim; succeeds only if the trimmed read is
/// entirely trusted and at least `trim_min_len` bases long.
fn try_trim(read: &Read, trusted: &TrustedSet, cfg: &Config) -> Option<(RecordOutcome, Read)> {
    let keep = read.bwa_trim_len(cfg.trimq);
    if keep >= read.len() || keep < cfg.trim_min_len {
        return None;
    }
    let trimmed_bases = &read.bases[..keep];
    if !trusted.scan_untrusted(trimmed_bases).is_empty() {
        return None;
    }
    let mut trimmed = read.clone();
    trimmed.bases.truncate(keep);
    trimmed.quality.truncate(keep);
    Some((RecordOutcome::Trimmed { trimmed_len: keep }, trimmed))
}

/// Apply a search's corrections to a read, rewriting the quality at each
/// corrected position to the scale's minimum character to signal a
/// machine-assigned base.
fn apply_corrections(read: &Read, corrections: &[Correction], cfg: &Config) -> Read {
    let mut out = read.clone();
    let min_q = cfg.quality_scale.min_quality_char();
    for c in corrections {
        out.bases[c.position] = c.to_base;
        out.quality[c.position] = min_q;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::read::QualityScale;
    use crate::correct::trusted_set::Cutoff;
    use std::io::Cursor;

    fn build_trusted(k: usize, kmers: &[&str]) -> TrustedSet {
        let mut ts = TrustedSet::empty(k).unwrap();
        let mut atgc = Default::default();
        let text: String = kmers.iter().map(|s| format!("{s}\t10\n")).collect();
        ts.load_counts(Cursor::new(text), &Cutoff::Global(1), &mut atgc).unwrap();
        ts
    }

    #[test]
    fn already_trusted_read_passes_through_unchanged() {
        let k = 4;
        let trusted = build_trusted(k, &["AAAA", "AAAC", "AACA", "ACAA", "CAAA"]);
        let read = Read::parse("r", b"AAAACAAA", b"IIIIIIII", QualityScale::Phred33);
        let cfg = Config::new(k, QualityScale::Phred33);
        let (outcome, out) = process_record(&read, &trusted, &cfg);
        assert_eq!(outcome, RecordOutcome::AlreadyTrusted);
        assert_eq!(out.bases, read.bases);
        assert_eq!(out.quality, read.quality);
    }

    #[test]
    fn trim_only_preserves_retained_bases_and_qualities() {
        let k = 4;
        let trusted = build_trusted(k, &["AAAA", "AAAG", "AAGG", "AGGG", "GGGG"]);
        // Read: trusted prefix "AAAAGGGG" + low-quality junk tail.
        let mut cfg = Config::new(k, QualityScale::Phred33);
        cfg.trim_min_len = 4;
        let seq = b"AAAAGGGGTTTT";
        let qual = b"IIIIIIII####";
        let read = Read::parse("r", seq, qual, QualityScale::Phred33);
        let (outcome, out) = process_record(&read, &trusted, &cfg);
        match outcome {
            RecordOutcome::Trimmed { trimmed_len } => {
                assert_eq!(&out.bases, &read.bases[..trimmed_len]);
                assert_eq!(&out.quality, &read.quality[..trimmed_len]);
            }
            other => panic!("expected Trimmed, got {other:?}"),
        }
    }

    #[test]
    fn corrected_positions_get_minimum_quality() {
        let k = 4;
        let trusted = build_trusted(k, &["AAAA", "AAAC", "AACC", "ACCG", "CCGT"]);
        let read = Read::parse("r", b"AAAGCCGT", b"IIIIIIII", QualityScale::Phred33);
        let cfg = Config::new(k, QualityScale::Phred33);
        let (outcome, out) = process_record(&read, &trusted, &cfg);
        if let RecordOutcome::Corrected { corrections } = outcome {
            for c in &corrections {
                assert_eq!(out.quality[c.position], b'#');
            }
        } else {
            panic!("expected Corrected, got {outcome:?}");
        }
    }
}
