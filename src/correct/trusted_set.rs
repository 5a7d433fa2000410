//! Component B: the trusted-k-mer membership oracle.
//!
//! A bit array of length `4^k`, one bit per possible k-mer, loadable from
//! `(seq, count)` pairs at a global or AT-content-dependent cutoff, or from
//! a binary dump. Mirrors the teacher crate's `KmerSpec`/`KmerCodes`
//! width-selection discipline, but the bit array here is a membership set
//! rather than a counts table, so it only ever needs one bit per k-mer.

use crate::correct::kmer_codec::{encode_base, pack, revcomp, shift, Base};
use anyhow::{bail, Context, Result};
use std::io::{BufRead, Read as IoRead, Write};

/// Cutoff applied when admitting a `(seq, count)` record.
#[derive(Debug, Clone)]
pub enum Cutoff {
    /// A k-mer is trusted iff its observed count >= this value.
    Global(u64),
    /// A k-mer is trusted iff its observed count >= `cutoffs[at_content(seq)]`.
    /// `cutoffs` must have length `k + 1`.
    ByAtContent(Vec<u64>),
}

impl Cutoff {
    fn threshold(&self, at_count: usize) -> Result<u64> {
        match self {
            Cutoff::Global(c) => Ok(*c),
            Cutoff::ByAtContent(v) => v
                .get(at_count)
                .copied()
                .context("AT-content cutoff vector too short for this k"),
        }
    }
}

/// Running A/T vs G/C totals over every admitted k-mer, used downstream to
/// set a flat substitution prior.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtGc {
    pub at: u64,
    pub gc: u64,
}

/// Bit-indexed membership set over the 2k-bit key space for one k-mer
/// length.
pub struct TrustedSet {
    k: usize,
    bits: Vec<u64>,
    set_count: usize,
}

const MAGIC: &[u8; 8] = b"KCORRCT1";

impl TrustedSet {
    /// Number of words needed to hold one bit per possible k-mer.
    fn word_count(k: usize) -> usize {
        let total_bits = 1usize << (2 * k);
        (total_bits + 63) / 64
    }

    pub fn empty(k: usize) -> Result<Self> {
        if k == 0 || k > 31 {
            bail!("k-mer size {k} out of supported range (1..=31)");
        }
        Ok(TrustedSet {
            k,
            bits: vec![0u64; Self::word_count(k)],
            set_count: 0,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    fn get_bit(&self, h: u64) -> bool {
        let word = (h >> 6) as usize;
        let bit = h & 63;
        (self.bits[word] >> bit) & 1 == 1
    }

    #[inline]
    fn set_bit(&mut self, h: u64) {
        let word = (h >> 6) as usize;
        let bit = h & 63;
        let mask = 1u64 << bit;
        if self.bits[word] & mask == 0 {
            self.bits[word] |= mask;
            self.set_count += 1;
        }
    }

    /// Number of k-mers currently marked trusted.
    pub fn count(&self) -> usize {
        self.set_count
    }

    /// Consume `<seq>\t<count>` records from `source`; admit a record iff
    /// its count clears `cutoff` (global, or AT-content-dependent). For
    /// each admitted record, mark both the k-mer and its reverse
    /// complement trusted, and accumulate `atgc`.
    ///
    /// Malformed lines are skipped with a warning; a k-mer containing `N`
    /// is never inserted.
    pub fn load_counts(&mut self, source: impl BufRead, cutoff: &Cutoff, atgc: &mut AtGc) -> Result<()> {
        for (line_no, line) in source.lines().enumerate() {
            let line = line.context("reading k-mer count source")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((seq, count_str)) = line.split_once('\t') else {
                log::warn!("skipping malformed count-file line {}: {line:?}", line_no + 1);
                continue;
            };
            let Ok(count) = count_str.trim().parse::<u64>() else {
                log::warn!(
                    "skipping count-file line {} with non-numeric count: {line:?}",
                    line_no + 1
                );
                continue;
            };
            if seq.len() != self.k {
                log::warn!(
                    "skipping count-file line {}: sequence length {} != k={}",
                    line_no + 1,
                    seq.len(),
                    self.k
                );
                continue;
            }

            let bases: Vec<Base> = seq.bytes().map(encode_base).collect();
            let Some(h) = pack(&bases) else {
                // N in the k-mer: never inserted.
                continue;
            };
            let at = bases.iter().filter(|b| matches!(b, Base::A | Base::T)).count();
            let threshold = cutoff.threshold(at)?;
            if count < threshold {
                continue;
            }

            self.set_bit(h);
            self.set_bit(revcomp(h, self.k));
            atgc.at += at as u64;
            atgc.gc += (self.k - at) as u64;
        }
        Ok(())
    }

    /// Restore a previously serialized bit array plus `atgc` totals.
    pub fn load_binary(mut source: impl IoRead, atgc: &mut AtGc) -> Result<Self> {
        let mut magic = [0u8; 8];
        source.read_exact(&mut magic).context("reading dump magic")?;
        if &magic != MAGIC {
            bail!("not a kcorrect trusted-set dump (bad magic)");
        }
        let mut buf8 = [0u8; 8];
        source.read_exact(&mut buf8).context("reading k")?;
        let k = u64::from_le_bytes(buf8) as usize;
        let mut set = TrustedSet::empty(k)?;

        source.read_exact(&mut buf8).context("reading at total")?;
        atgc.at = u64::from_le_bytes(buf8);
        source.read_exact(&mut buf8).context("reading gc total")?;
        atgc.gc = u64::from_le_bytes(buf8);

        source.read_exact(&mut buf8).context("reading word count")?;
        let word_count = u64::from_le_bytes(buf8) as usize;
        if word_count != set.bits.len() {
            bail!(
                "dump word count {word_count} does not match expected {} for k={k}",
                set.bits.len()
            );
        }
        let mut count_buf = [0u8; 8];
        source.read_exact(&mut count_buf).context("reading set bit count")?;
        set.set_count = u64::from_le_bytes(count_buf) as usize;

        let mut raw = vec![0u8; word_count * 8];
        source.read_exact(&mut raw).context("reading bit array")?;
        for (word, chunk) in set.bits.iter_mut().zip(raw.chunks_exact(8)) {
            *word = u64::from_le_bytes(chunk.try_into().unwrap());
        }
        Ok(set)
    }

    /// Serialize the bit array plus `atgc` totals. Round-trips with
    /// [`TrustedSet::load_binary`]. The exact byte layout is an
    /// implementation detail (magic, k, atgc totals, word count, set-bit
    /// count, then the raw little-endian words).
    pub fn write_binary(&self, mut sink: impl Write, atgc: &AtGc) -> Result<()> {
        sink.write_all(MAGIC)?;
        sink.write_all(&(self.k as u64).to_le_bytes())?;
        sink.write_all(&atgc.at.to_le_bytes())?;
        sink.write_all(&atgc.gc.to_le_bytes())?;
        sink.write_all(&(self.bits.len() as u64).to_le_bytes())?;
        sink.write_all(&(self.set_count as u64).to_le_bytes())?;
        for word in &self.bits {
            sink.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Pack the first `k` bases of `window` and look it up.
    pub fn check(&self, window: &[Base]) -> bool {
        match pack(window) {
            Some(h) => self.get_bit(h),
            None => false,
        }
    }

    /// As [`TrustedSet::check`], also returning the packed key used for
    /// hashing continuity. When `window` contains an `N`, the returned
    /// hash treats it as base `A` purely so that arithmetic `shift`
    /// continuity is preserved for the caller's rolling scan; the boolean
    /// still correctly reports "untrusted" in that case.
    pub fn check_with_hash(&self, window: &[Base]) -> (bool, u64) {
        let mut h: u64 = 0;
        let mut has_n = false;
        for &b in window {
            let code = if b.is_acgt() {
                b.code()
            } else {
                has_n = true;
                0
            };
            h = (h << 2) | code;
        }
        (!has_n && self.get_bit(h), h)
    }

    /// Incremental variant of [`TrustedSet::check_with_hash`]: advances the
    /// rolling hash by one base using [`shift`] and re-checks membership.
    ///
    /// This primitive is *not* aware of `N`s that may be interior to the
    /// new window — it only knows the two boundary bases. Code that needs
    /// a fully `N`-correct incremental scan should use
    /// [`TrustedSet::scan_untrusted`], which layers an `N`-tracking
    /// counter on top of this primitive (this is the whole point of the
    /// incremental API: the counter is O(1) amortized, not O(k)).
    pub fn check_shift(&self, prev_h: u64, old_left: Base, new_right: Base) -> (bool, u64) {
        let safe_left = if old_left.is_acgt() { old_left } else { Base::A };
        let safe_right = if new_right.is_acgt() { new_right } else { Base::A };
        let h = shift(prev_h, safe_left, safe_right, self.k);
        (new_right.is_acgt() && self.get_bit(h), h)
    }

    /// Scan every length-`k` window of `seq` and return the sorted list of
    /// start positions whose k-mer is untrusted (including every window
    /// that contains an `N`). Equivalent to, but far cheaper than, calling
    /// [`TrustedSet::check`] independently at each position.
    pub fn scan_untrusted(&self, seq: &[Base]) -> Vec<usize> {
        let k = self.k;
        let len = seq.len();
        let mut untrusted = Vec::new();
        if len < k {
            return untrusted;
        }

        // `n_countdown` counts how many of the upcoming windows still
        // contain the most recently seen N (mirrors the teacher's
        // `n_in_window` bookkeeping in `kmer_codec::build_codes`).
        let mut n_countdown: usize = seq[..k].iter().rev().position(|b| !b.is_acgt()).map_or(0, |rev_idx| k - rev_idx);

        let (mut trusted, mut h) = self.check_with_hash(&seq[0..k]);
        if n_countdown > 0 {
            trusted = false;
        }
        if !trusted {
            untrusted.push(0);
        }

        for i in 1..=(len - k) {
            let old_left = seq[i - 1];
            let new_right = seq[i + k - 1];
            if n_countdown > 0 {
                n_countdown -= 1;
            }
            if !new_right.is_acgt() {
                n_countdown = k;
            }
            let (raw_trusted, new_h) = self.check_shift(h, old_left, new_right);
            h = new_h;
            let trusted = raw_trusted && n_countdown == 0;
            if !trusted {
                untrusted.push(i);
            }
        }
        untrusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn set_from(k: usize, seqs: &[&str], cutoff: u64) -> (TrustedSet, AtGc) {
        let mut ts = TrustedSet::empty(k).unwrap();
        let mut atgc = AtGc::default();
        let text: String = seqs.iter().map(|s| format!("{s}\t{cutoff}\n")).collect();
        ts.load_counts(Cursor::new(text), &Cutoff::Global(cutoff), &mut atgc)
            .unwrap();
        (ts, atgc)
    }

    #[test]
    fn load_counts_respects_global_cutoff() {
        let mut ts = TrustedSet::empty(3).unwrap();
        let mut atgc = AtGc::default();
        let text = "AAA\t10\nCCC\t2\n";
        ts.load_counts(Cursor::new(text), &Cutoff::Global(5), &mut atgc)
            .unwrap();
        assert_eq!(ts.count(), 2); // AAA + its revcomp (TTT)
        let aaa: Vec<Base> = "AAA".bytes().map(encode_base).collect();
        let ccc: Vec<Base> = "CCC".bytes().map(encode_base).collect();
        assert!(ts.check(&aaa));
        assert!(!ts.check(&ccc));
    }

    #[test]
    fn reverse_complement_is_always_trusted_alongside() {
        let (ts, _) = set_from(4, &["ACGT"], 1);
        let rc: Vec<Base> = "ACGT".bytes().map(encode_base).collect(); // palindrome
        assert!(ts.check(&rc));
        let (ts2, _) = set_from(4, &["AAAC"], 1);
        let rc2: Vec<Base> = "GTTT".bytes().map(encode_base).collect();
        assert!(ts2.check(&rc2));
    }

    #[test]
    fn n_containing_kmer_never_trusted_or_inserted() {
        let (ts, _) = set_from(4, &["AACN"], 1);
        assert_eq!(ts.count(), 0);
    }

    #[test]
    fn at_content_cutoff_varies_by_bucket() {
        let mut ts = TrustedSet::empty(4).unwrap();
        let mut atgc = AtGc::default();
        // k=4: cutoffs[at_count] for at_count in 0..=4
        let cutoffs = vec![100, 100, 100, 1, 1];
        let text = "AAAT\t2\nCCGG\t2\n"; // AAAT has at=4 (cutoff 1, admitted); CCGG has at=0 (cutoff 100, rejected)
        ts.load_counts(Cursor::new(text), &Cutoff::ByAtContent(cutoffs), &mut atgc)
            .unwrap();
        let aaat: Vec<Base> = "AAAT".bytes().map(encode_base).collect();
        let ccgg: Vec<Base> = "CCGG".bytes().map(encode_base).collect();
        assert!(ts.check(&aaat));
        assert!(!ts.check(&ccgg));
    }

    #[test]
    fn binary_dump_roundtrips() {
        let (ts, atgc) = set_from(4, &["ACGT", "TTTT", "GGGG"], 1);
        let mut buf = Vec::new();
        ts.write_binary(&mut buf, &atgc).unwrap();

        let mut restored_atgc = AtGc::default();
        let restored = TrustedSet::load_binary(Cursor::new(buf), &mut restored_atgc).unwrap();
        assert_eq!(restored.count(), ts.count());
        assert_eq!(restored.k(), ts.k());
        assert_eq!(restored_atgc.at, atgc.at);
        assert_eq!(restored_atgc.gc, atgc.gc);
        let acgt: Vec<Base> = "ACGT".bytes().map(encode_base).collect();
        assert!(restored.check(&acgt));
    }

    #[test]
    fn scan_untrusted_matches_naive_per_window_check() {
        let (ts, _) = set_from(3, &["AAA", "AAC", "ACG"], 1);
        let seq: Vec<Base> = "AAACGTT".bytes().map(encode_base).collect();
        let k = 3;
        let naive: Vec<usize> = (0..=seq.len() - k)
            .filter(|&i| !ts.check(&seq[i..i + k]))
            .collect();
        let incremental = ts.scan_untrusted(&seq);
        assert_eq!(naive, incremental);
    }

    #[test]
    fn scan_untrusted_marks_every_window_touching_n() {
        let (ts, _) = set_from(3, &["AAA"], 1);
        let seq: Vec<Base> = "AANAA".bytes().map(encode_base).collect();
        let untrusted = ts.scan_untrusted(&seq);
        // windows: AAN(0, untrusted), ANA(1, untrusted), NAA(2, untrusted)
        assert_eq!(untrusted, vec![0, 1, 2]);
    }
}
