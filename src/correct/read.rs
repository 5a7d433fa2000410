//! Read data model: header/sequence/quality, Phred decoding, and the BWA
//! 3'-end quality trim.

use crate::correct::kmer_codec::{encode_base, Base};

/// Quality ASCII encoding. Phred+33 is the modern default; Phred+64 is
/// the legacy Illumina scale, selected with `-I`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityScale {
    Phred33,
    Phred64,
}

impl QualityScale {
    #[inline]
    pub fn offset(self) -> u8 {
        match self {
            QualityScale::Phred33 => 33,
            QualityScale::Phred64 => 64,
        }
    }

    /// The ASCII character written at a corrected position, signalling a
    /// machine-assigned base rather than an observed one.
    #[inline]
    pub fn min_quality_char(self) -> u8 {
        match self {
            QualityScale::Phred33 => b'#',
            QualityScale::Phred64 => b'B',
        }
    }
}

/// A single proposed substitution: observed base at `position` replaced
/// by `to_base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub position: usize,
    pub to_base: Base,
}

/// One parsed FASTQ record.
#[derive(Debug, Clone)]
pub struct Read {
    pub header: String,
    pub bases: Vec<Base>,
    /// Raw ASCII quality characters, one per base.
    pub quality: Vec<u8>,
    pub scale: QualityScale,
}

impl Read {
    pub fn parse(header: impl Into<String>, seq: &[u8], qual: &[u8], scale: QualityScale) -> Read {
        Read {
            header: header.into(),
            bases: seq.iter().map(|&b| encode_base(b)).collect(),
            quality: qual.to_vec(),
            scale,
        }
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Per-base accuracy probability, floored at 0.25 so that a
    /// correction can never look worse than leaving a base untouched.
    pub fn probabilities(&self) -> Vec<f64> {
        let offset = self.scale.offset();
        self.quality
            .iter()
            .map(|&q| {
                let phred = q.saturating_sub(offset) as f64;
                (1.0 - 10f64.powf(-phred / 10.0)).max(0.25)
            })
            .collect()
    }

    /// Apply a set of substitutions to the original sequence, producing a
    /// new base vector without mutating `self`.
    pub fn corrected_bases(&self, corrections: &[Correction]) -> Vec<Base> {
        let mut out = self.bases.clone();
        for c in corrections {
            out[c.position] = c.to_base;
        }
        out
    }

    /// BWA-style sliding 3' trim: find the longest suffix whose running
    /// sum of `trimq - q[i]` (accumulated from the read's end backward)
    /// stays positive, and return the length to keep (the position just
    /// before that suffix begins).
    ///
    /// Matches the classic BWA/Trimmomatic `bwa_trim` algorithm: walk the
    /// quality string from the end, tracking the highest cumulative area
    /// seen; the retained length is the position at which that maximum
    /// occurred. Returns `self.len()` (no trim) if the area never goes
    /// positive.
    pub fn bwa_trim_len(&self, trimq: u8) -> usize {
        let offset = self.scale.offset();
        let len = self.len();
        let mut area: i64 = 0;
        let mut max_area: i64 = 0;
        let mut keep = len;
        for i in (0..len).rev() {
            let q = self.quality[i].saturating_sub(offset) as i64;
            area += trimq as i64 - q;
            if area < 0 {
                break;
            }
            if area > max_area {
                max_area = area;
                keep = i;
            }
        }
        keep
    }
}
