//! FASTQ chunk byte-offset pre-scan, chunked parallel read/correct/write,
//! gzip staging, and paired-end output combination.
//!
//! Mirrors the teacher's `chromosomes.par_iter().map(...).collect::<Result<_>>()`
//! shape (`src/bin/reference.rs::run`), substituting FASTQ byte-offset
//! chunks for chromosome names as the unit of parallel work.

use crate::cli::counters::CorrectionCounters;
use crate::correct::driver::{self, RecordOutcome};
use crate::correct::read::{QualityScale, Read};
use crate::correct::trusted_set::TrustedSet;
use crate::correct::Config;
use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read as IoRead, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// One worker's share of a FASTQ file: the byte offset of its first
/// record and how many records to consume from there.
#[derive(Debug, Clone, Copy)]
pub struct ChunkSpec {
    pub start_offset: u64,
    pub record_count: u64,
}

/// Pre-scan `path` (one FASTQ record = four lines) and split it into up
/// to `n_chunks` contiguous, roughly equal chunks of whole records,
/// mirroring the original corrector's `pa_params`: the last chunk
/// absorbs the remainder when record count isn't evenly divisible.
pub fn prescan_chunks(path: &Path, n_chunks: usize) -> Result<Vec<ChunkSpec>> {
    let total_lines = count_lines(path)?;
    let total_records = total_lines / 4;
    if total_records == 0 {
        return Ok(vec![ChunkSpec {
            start_offset: 0,
            record_count: 0,
        }]);
    }

    let n_chunks = n_chunks.max(1).min(total_records as usize);
    let base = total_records / n_chunks as u64;
    let mut counts = vec![base; n_chunks];
    counts[n_chunks - 1] += total_records - base * n_chunks as u64;

    let file = File::open(path).with_context(|| format!("opening {path:?} for chunk pre-scan"))?;
    let mut reader = BufReader::new(file);
    let mut specs = Vec::with_capacity(n_chunks);
    specs.push(ChunkSpec {
        start_offset: 0,
        record_count: counts[0],
    });

    let mut offset: u64 = 0;
    let mut records_in_chunk: u64 = 0;
    let mut chunk_idx = 0usize;
    let mut line = String::new();
    'outer: loop {
        let mut record_bytes = 0u64;
        for _ in 0..4 {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break 'outer;
            }
            record_bytes += n as u64;
        }
        offset += record_bytes;
        records_in_chunk += 1;
        if records_in_chunk == counts[chunk_idx] && chunk_idx + 1 < n_chunks {
            specs.push(ChunkSpec {
                start_offset: offset,
                record_count: counts[chunk_idx + 1],
            });
            chunk_idx += 1;
            records_in_chunk = 0;
        }
    }
    Ok(specs)
}

fn count_lines(path: &Path) -> Result<u64> {
    let file = File::open(path).with_context(|| format!("opening {path:?}"))?;
    let mut reader = BufReader::new(file);
    let mut count = 0u64;
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        count += 1;
    }
    Ok(count)
}

/// One parsed FASTQ record's raw text fields (header/sequence/separator/
/// quality), prior to base/quality decoding.
struct FastqRecord {
    header: String,
    seq: Vec<u8>,
    mid: String,
    qual: Vec<u8>,
}

fn read_records_at(path: &Path, spec: &ChunkSpec) -> Result<Vec<FastqRecord>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(spec.start_offset))?;
    let mut reader = BufReader::new(file);
    let mut records = Vec::with_capacity(spec.record_count as usize);
    for _ in 0..spec.record_count {
        let mut header = String::new();
        let mut seq = String::new();
        let mut mid = String::new();
        let mut qual = String::new();
        reader.read_line(&mut header).context("reading FASTQ header line")?;
        reader.read_line(&mut seq).context("reading FASTQ sequence line")?;
        reader.read_line(&mut mid).context("reading FASTQ separator line")?;
        reader.read_line(&mut qual).context("reading FASTQ quality line")?;
        records.push(FastqRecord {
            header: header.trim_end().to_string(),
            seq: seq.trim_end().as_bytes().to_vec(),
            mid: mid.trim_end().to_string(),
            qual: qual.trim_end().as_bytes().to_vec(),
        });
    }
    Ok(records)
}

/// Render one corrected record into the output writer, following
/// `output_read`'s header-annotation and marker rules. `is_paired`
/// controls the asymmetric `--headers`/` error` interaction documented
/// in SPEC_FULL.md §12: a pair's failing mate always gets ` error`
/// regardless of `--headers`.
fn write_record(out: &mut impl Write, outcome: &RecordOutcome, original: &FastqRecord, processed: &Read, cfg: &Config, is_paired: bool) -> Result<()> {
    match outcome {
        RecordOutcome::Failed { .. } => {
            if !cfg.emit_uncorrected && !is_paired {
                return Ok(());
            }
            let mut header = original.header.clone();
            if !cfg.suppress_headers || is_paired {
                header.push_str(" error");
            }
            write_line(out, &header, &original.seq, &original.mid, &original.qual, cfg.contrail_output)
        }
        _ => {
            let mut header = original.header.clone();
            if !cfg.suppress_headers {
                if matches!(outcome, RecordOutcome::Corrected { .. }) {
                    header.push_str(" correct");
                }
                let trimmed = original.seq.len() - processed.len();
                if trimmed > 0 {
                    header.push_str(&format!(" trim={trimmed}"));
                }
            }
            let qual: Vec<u8> = processed.quality.clone();
            let seq: Vec<u8> = processed.bases.iter().map(|b| b.to_ascii()).collect();
            write_line(out, &header, &seq, &original.mid, &qual, cfg.contrail_output)
        }
    }
}

fn write_line(out: &mut impl Write, header: &str, seq: &[u8], mid: &str, qual: &[u8], contrail: bool) -> Result<()> {
    if contrail {
        writeln!(out, "{header}\t{}", String::from_utf8_lossy(seq))?;
    } else {
        writeln!(out, "{header}")?;
        out.write_all(seq)?;
        writeln!(out)?;
        writeln!(out, "{mid}")?;
        out.write_all(qual)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Process one chunk: parse its records, run them through the driver,
/// and write the results to a fresh temp file. Returns the temp file and
/// this chunk's counters.
fn process_chunk(path: &Path, spec: &ChunkSpec, trusted: &TrustedSet, cfg: &Config, staging: &tempfile::TempDir, is_paired: bool) -> Result<(tempfile::NamedTempFile, CorrectionCounters)> {
    let records = read_records_at(path, spec)?;
    let mut tmp = tempfile::NamedTempFile::new_in(staging.path()).context("creating chunk output temp file")?;
    let mut counters = CorrectionCounters::default();

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        for rec in &records {
            let read = Read::parse(rec.header.trim_start_matches('@'), &rec.seq, &rec.qual, cfg.quality_scale);
            let (outcome, processed) = driver::process_record(&read, trusted, cfg);
            counters.record(&outcome);
            write_record(&mut writer, &outcome, rec, &processed, cfg, is_paired)?;
        }
        writer.flush()?;
    }
    Ok((tmp, counters))
}

/// Correct every record in `path`, writing `<prefix>.cor.<suffix>`
/// alongside it, using up to `cfg.search.k`-aware chunk-parallel workers.
pub fn correct_file(path: &Path, trusted: &TrustedSet, cfg: &Config, n_threads: usize) -> Result<(PathBuf, CorrectionCounters)> {
    let staging = tempfile::tempdir().context("creating chunk staging directory")?;
    let specs = prescan_chunks(path, n_threads)?;

    let results: Vec<(tempfile::NamedTempFile, CorrectionCounters)> = specs
        .par_iter()
        .map(|spec| process_chunk(path, spec, trusted, cfg, &staging, false))
        .collect::<Result<_>>()?;

    let out_path = corrected_path(path);
    let mut out = BufWriter::new(File::create(&out_path).with_context(|| format!("creating {out_path:?}"))?);
    let mut total = CorrectionCounters::default();
    for (tmp, counters) in results {
        total += counters;
        let mut reader = BufReader::new(tmp.reopen().context("reopening chunk output")?);
        std::io::copy(&mut reader, &mut out).context("concatenating chunk output")?;
    }
    out.flush()?;
    Ok((out_path, total))
}

fn corrected_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    path.with_file_name(format!("{stem}.cor{ext}"))
}

/// Correct a paired-end FASTQ pair and combine their outputs per the
/// original corrector's `combine_output_paired`: join records positionally
/// by scanning each header for the literal substring `"error"` that
/// [`write_record`] appends to a failing mate. Both-succeed pairs land in
/// `<prefix>.cor.<suffix>` for both files; single survivors land in
/// `<prefix>.cor.single.<suffix>` for the surviving mate only.
pub fn correct_pair(path1: &Path, path2: &Path, trusted: &TrustedSet, cfg: &Config, n_threads: usize) -> Result<(PathBuf, PathBuf, CorrectionCounters)> {
    // Paired mode always annotates a failing mate's header with " error",
    // regardless of --headers, so pair survivorship can be recovered from
    // the combined streams below.
    let mut paired_cfg = cfg.clone();
    paired_cfg.emit_uncorrected = true;

    let (tmp1, c1) = correct_file_paired_mate(path1, trusted, &paired_cfg, n_threads)?;
    let (tmp2, c2) = correct_file_paired_mate(path2, trusted, &paired_cfg, n_threads)?;

    let out1 = combined_suffixed(path1, ".cor");
    let single1 = combined_suffixed(path1, ".cor.single");
    let out2 = combined_suffixed(path2, ".cor");
    let single2 = combined_suffixed(path2, ".cor.single");

    let mut pair_out1 = BufWriter::new(File::create(&out1)?);
    let mut pair_out2 = BufWriter::new(File::create(&out2)?);
    let mut single_out1 = BufWriter::new(File::create(&single1)?);
    let mut single_out2 = BufWriter::new(File::create(&single2)?);

    let mut reader1 = BufReader::new(File::open(&tmp1)?);
    let mut reader2 = BufReader::new(File::open(&tmp2)?);
    loop {
        let Some(rec1) = read_fastq_lines(&mut reader1)? else { break };
        let Some(rec2) = read_fastq_lines(&mut reader2)? else {
            bail!("uneven number of reads in paired end read files {path1:?} and {path2:?}");
        };
        let failed1 = rec1.0.contains("error");
        let failed2 = rec2.0.contains("error");
        match (failed1, failed2) {
            (false, false) => {
                write_fastq_lines(&mut pair_out1, &rec1)?;
                write_fastq_lines(&mut pair_out2, &rec2)?;
            }
            (false, true) => write_fastq_lines(&mut single_out1, &rec1)?,
            (true, false) => write_fastq_lines(&mut single_out2, &rec2)?,
            (true, true) => {}
        }
    }
    for w in [&mut pair_out1, &mut single_out1] {
        w.flush()?;
    }
    for w in [&mut pair_out2, &mut single_out2] {
        w.flush()?;
    }

    let mut total = CorrectionCounters::default();
    total += c1;
    total += c2;
    Ok((out1, out2, total))
}

/// Correct one mate into a combined scratch file. The returned
/// [`tempfile::TempPath`] deletes the file on drop — callers must keep it
/// alive for as long as they read from it (`correct_pair` holds it until
/// the combine pass finishes) rather than persist it with `.keep()`.
fn correct_file_paired_mate(path: &Path, trusted: &TrustedSet, cfg: &Config, n_threads: usize) -> Result<(tempfile::TempPath, CorrectionCounters)> {
    let staging = tempfile::tempdir().context("creating chunk staging directory")?;
    let specs = prescan_chunks(path, n_threads)?;
    let results: Vec<(tempfile::NamedTempFile, CorrectionCounters)> = specs
        .par_iter()
        .map(|spec| process_chunk(path, spec, trusted, cfg, &staging, true))
        .collect::<Result<_>>()?;

    let combined = tempfile::NamedTempFile::new().context("creating combined mate scratch file")?;
    let mut out = BufWriter::new(combined.reopen()?);
    let mut total = CorrectionCounters::default();
    for (tmp, counters) in results {
        total += counters;
        let mut reader = BufReader::new(tmp.reopen()?);
        std::io::copy(&mut reader, &mut out)?;
    }
    out.flush()?;
    Ok((combined.into_temp_path(), total))
}

fn combined_suffixed(path: &Path, tag: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    path.with_file_name(format!("{stem}{tag}{ext}"))
}

type FastqLines = (String, String, String, String);

fn read_fastq_lines(reader: &mut impl BufRead) -> Result<Option<FastqLines>> {
    let mut header = String::new();
    if reader.read_line(&mut header)? == 0 {
        return Ok(None);
    }
    let mut seq = String::new();
    let mut mid = String::new();
    let mut qual = String::new();
    reader.read_line(&mut seq)?;
    reader.read_line(&mut mid)?;
    reader.read_line(&mut qual)?;
    Ok(Some((
        header.trim_end().to_string(),
        seq.trim_end().to_string(),
        mid.trim_end().to_string(),
        qual.trim_end().to_string(),
    )))
}

fn write_fastq_lines(out: &mut impl Write, rec: &FastqLines) -> Result<()> {
    writeln!(out, "{}", rec.0)?;
    writeln!(out, "{}", rec.1)?;
    writeln!(out, "{}", rec.2)?;
    writeln!(out, "{}", rec.3)?;
    Ok(())
}

/// Decompress a `.gz` input into `stage_dir` before chunk-splitting,
/// replacing the original corrector's `zcat`/`gzip` shell-outs with a
/// real decoder (spec.md treats gzip staging as a thin external
/// collaborator, but we still give it a genuine implementation — see
/// SPEC_FULL.md §11.5).
pub fn stage_gzip_input(gz_path: &Path, stage_dir: &Path) -> Result<PathBuf> {
    use flate2::read::GzDecoder;
    std::fs::create_dir_all(stage_dir).context("creating gzip staging directory")?;
    let stem = gz_path.file_stem().context("gzip input has no file stem")?;
    let staged = stage_dir.join(stem);
    let input = File::open(gz_path).with_context(|| format!("opening {gz_path:?}"))?;
    let mut decoder = GzDecoder::new(input);
    let mut out = File::create(&staged).with_context(|| format!("creating {staged:?}"))?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf).context("decompressing gzip input")?;
    out.write_all(&buf)?;
    Ok(staged)
}

/// Recompress a corrected output file and move it into `stage_dir`,
/// mirroring the original's post-correction `gzip` step.
pub fn stage_gzip_output(corrected_path: &Path, stage_dir: &Path) -> Result<PathBuf> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    std::fs::create_dir_all(stage_dir).context("creating gzip staging directory")?;
    let file_name = corrected_path.file_name().context("corrected output has no file name")?;
    let dest = stage_dir.join(format!("{}.gz", file_name.to_string_lossy()));
    let input = File::open(corrected_path).with_context(|| format!("opening {corrected_path:?}"))?;
    let mut reader = BufReader::new(input);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let mut encoder = GzEncoder::new(File::create(&dest)?, Compression::default());
    encoder.write_all(&buf)?;
    encoder.finish()?;
    Ok(dest)
}

/// Build the `Config` that drives every record, validating the AT-cutoff
/// file's line count against `k + 1` (see SPEC_FULL.md §12, "AT-cutoff
/// file cardinality check") before anything else runs.
pub fn load_at_cutoffs(path: &Path, k: usize) -> Result<Vec<u64>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading AT-cutoff file {path:?}"))?;
    let cutoffs: Vec<u64> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.parse::<u64>().with_context(|| format!("parsing AT cutoff line {l:?}")))
        .collect::<Result<_>>()?;
    if cutoffs.len() != k + 1 {
        bail!("must specify {} AT cutoffs in {path:?}, found {}", k + 1, cutoffs.len());
    }
    Ok(cutoffs)
}

pub fn quality_scale_from_flag(illumina: bool) -> QualityScale {
    if illumina {
        QualityScale::Phred64
    } else {
        QualityScale::Phred33
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_fastq(path: &Path, records: &[(&str, &str, &str, &str)]) {
        let mut f = File::create(path).unwrap();
        for (h, s, m, q) in records {
            writeln!(f, "{h}\n{s}\n{m}\n{q}").unwrap();
        }
    }

    #[test]
    fn prescan_splits_into_requested_chunk_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fastq");
        let records: Vec<_> = (0..10).map(|i| (format!("@r{i}"), "ACGT".to_string(), "+".to_string(), "IIII".to_string())).collect();
        let refs: Vec<(&str, &str, &str, &str)> = records.iter().map(|(h, s, m, q)| (h.as_str(), s.as_str(), m.as_str(), q.as_str())).collect();
        write_fastq(&path, &refs);

        let specs = prescan_chunks(&path, 3).unwrap();
        assert_eq!(specs.len(), 3);
        let total: u64 = specs.iter().map(|s| s.record_count).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn prescan_first_chunk_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fastq");
        write_fastq(&path, &[("@r0", "ACGT", "+", "IIII"), ("@r1", "ACGT", "+", "IIII")]);
        let specs = prescan_chunks(&path, 1).unwrap();
        assert_eq!(specs[0].start_offset, 0);
        assert_eq!(specs[0].record_count, 2);
    }

    #[test]
    fn at_cutoffs_wrong_cardinality_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutoffs.txt");
        std::fs::write(&path, "1\n2\n3\n").unwrap();
        let result = load_at_cutoffs(&path, 4); // needs k+1 = 5 lines
        assert!(result.is_err());
    }

    #[test]
    fn at_cutoffs_correct_cardinality_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutoffs.txt");
        std::fs::write(&path, "1\n2\n3\n4\n5\n").unwrap();
        let cutoffs = load_at_cutoffs(&path, 4).unwrap();
        assert_eq!(cutoffs, vec![1, 2, 3, 4, 5]);
    }
}
