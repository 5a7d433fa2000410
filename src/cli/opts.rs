use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Correct sequencing errors in FASTQ reads against a trusted k-mer set.
#[derive(Parser, Debug)]
#[command(
    name = "kcorrect",
    about = "Correct sequencing errors in a FASTQ file using a trusted k-mer set",
    version
)]
#[clap(group = ArgGroup::new("input").required(true).args(&["reads", "file_list"]))]
#[clap(group = ArgGroup::new("trusted_source").required(true).args(&["counts_file", "binary_set"]))]
#[clap(group = ArgGroup::new("cutoff_mode").args(&["cutoff", "at_cutoffs"]))]
pub struct Cli {
    /// FASTQ input file(s): one for single-end, two for paired-end [path]
    #[clap(short = 'r', long = "reads", num_args = 1..=2, value_parser, group = "input", help_heading = "Input")]
    pub reads: Option<Vec<PathBuf>>,

    /// File listing FASTQ filenames: one per line (single-end) or two per
    /// line, space-separated (paired-end) [path]
    #[clap(short = 'f', long = "file-list", value_parser, group = "input", help_heading = "Input")]
    pub file_list: Option<PathBuf>,

    /// K-mer length used by the trusted set [integer]
    #[clap(short = 'k', long, default_value = "20", help_heading = "Core")]
    pub k: usize,

    /// File of `<kmer>\t<count>` lines from the calibration corpus; use
    /// `-` to read from stdin [path]
    #[clap(short = 'm', long = "counts-file", value_parser, group = "trusted_source", help_heading = "Trusted set")]
    pub counts_file: Option<String>,

    /// Previously saved binary trusted-set dump [path]
    #[clap(short = 'b', long = "binary-set", value_parser, group = "trusted_source", help_heading = "Trusted set")]
    pub binary_set: Option<PathBuf>,

    /// Global trust cutoff: minimum observed count for a k-mer to be
    /// trusted [integer]
    #[clap(short = 'c', long, group = "cutoff_mode", help_heading = "Trusted set")]
    pub cutoff: Option<u64>,

    /// File of k+1 AT-content-dependent cutoffs, one per line [path]
    #[clap(short = 'a', long = "at-cutoffs", value_parser, group = "cutoff_mode", help_heading = "Trusted set")]
    pub at_cutoffs: Option<PathBuf>,

    /// Number of worker threads [integer]
    #[clap(short = 'p', long = "threads", default_value = "1", help_heading = "Core")]
    pub threads: usize,

    /// BWA trim parameter [integer]
    #[clap(short = 'q', long = "trim-quality", default_value = "3", help_heading = "Trimming")]
    pub trim_quality: u8,

    /// Minimum trimmed length to accept a trim-only fix [integer]
    #[clap(short = 't', long = "trim-min-len", default_value = "30", help_heading = "Trimming")]
    pub trim_min_len: usize,

    /// Input qualities use the legacy Illumina Phred+64 scale (default:
    /// Phred+33) [flag]
    #[clap(short = 'I', long = "illumina-qual", help_heading = "Quality")]
    pub illumina_qual: bool,

    /// Emit reads that fail correction, annotated ` error`, instead of
    /// dropping them [flag]
    #[clap(short = 'u', long = "uncorrected-out", help_heading = "Output")]
    pub uncorrected_out: bool,

    /// Emit Contrail TSV (`header\tsequence`) instead of FASTQ [flag]
    #[clap(short = 'C', long = "contrail-out", help_heading = "Output")]
    pub contrail_out: bool,

    /// Directory to stage gzip decompression/recompression of `.gz`
    /// inputs [path]
    #[clap(short = 'z', long = "gzip-stage-dir", value_parser, help_heading = "Output")]
    pub gzip_stage_dir: Option<PathBuf>,

    /// Emit original headers, suppressing ` correct`/` trim=<n>`/` error`
    /// annotations [flag]
    #[clap(long = "headers", help_heading = "Output")]
    pub headers: bool,
}

impl Cli {
    /// Resolve the final list of input file groups: each inner `Vec`
    /// holds one file (single-end) or two files (paired-end), in
    /// priority order from `-f` (one or two paths per line) or `-r`.
    pub fn resolve_input_groups(&self) -> anyhow::Result<Vec<Vec<PathBuf>>> {
        use anyhow::Context;
        if let Some(list) = &self.file_list {
            let text = std::fs::read_to_string(list).context("reading file list (-f)")?;
            Ok(text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| l.split_whitespace().map(PathBuf::from).collect())
                .collect())
        } else {
            Ok(vec![self.reads.clone().expect("clap enforces -r or -f")])
        }
    }
}
