use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use kcorrect::cli::io;
use kcorrect::cli::opts::Cli;
use kcorrect::correct::trusted_set::{AtGc, Cutoff, TrustedSet};
use kcorrect::correct::Config;
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

fn main() {
    if let Err(e) = run() {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    env_logger::init();
    let start_time = Instant::now();
    let opt = Cli::parse();

    rayon::ThreadPoolBuilder::new()
        .num_threads(opt.threads)
        .build_global()
        .context("building Rayon thread pool")?;

    println!("Start: Loading trusted k-mer set");
    let (trusted, atgc) = load_trusted_set(&opt)?;
    log::info!(
        "loaded {} trusted k-mers (A/T={}, G/C={})",
        trusted.count(),
        atgc.at,
        atgc.gc
    );

    let cfg = build_config(&opt)?;
    let groups = opt.resolve_input_groups()?;

    let pb = ProgressBar::new(groups.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("       {bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap(),
    );

    println!("Start: Correcting reads");
    let mut total = kcorrect::cli::counters::CorrectionCounters::default();
    for group in &groups {
        let (staged, cleanup) = stage_if_gzipped(group, &opt)?;
        match staged.as_slice() {
            [single] => {
                let (out_path, counters) = io::correct_file(single, &trusted, &cfg, opt.threads)?;
                let out_path = recompress_if_staged(&out_path, &opt)?;
                log::info!("wrote {:?}", out_path);
                total += counters;
            }
            [mate1, mate2] => {
                let (out1, out2, counters) = io::correct_pair(mate1, mate2, &trusted, &cfg, opt.threads)?;
                let out1 = recompress_if_staged(&out1, &opt)?;
                let out2 = recompress_if_staged(&out2, &opt)?;
                log::info!("wrote {:?} and {:?}", out1, out2);
                total += counters;
            }
            other => anyhow::bail!("expected one or two files per input group, got {}", other.len()),
        }
        drop(cleanup);
        pb.inc(1);
    }
    pb.finish_with_message("| Finished correcting");

    println!(
        "Done: {} reads ({} already trusted, {} trimmed, {} corrected, {} ambiguous, {} low coverage, {} queue aborted, {} quit early)",
        total.total,
        total.already_trusted,
        total.trimmed,
        total.corrected,
        total.ambiguous,
        total.low_coverage,
        total.queue_aborted,
        total.quit_early,
    );
    println!("Elapsed time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn load_trusted_set(opt: &Cli) -> Result<(TrustedSet, AtGc)> {
    let mut atgc = AtGc::default();
    if let Some(binary_path) = &opt.binary_set {
        let file = File::open(binary_path).with_context(|| format!("opening {binary_path:?}"))?;
        let set = TrustedSet::load_binary(file, &mut atgc)?;
        return Ok((set, atgc));
    }

    let counts_path = opt.counts_file.as_ref().expect("clap enforces -m or -b");
    let mut set = TrustedSet::empty(opt.k)?;
    let cutoff = resolve_cutoff(opt)?;

    if counts_path.as_str() == "-" {
        let stdin = std::io::stdin();
        set.load_counts(stdin.lock(), &cutoff, &mut atgc)?;
    } else {
        let file = File::open(counts_path).with_context(|| format!("opening {counts_path:?}"))?;
        set.load_counts(BufReader::new(file), &cutoff, &mut atgc)?;
    }
    Ok((set, atgc))
}

fn resolve_cutoff(opt: &Cli) -> Result<Cutoff> {
    if let Some(at_cutoffs_path) = &opt.at_cutoffs {
        let cutoffs = io::load_at_cutoffs(at_cutoffs_path, opt.k)?;
        Ok(Cutoff::ByAtContent(cutoffs))
    } else if let Some(c) = opt.cutoff {
        Ok(Cutoff::Global(c))
    } else {
        anyhow::bail!("one of -c/--cutoff or -a/--at-cutoffs is required to build a trusted set from counts")
    }
}

fn build_config(opt: &Cli) -> Result<Config> {
    let scale = io::quality_scale_from_flag(opt.illumina_qual);
    let mut cfg = Config::new(opt.k, scale);
    cfg.trimq = opt.trim_quality;
    cfg.trim_min_len = opt.trim_min_len;
    cfg.emit_uncorrected = opt.uncorrected_out;
    cfg.suppress_headers = opt.headers;
    cfg.contrail_output = opt.contrail_out;
    Ok(cfg)
}

/// If `-z` staging is requested and an input is gzip-compressed, decompress
/// it into the staging directory first. Returns the paths to actually read
/// plus a guard whose drop re-compresses nothing (recompression of outputs
/// happens after correction, via [`recompress_if_staged`]).
fn stage_if_gzipped(group: &[std::path::PathBuf], opt: &Cli) -> Result<(Vec<std::path::PathBuf>, Option<()>)> {
    let Some(stage_dir) = &opt.gzip_stage_dir else {
        return Ok((group.to_vec(), None));
    };
    let mut staged = Vec::with_capacity(group.len());
    for path in group {
        if path.extension().is_some_and(|e| e == "gz") {
            staged.push(io::stage_gzip_input(path, stage_dir)?);
        } else {
            staged.push(path.clone());
        }
    }
    Ok((staged, Some(())))
}

/// If `-z` staging is requested, gzip-compress a corrected output into the
/// staging directory and delete the uncompressed copy, returning the
/// `.gz` path. Otherwise returns `out_path` unchanged.
fn recompress_if_staged(out_path: &std::path::Path, opt: &Cli) -> Result<std::path::PathBuf> {
    let Some(stage_dir) = &opt.gzip_stage_dir else {
        return Ok(out_path.to_path_buf());
    };
    let staged = io::stage_gzip_output(out_path, stage_dir)?;
    std::fs::remove_file(out_path).with_context(|| format!("removing uncompressed {out_path:?} after staging"))?;
    Ok(staged)
}
