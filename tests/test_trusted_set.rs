use kcorrect::correct::kmer_codec::{encode_base, Base};
use kcorrect::correct::trusted_set::{AtGc, Cutoff, TrustedSet};
use std::io::Write;

fn bases(s: &str) -> Vec<Base> {
    s.bytes().map(encode_base).collect()
}

#[test]
fn load_counts_from_a_real_file_respects_cutoff() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "AAAA\t12")?;
    writeln!(file, "CCCC\t1")?;
    file.flush()?;

    let mut ts = TrustedSet::empty(4)?;
    let mut atgc = AtGc::default();
    let reader = std::io::BufReader::new(file.reopen()?);
    ts.load_counts(reader, &Cutoff::Global(10), &mut atgc)?;

    assert!(ts.check(&bases("AAAA")));
    assert!(!ts.check(&bases("CCCC")));
    Ok(())
}

#[test]
fn reverse_complement_closure_holds_for_every_admitted_kmer() -> anyhow::Result<()> {
    let mut ts = TrustedSet::empty(4)?;
    let mut atgc = AtGc::default();
    let text = "ACGT\t5\nAAAC\t5\nGGTT\t5\n";
    ts.load_counts(std::io::Cursor::new(text), &Cutoff::Global(1), &mut atgc)?;

    for seq in ["ACGT", "AAAC", "GGTT"] {
        let fwd = bases(seq);
        let rc: Vec<Base> = fwd
            .iter()
            .rev()
            .map(|b| match b {
                Base::A => Base::T,
                Base::T => Base::A,
                Base::C => Base::G,
                Base::G => Base::C,
                Base::N => unreachable!(),
            })
            .collect();
        assert_eq!(ts.check(&fwd), ts.check(&rc), "closure broken for {seq}");
    }
}

#[test]
fn incremental_scan_equals_per_window_naive_check_over_long_sequence() -> anyhow::Result<()> {
    let mut ts = TrustedSet::empty(5)?;
    let mut atgc = AtGc::default();
    let clean = "AACGT\t100\nACGTT\t100\nCGTTA\t100\nAAAAA\t100\n";
    ts.load_counts(std::io::Cursor::new(clean), &Cutoff::Global(1), &mut atgc)?;

    let seq = bases("AACGTTACGTTAAAAA");
    let k = 5;
    let naive: Vec<usize> = (0..=seq.len() - k).filter(|&i| !ts.check(&seq[i..i + k])).collect();
    let incremental = ts.scan_untrusted(&seq);
    assert_eq!(naive, incremental);
    Ok(())
}

#[test]
fn binary_dump_round_trips_through_a_real_file() -> anyhow::Result<()> {
    let mut ts = TrustedSet::empty(4)?;
    let mut atgc = AtGc::default();
    ts.load_counts(std::io::Cursor::new("ACGT\t5\nTTTT\t5\n"), &Cutoff::Global(1), &mut atgc)?;

    let mut file = tempfile::NamedTempFile::new()?;
    ts.write_binary(file.as_file_mut(), &atgc)?;
    file.flush()?;

    let mut restored_atgc = AtGc::default();
    let restored = TrustedSet::load_binary(file.reopen()?, &mut restored_atgc)?;
    assert_eq!(restored.count(), ts.count());
    assert_eq!(restored_atgc.at, atgc.at);
    assert_eq!(restored_atgc.gc, atgc.gc);
    Ok(())
}
