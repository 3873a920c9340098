
use anyhow::Result;
use isocollapse::chain::{chain_samples, read_chained_ids, CHAINED_COUNT, CHAINED_GFF, CHAINED_IDS};
use isocollapse::chain_config::ChainConfig;
use isocollapse::exon_chain::MergePolicy;
use isocollapse::group::read_groups;
use isocollapse::mega_info::MegaInfoTable;
use isocollapse::Error;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use test_utils::gff_transcript;

const X: &[(u64, u64)] = &[(100, 200), (300, 400)];
const X_SHIFTED: &[(u64, u64)] = &[(90, 202), (298, 420)];
const Y: &[(u64, u64)] = &[(5000, 5100), (5300, 5400)];
const Z: &[(u64, u64)] = &[(700, 800), (900, 1000)];

fn abundance(rows: &[(&str, f64)]) -> String {
    let mut text = String::from("# comment\npbid\tcount_fl\tnorm_nfl\n");
    for (pbid, value) in rows {
        text.push_str(&format!("{pbid}\t1\t{value}\n"));
    }
    text
}

fn write_sample(root: &Path, name: &str, gff: &str, groups: &str, abundance: &str) -> Result<()> {
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("c.gff"), gff)?;
    fs::write(dir.join("c.group.txt"), groups)?;
    fs::write(dir.join("c.abundance.txt"), abundance)?;
    Ok(())
}

/// A has X and Y; B has X; C has X and a new Z on chr2. Y has no
/// counterpart after A.
fn write_three_samples(root: &Path) -> Result<ChainConfig> {
    write_sample(
        root,
        "A",
        &format!("{}{}", gff_transcript("chr1", "PB.1.1", '+', X), gff_transcript("chr1", "PB.2.1", '+', Y)),
        "PB.1.1\ta1,a2\nPB.2.1\ta3\n",
        &abundance(&[("PB.1.1", 0.6), ("PB.2.1", 0.4)]),
    )?;
    write_sample(
        root,
        "B",
        &gff_transcript("chr1", "PB.1.1", '+', X_SHIFTED),
        "PB.1.1\tb1\n",
        &abundance(&[("PB.1.1", 1.0)]),
    )?;
    write_sample(
        root,
        "C",
        &format!("{}{}", gff_transcript("chr1", "PB.1.1", '+', X), gff_transcript("chr2", "PB.2.1", '+', Z)),
        "PB.1.1\tc1\nPB.2.1\tc2\n",
        &abundance(&[("PB.1.1", 0.25), ("PB.2.1", 0.75)]),
    )?;

    let config = root.join("samples.config");
    fs::write(
        &config,
        format!(
            "SAMPLE=A;{0}/A\nSAMPLE=B;{0}/B\nSAMPLE=C;{0}/C\nGROUP_FILENAME=c.group.txt\nGFF_FILENAME=c.gff\nCOUNT_FILENAME=c.abundance.txt\n",
            root.display()
        ),
    )?;
    Ok(ChainConfig::read(&config)?)
}

#[test]
fn test_three_sample_chain_propagates_na() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_three_samples(dir.path())?;
    let out = dir.path().join("out");
    fs::create_dir_all(&out)?;

    let summary = chain_samples(&config, "norm_nfl", MergePolicy::exact().with_tolerance(5), &out)?;
    assert_eq!(summary.samples, 3);
    assert_eq!(summary.chained_ids, 3);

    let ids = fs::read_to_string(out.join(CHAINED_IDS))?;
    assert_eq!(
        ids,
        "superPBID\tA\tB\tC\n\
         PB.1.1\tPB.1.1\tPB.1.1\tPB.1.1\n\
         PB.2.1\tPB.2.1\tNA\tNA\n\
         PB.3.1\tNA\tNA\tPB.2.1\n"
    );

    let counts = fs::read_to_string(out.join(CHAINED_COUNT))?;
    assert_eq!(
        counts,
        "superPBID\tA\tB\tC\n\
         PB.1.1\t6.0000e-01\t1.0000e+00\t2.5000e-01\n\
         PB.2.1\t4.0000e-01\tNA\tNA\n\
         PB.3.1\tNA\tNA\t7.5000e-01\n"
    );

    // resolved ids never invent an id the sample did not have
    let (samples, rows) = read_chained_ids(out.join(CHAINED_IDS))?;
    for (s, sample) in samples.iter().enumerate() {
        let groups = read_groups(dir.path().join(sample).join("c.group.txt"))?;
        for row in &rows {
            if let Some(id) = &row.ids[s] {
                assert!(groups.contains_key(id), "{id} is not a {sample} id");
            }
        }
    }

    let groups = read_groups(out.join("tmp_C.group.txt"))?;
    assert_eq!(groups["PB.1.1"], vec!["A|a1", "A|a2", "B|b1", "C|c1"]);
    assert_eq!(groups["PB.2.1"], vec!["A|a3"]);
    assert_eq!(groups["PB.3.1"], vec!["C|c2"]);

    let info = MegaInfoTable::read(out.join("tmp_C.mega_info.txt"))?;
    assert_eq!(info.prev_prefix, "tmp_B");
    assert_eq!(info.sample, "C");

    assert_eq!(
        fs::read_to_string(out.join(CHAINED_GFF))?,
        fs::read_to_string(out.join("tmp_C.gff"))?
    );
    Ok(())
}

#[test]
fn test_zero_tolerance_keeps_shifted_isoform_apart() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_three_samples(dir.path())?;
    let out = dir.path().join("out");
    fs::create_dir_all(&out)?;

    chain_samples(&config, "norm_nfl", MergePolicy::exact(), &out)?;
    let (_, rows) = read_chained_ids(out.join(CHAINED_IDS))?;
    let b_rows: Vec<_> = rows.iter().filter(|r| r.ids[1].is_some()).collect();
    assert_eq!(b_rows.len(), 1);
    assert_eq!(b_rows[0].ids[0], None);
    Ok(())
}

#[test]
fn test_missing_metric_column_is_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_three_samples(dir.path())?;
    let err = chain_samples(&config, "norm_nfl_amb", MergePolicy::exact(), dir.path()).unwrap_err();
    assert!(matches!(err, Error::DataConsistency(_)));
    Ok(())
}

#[test]
fn test_missing_abundance_row_is_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_three_samples(dir.path())?;
    fs::write(dir.path().join("C").join("c.abundance.txt"), abundance(&[("PB.1.1", 0.25)]))?;
    let err = chain_samples(&config, "norm_nfl", MergePolicy::exact().with_tolerance(5), dir.path()).unwrap_err();
    assert!(matches!(err, Error::DataConsistency(_)));
    Ok(())
}
