//! Choose one member sequence per collapsed cluster.
use crate::error::{Error, Result};
use crate::gff::read_collapsed_gff;
use crate::group::read_groups;
use crate::io_utils::AtomicOutput;
use crate::sequences::{write_sequence, SequenceFormat, SequenceRecord, SequenceTable};
use log::{info, warn};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PickPolicy {
    /// Longest member sequence
    Longest,
    /// Fewest expected errors from base qualities
    LeastError,
}

/// Pick the representative of `members`. Ties go to the earliest member.
///
/// `LeastError` falls back to `Longest` when a member has no qualities.
pub fn pick_representative<'a>(
    cluster_id: &str,
    members: &[String],
    sequences: &'a SequenceTable,
    policy: PickPolicy,
    sequence_path: &Path,
) -> Result<&'a SequenceRecord> {
    let records = members
        .iter()
        .map(|m| {
            sequences.get(m).ok_or_else(|| Error::MissingId {
                id: m.clone(),
                context: format!("group of {cluster_id}"),
                path: sequence_path.to_path_buf(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let least_error = policy == PickPolicy::LeastError && records.iter().all(|r| r.quality.is_some());

    let best = if least_error {
        records
            .iter()
            .enumerate()
            .min_by_key(|(pos, r)| (OrderedFloat(r.expected_errors().unwrap_or(f64::INFINITY)), *pos))
    } else {
        records
            .iter()
            .enumerate()
            .min_by_key(|(pos, r)| (Reverse(r.len()), *pos))
    };

    best.map(|(_, r)| *r).ok_or_else(|| Error::Data {
        path: sequence_path.to_path_buf(),
        message: format!("cluster {cluster_id} has no members"),
    })
}

/// Write `<pbid>|<member>` representatives for every record of `gff_path`.
///
/// Returns the number of sequences written.
pub fn write_representatives(
    sequences: &SequenceTable,
    sequence_path: &Path,
    gff_path: &Path,
    group_path: &Path,
    output_path: &Path,
    policy: PickPolicy,
) -> Result<usize> {
    let records = read_collapsed_gff(gff_path)?;
    let groups = read_groups(group_path)?;
    let has_qualities = sequences.values().all(|r| r.quality.is_some());
    let format = if has_qualities {
        SequenceFormat::from_path(output_path).unwrap_or(SequenceFormat::Fastq)
    } else {
        SequenceFormat::Fasta
    };
    if policy == PickPolicy::LeastError && !has_qualities {
        warn!("No base qualities in {}; picking longest members", sequence_path.display());
    }

    let mut out = AtomicOutput::create(output_path)?;
    for record in &records {
        let members = groups.get(&record.id).ok_or_else(|| Error::MissingId {
            id: record.id.clone(),
            context: gff_path.display().to_string(),
            path: group_path.to_path_buf(),
        })?;
        let rep = pick_representative(&record.id, members, sequences, policy, sequence_path)?;
        let name = format!("{}|{}", record.id, rep.id);
        write_sequence(&mut out, &name, rep, format).map_err(|e| Error::io(e, output_path))?;
    }
    out.commit()?;

    info!(
        "Wrote {} representative sequences to {}",
        records.len(),
        output_path.display()
    );
    Ok(records.len())
}
