//! Collapse stage driver: validation, output naming and the
//! branch -> fuzzy -> representative pipeline.
use crate::collapse::{Branch, BranchSummary, CollapseConfig};
use crate::error::{Error, Result};
use crate::fuzzy::collapse_fuzzy_junctions;
use crate::gff::GffWriter;
use crate::group::GroupWriter;
use crate::io_utils::{copy_file, require_exists, AtomicOutput};
use crate::locus::LocusGrouper;
use crate::representative::{write_representatives, PickPolicy};
use crate::sam::open_sam;
use crate::sequences::{query_lengths, read_sequences};
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Names of every file the collapse stage writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedFiles {
    /// `<dir>/<stem>.{5merge|no5merge}`
    base: String,
    prefix: String,
}

impl CollapsedFiles {
    /// `<dir>/<stem>.{5merge|no5merge}.collapsed` where `stem` is the
    /// basename of `output` up to its first `.`; the ignored list drops the
    /// `.collapsed` part
    pub fn new<P: AsRef<Path>>(output: P, allow_extra_5exon: bool) -> Self {
        let output = output.as_ref();
        let basename = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = basename.split('.').next().unwrap_or_default();
        let stem = if stem.is_empty() { "out" } else { stem };
        let merge = if allow_extra_5exon { "5merge" } else { "no5merge" };
        let name = format!("{stem}.{merge}");
        let base = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(name).to_string_lossy().into_owned(),
            _ => name,
        };
        CollapsedFiles {
            prefix: format!("{base}.collapsed"),
            base,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.prefix, suffix))
    }

    pub fn good_gff(&self) -> PathBuf {
        self.with_suffix(".good.gff")
    }
    pub fn bad_gff(&self) -> PathBuf {
        self.with_suffix(".bad.gff")
    }
    pub fn group(&self) -> PathBuf {
        self.with_suffix(".group.txt")
    }
    pub fn ignored_ids(&self) -> PathBuf {
        PathBuf::from(format!("{}.ignored_ids.txt", self.base))
    }
    pub fn good_unfuzzy_gff(&self) -> PathBuf {
        self.with_suffix(".good.gff.unfuzzy")
    }
    pub fn bad_unfuzzy_gff(&self) -> PathBuf {
        self.with_suffix(".bad.gff.unfuzzy")
    }
    pub fn unfuzzy_group(&self) -> PathBuf {
        self.with_suffix(".group.txt.unfuzzy")
    }
    pub fn good_fuzzy_gff(&self) -> PathBuf {
        self.with_suffix(".good.gff.fuzzy")
    }
    pub fn bad_fuzzy_gff(&self) -> PathBuf {
        self.with_suffix(".bad.gff.fuzzy")
    }
    pub fn fuzzy_group(&self) -> PathBuf {
        self.with_suffix(".group.txt.fuzzy")
    }
}

/// Counts reported after a collapse run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseSummary {
    pub branch: BranchSummary,
    pub ignored: usize,
    pub final_good: usize,
    pub representatives: usize,
}

/// Runs the collapse stage for one sample
pub struct CollapseRunner {
    isoforms: PathBuf,
    sam: PathBuf,
    output: PathBuf,
    config: CollapseConfig,
    pick_policy: Option<PickPolicy>,
}

impl CollapseRunner {
    pub fn new(
        isoforms: impl Into<PathBuf>,
        sam: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        config: CollapseConfig,
    ) -> Self {
        CollapseRunner {
            isoforms: isoforms.into(),
            sam: sam.into(),
            output: output.into(),
            config,
            pick_policy: None,
        }
    }

    /// Override the representative policy chosen from `allow_extra_5exon`
    pub fn with_pick_policy(mut self, policy: Option<PickPolicy>) -> Self {
        self.pick_policy = policy;
        self
    }

    pub fn files(&self) -> CollapsedFiles {
        CollapsedFiles::new(&self.output, self.config.allow_extra_5exon)
    }

    pub fn pick_policy(&self) -> PickPolicy {
        self.pick_policy.unwrap_or(if self.config.allow_extra_5exon {
            PickPolicy::Longest
        } else {
            PickPolicy::LeastError
        })
    }

    pub fn validate_inputs(&self) -> Result<()> {
        require_exists(&self.isoforms)?;
        require_exists(&self.sam)?;
        if !(0.0..=1.0).contains(&self.config.min_aln_coverage)
            || !(0.0..=1.0).contains(&self.config.min_aln_identity)
        {
            return Err(Error::Config(format!(
                "coverage and identity thresholds must be within [0, 1] ({})",
                self.config.arg_str()
            )));
        }
        Ok(())
    }

    pub fn run(&self) -> Result<CollapseSummary> {
        self.validate_inputs()?;
        info!("Collapse arguments: {}", self.config.arg_str());
        let files = self.files();

        let sequences = read_sequences(&self.isoforms)?;
        let reader = open_sam(&self.sam)?.with_query_lengths(query_lengths(&sequences));
        let mut grouper = LocusGrouper::new(reader, &self.sam, self.config.thresholds());

        let mut good = GffWriter::new(AtomicOutput::create(files.good_unfuzzy_gff())?);
        let mut bad = GffWriter::new(AtomicOutput::create(files.bad_unfuzzy_gff())?);
        let mut groups = GroupWriter::new(AtomicOutput::create(files.unfuzzy_group())?);
        let branch = Branch::new(&self.config).run(&mut grouper, &mut good, &mut bad, &mut groups)?;

        let ignored = grouper.into_ignored();
        let mut ignored_out = AtomicOutput::create(files.ignored_ids())?;
        for rec in &ignored {
            writeln!(ignored_out, "{}\t{}", rec.query_id, rec.reason)
                .map_err(|e| Error::io(e, files.ignored_ids()))?;
        }

        good.into_inner().commit()?;
        bad.into_inner().commit()?;
        groups.into_inner().commit()?;
        ignored_out.commit()?;
        info!("Ignored {} records, listed in {}", ignored.len(), files.ignored_ids().display());

        let final_good = if self.config.max_fuzzy_junction > 0 {
            let fuzzy = collapse_fuzzy_junctions(
                files.good_unfuzzy_gff(),
                files.unfuzzy_group(),
                files.good_fuzzy_gff(),
                files.fuzzy_group(),
                &self.config.fuzzy_policy(),
            )?;
            copy_file(files.bad_unfuzzy_gff(), files.bad_fuzzy_gff())?;
            copy_file(files.good_fuzzy_gff(), files.good_gff())?;
            copy_file(files.bad_fuzzy_gff(), files.bad_gff())?;
            copy_file(files.fuzzy_group(), files.group())?;
            fuzzy.output_records
        } else {
            copy_file(files.good_unfuzzy_gff(), files.good_gff())?;
            copy_file(files.bad_unfuzzy_gff(), files.bad_gff())?;
            copy_file(files.unfuzzy_group(), files.group())?;
            branch.good
        };

        let representatives = write_representatives(
            &sequences,
            &self.isoforms,
            &files.good_gff(),
            &files.group(),
            &self.output,
            self.pick_policy(),
        )?;

        info!("Collapsed isoforms written to {}", files.good_gff().display());
        info!("Groups written to {}", files.group().display());
        Ok(CollapseSummary {
            branch,
            ignored: ignored.len(),
            final_good,
            representatives,
        })
    }
}
