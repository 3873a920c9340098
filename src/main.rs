use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use isocollapse::abundance::DEFAULT_METRIC;
use isocollapse::chain::chain_samples;
use isocollapse::chain_config::ChainConfig;
use isocollapse::collapse::CollapseConfig;
use isocollapse::counting::CountRunner;
use isocollapse::exon_chain::MergePolicy;
use isocollapse::representative::PickPolicy;
use isocollapse::runner::CollapseRunner;

/// isocollapse - collapse redundant isoform alignments and chain samples
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Only print warnings and errors (RUST_LOG overrides)
    #[clap(long = "quiet", global = true)]
    quiet: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collapse isoforms mapped to a genome into unique transcripts
    Collapse {
        /// Isoform sequences (FASTA or FASTQ)
        #[clap(short = 'i', long = "input")]
        input: PathBuf,

        /// Alignments of the isoforms, sorted by reference and start
        #[clap(short = 's', long = "sam")]
        sam: PathBuf,

        /// Representative sequence output; its stem names the other outputs
        #[clap(short = 'o', long = "output")]
        output: PathBuf,

        /// Minimum alignment coverage
        #[clap(short = 'c', long = "min-coverage", default_value = "0.99")]
        min_coverage: f64,

        /// Minimum alignment identity
        #[clap(long = "min-identity", default_value = "0.95")]
        min_identity: f64,

        /// Minimum number of raw isoforms for a good cluster
        #[clap(long = "min-support", default_value = "1")]
        min_support: usize,

        /// Maximum junction difference for fuzzy merging (0 disables it)
        #[clap(long = "max-fuzzy-junction", default_value = "5")]
        max_fuzzy_junction: u64,

        /// Merge isoforms that only differ by missing 5' exons
        #[clap(long = "merge-5-shorter")]
        allow_extra_5exon: bool,

        /// Representative choice (default: longest with 5' merging, least-error otherwise)
        #[clap(long = "pick", value_enum)]
        pick: Option<PickPolicy>,
    },

    /// Chain collapsed samples into one catalog
    Chain {
        /// Sample configuration file
        config: PathBuf,

        /// Abundance column to chain
        #[clap(long = "field", default_value = DEFAULT_METRIC)]
        field: String,

        /// Maximum junction difference when matching across samples
        #[clap(long = "max-fuzzy-junction", default_value = "5")]
        max_fuzzy_junction: u64,

        /// Merge isoforms that only differ by missing 5' exons
        #[clap(long = "merge-5-shorter")]
        allow_extra_5exon: bool,

        /// Output directory
        #[clap(short = 'o', long = "out-dir", default_value = ".")]
        out_dir: PathBuf,
    },

    /// Count reads supporting each collapsed isoform
    Count {
        /// Collapsed group file
        #[clap(short = 'g', long = "group")]
        group: PathBuf,

        /// JSON read-to-cluster assignments
        #[clap(short = 'a', long = "assignments")]
        assignments: PathBuf,

        /// Output prefix for .read_stat.txt and .abundance.txt
        #[clap(short = 'o', long = "output-prefix")]
        output_prefix: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match args.command {
        Command::Collapse {
            input,
            sam,
            output,
            min_coverage,
            min_identity,
            min_support,
            max_fuzzy_junction,
            allow_extra_5exon,
            pick,
        } => {
            let config = CollapseConfig {
                min_aln_coverage: min_coverage,
                min_aln_identity: min_identity,
                min_support,
                max_fuzzy_junction,
                allow_extra_5exon,
            };
            let runner = CollapseRunner::new(input, sam, output, config).with_pick_policy(pick);
            let summary = runner.run().context("collapse failed")?;
            info!(
                "Done: {} good isoforms, {} bad, {} ignored",
                summary.final_good, summary.branch.bad, summary.ignored
            );
        }
        Command::Chain {
            config,
            field,
            max_fuzzy_junction,
            allow_extra_5exon,
            out_dir,
        } => {
            let chain_config = ChainConfig::read(&config)
                .with_context(|| format!("reading {}", config.display()))?;
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            let policy = MergePolicy::exact()
                .with_tolerance(max_fuzzy_junction)
                .with_extra_5exon(allow_extra_5exon);
            let summary = chain_samples(&chain_config, &field, policy, &out_dir).context("chaining failed")?;
            info!("Done: {} chained ids across {} samples", summary.chained_ids, summary.samples);
        }
        Command::Count {
            group,
            assignments,
            output_prefix,
        } => {
            let summary = CountRunner::with_prefix(group, assignments, &output_prefix)
                .run()
                .context("counting failed")?;
            info!("Done: abundance for {} isoforms", summary.pbids);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_prime_flag_is_shared() {
        let collapse = Args::try_parse_from([
            "isocollapse", "collapse", "-i", "hq.fq", "-s", "hq.sam", "-o", "out.fq", "--merge-5-shorter",
        ])
        .unwrap();
        assert!(matches!(collapse.command, Command::Collapse { allow_extra_5exon: true, .. }));

        let chain = Args::try_parse_from(["isocollapse", "chain", "samples.config", "--merge-5-shorter"]).unwrap();
        assert!(matches!(chain.command, Command::Chain { allow_extra_5exon: true, .. }));

        assert!(Args::try_parse_from(["isocollapse", "chain", "samples.config", "--allow-5-merge"]).is_err());
    }
}
