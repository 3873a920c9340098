/// Performance benchmarks for branch collapsing and fuzzy junction merging
///
/// Run with: cargo bench
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use isocollapse::collapse::collapse_group;
use isocollapse::exon_chain::{ExonChain, Interval, MergePolicy, Strand};
use isocollapse::fuzzy::merge_fuzzy_junctions;
use isocollapse::gff::CollapsedRecord;
use isocollapse::group::GroupTable;
use isocollapse::sam::AlignmentRecord;
use std::path::Path;

/// Synthetic isoforms of one 10-exon gene: every read skips one exon in
/// eight, is 5' truncated by up to three exons and has junctions jittered by
/// up to 3bp.
fn synthetic_chains(num_reads: usize) -> Vec<ExonChain> {
    (0..num_reads)
        .map(|i| {
            let skipped = if i % 8 == 0 { Some(1 + (i / 8) % 8) } else { None };
            let first = i % 4;
            let jitter = (i % 4) as u64;
            let exons = (first..10)
                .filter(|&e| Some(e) != skipped)
                .map(|e| {
                    let base = 1000 + e as u64 * 500;
                    let start = if e == first { base } else { base + jitter };
                    Interval::new(start, base + 200 + jitter)
                })
                .collect();
            ExonChain::new(exons).unwrap()
        })
        .collect()
}

fn alignments(num_reads: usize) -> Vec<AlignmentRecord> {
    let mut records: Vec<AlignmentRecord> = synthetic_chains(num_reads)
        .into_iter()
        .enumerate()
        .map(|(i, exons)| AlignmentRecord {
            query_id: format!("read{i}"),
            ref_id: "chr1".to_string(),
            strand: Strand::Forward,
            exons,
            query_len: 2000,
            coverage: 1.0,
            identity: 1.0,
            ordinal: i,
        })
        .collect();
    records.sort_by_key(|r| (r.exons.start(), r.ordinal));
    records
}

/// Benchmark: exact branch collapse of one locus
fn bench_collapse_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("collapse_group");
    let policy = MergePolicy::exact();

    for size in [100, 500, 2000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.sample_size(10);

        let records = alignments(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| collapse_group(black_box(records), Strand::Forward, 1, &policy, 1));
        });
    }

    group.finish();
}

/// Benchmark: fuzzy merge of already collapsed transcripts
fn bench_fuzzy_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("fuzzy_merge");
    let policy = MergePolicy::exact().with_tolerance(5).with_extra_5exon(true);

    for size in [100, 500, 2000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.sample_size(10);

        let records: Vec<CollapsedRecord> = synthetic_chains(*size)
            .into_iter()
            .enumerate()
            .map(|(i, exons)| CollapsedRecord {
                id: format!("PB.1.{}", i + 1),
                ref_id: "chr1".to_string(),
                strand: Strand::Forward,
                exons,
                support: 1,
            })
            .collect();
        let groups: GroupTable = records
            .iter()
            .map(|r| (r.id.clone(), vec![format!("m{}", r.id)]))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| merge_fuzzy_junctions(black_box(records), &groups, &policy, Path::new("bench")).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_collapse_group, bench_fuzzy_merge);

criterion_main!(benches);
