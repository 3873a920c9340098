//! Exon chains and the junction equivalence tests shared by the collapse,
//! fuzzy-merge and chaining stages.
use std::fmt;

/// Transcript strand on the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn from_char(c: char) -> Option<Strand> {
        match c {
            '+' => Some(Strand::Forward),
            '-' => Some(Strand::Reverse),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// 0-based half-open interval on a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: u64,
    pub end: u64,
}

impl Interval {
    pub fn new(start: u64, end: u64) -> Self {
        Interval { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Ordered, non-overlapping, strictly increasing exons of one transcript
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExonChain {
    exons: Vec<Interval>,
}

impl ExonChain {
    pub fn new(exons: Vec<Interval>) -> Result<Self, String> {
        if exons.is_empty() {
            return Err("exon chain has no exons".to_string());
        }
        for (i, exon) in exons.iter().enumerate() {
            if exon.is_empty() {
                return Err(format!("exon {} [{}, {}) is empty", i, exon.start, exon.end));
            }
            if i > 0 && exons[i - 1].end >= exon.start {
                return Err(format!(
                    "exon [{}, {}) does not follow [{}, {})",
                    exon.start,
                    exon.end,
                    exons[i - 1].start,
                    exons[i - 1].end
                ));
            }
        }
        Ok(ExonChain { exons })
    }

    pub fn exons(&self) -> &[Interval] {
        &self.exons
    }

    pub fn num_exons(&self) -> usize {
        self.exons.len()
    }

    pub fn start(&self) -> u64 {
        self.exons[0].start
    }

    pub fn end(&self) -> u64 {
        self.exons[self.exons.len() - 1].end
    }

    pub fn span(&self) -> Interval {
        Interval::new(self.start(), self.end())
    }

    pub fn span_len(&self) -> u64 {
        self.end() - self.start()
    }

    pub fn overlaps(&self, other: &ExonChain) -> bool {
        self.span().overlaps(&other.span())
    }

    /// Donor/acceptor pairs between consecutive exons
    pub fn junctions(&self) -> Vec<(u64, u64)> {
        self.exons
            .windows(2)
            .map(|w| (w[0].end, w[1].start))
            .collect()
    }

    /// Same junctions with the outer boundaries moved to `start`/`end`.
    /// Callers only widen, so the chain stays valid.
    pub fn with_bounds(&self, start: u64, end: u64) -> ExonChain {
        let mut exons = self.exons.clone();
        let last = exons.len() - 1;
        exons[0].start = start.min(exons[0].start);
        exons[last].end = end.max(exons[last].end);
        ExonChain { exons }
    }
}

/// How the junctions of chain `a` relate to those of chain `b`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunctionMatch {
    /// Same number of junctions, all within tolerance
    Exact,
    /// `a`'s junctions are a contiguous run of `b`'s starting at junction `offset`
    Subset { offset: usize },
    /// `b`'s junctions are a contiguous run of `a`'s starting at junction `offset`
    Super { offset: usize },
    NoMatch,
}

/// Junction tolerance and 5' policy used when deciding whether two chains merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    pub tolerance: u64,
    pub allow_extra_5exon: bool,
}

impl MergePolicy {
    pub fn exact() -> Self {
        MergePolicy {
            tolerance: 0,
            allow_extra_5exon: false,
        }
    }

    pub fn with_tolerance(mut self, tolerance: u64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_extra_5exon(mut self, allow: bool) -> Self {
        self.allow_extra_5exon = allow;
        self
    }
}

fn within(a: u64, b: u64, tolerance: u64) -> bool {
    a.abs_diff(b) <= tolerance
}

/// Whether `short` lines up with `long` when its first exon is placed on
/// exon `offset` of `long`.
fn aligned_at(short: &ExonChain, long: &ExonChain, offset: usize, tolerance: u64) -> bool {
    let n = short.num_exons();
    let m = long.num_exons();
    if offset + n > m {
        return false;
    }

    let junctions_match = short
        .exons
        .windows(2)
        .zip(long.exons[offset..].windows(2))
        .all(|(s, l)| within(s[0].end, l[0].end, tolerance) && within(s[1].start, l[1].start, tolerance));
    if !junctions_match {
        return false;
    }

    // Terminal exons of the shorter chain must not run into an intron of the longer one
    if offset > 0 && short.start().saturating_add(tolerance) < long.exons[offset].start {
        return false;
    }
    let last = offset + n - 1;
    if last + 1 < m && short.end() > long.exons[last].end.saturating_add(tolerance) {
        return false;
    }
    true
}

/// Classify the junction relation of `a` to `b`.
pub fn compare_junctions(a: &ExonChain, b: &ExonChain, tolerance: u64) -> JunctionMatch {
    let na = a.num_exons();
    let nb = b.num_exons();

    if na == 1 && nb == 1 {
        return if a.overlaps(b) {
            JunctionMatch::Exact
        } else {
            JunctionMatch::NoMatch
        };
    }
    if na == 1 || nb == 1 {
        return JunctionMatch::NoMatch;
    }

    if na == nb {
        let all_within = a
            .junctions()
            .iter()
            .zip(b.junctions().iter())
            .all(|(x, y)| within(x.0, y.0, tolerance) && within(x.1, y.1, tolerance));
        return if all_within {
            JunctionMatch::Exact
        } else {
            JunctionMatch::NoMatch
        };
    }

    if na < nb {
        (0..=nb - na)
            .find(|&k| aligned_at(a, b, k, tolerance))
            .map(|offset| JunctionMatch::Subset { offset })
            .unwrap_or(JunctionMatch::NoMatch)
    } else {
        (0..=na - nb)
            .find(|&k| aligned_at(b, a, k, tolerance))
            .map(|offset| JunctionMatch::Super { offset })
            .unwrap_or(JunctionMatch::NoMatch)
    }
}

/// `short` is `long` missing only 5' exons: anchored on the 3' end.
fn is_five_prime_truncation(short: &ExonChain, long: &ExonChain, strand: Strand, tolerance: u64) -> bool {
    let n = short.num_exons();
    let m = long.num_exons();
    if n >= m {
        return false;
    }
    let offset = match strand {
        Strand::Forward => m - n,
        Strand::Reverse => 0,
    };
    aligned_at(short, long, offset, tolerance)
}

/// Decide whether two same-strand chains represent the same isoform.
///
/// Exact junction matches always merge. A chain contained in the other merges
/// only when `allow_extra_5exon` is set and the missing exons are all on the
/// 5' side; 3' truncations and interior containments never merge.
pub fn can_merge(a: &ExonChain, b: &ExonChain, strand: Strand, policy: &MergePolicy) -> bool {
    match compare_junctions(a, b, policy.tolerance) {
        JunctionMatch::Exact => true,
        JunctionMatch::NoMatch => false,
        _ if !policy.allow_extra_5exon => false,
        JunctionMatch::Subset { .. } => is_five_prime_truncation(a, b, strand, policy.tolerance),
        JunctionMatch::Super { .. } => is_five_prime_truncation(b, a, strand, policy.tolerance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(exons: &[(u64, u64)]) -> ExonChain {
        ExonChain::new(exons.iter().map(|&(s, e)| Interval::new(s, e)).collect()).unwrap()
    }

    #[test]
    fn test_rejects_overlapping_exons() {
        let bad = ExonChain::new(vec![Interval::new(100, 200), Interval::new(150, 300)]);
        assert!(bad.is_err());
        assert!(ExonChain::new(vec![]).is_err());
        assert!(ExonChain::new(vec![Interval::new(10, 10)]).is_err());
    }

    #[test]
    fn test_junctions() {
        let c = chain(&[(100, 200), (300, 400), (500, 600)]);
        assert_eq!(c.junctions(), vec![(200, 300), (400, 500)]);
        assert_eq!(c.start(), 100);
        assert_eq!(c.end(), 600);
    }

    #[test]
    fn test_exact_ignores_outer_boundaries() {
        let a = chain(&[(100, 200), (300, 400)]);
        let b = chain(&[(50, 200), (300, 450)]);
        assert_eq!(compare_junctions(&a, &b, 0), JunctionMatch::Exact);
    }

    #[test]
    fn test_exact_within_tolerance() {
        let a = chain(&[(100, 200), (300, 400)]);
        let b = chain(&[(100, 203), (298, 400)]);
        assert_eq!(compare_junctions(&a, &b, 0), JunctionMatch::NoMatch);
        assert_eq!(compare_junctions(&a, &b, 3), JunctionMatch::Exact);
    }

    #[test]
    fn test_single_exon_chains() {
        let a = chain(&[(100, 200)]);
        let b = chain(&[(150, 400)]);
        let c = chain(&[(500, 600)]);
        let spliced = chain(&[(100, 200), (300, 400)]);
        assert_eq!(compare_junctions(&a, &b, 0), JunctionMatch::Exact);
        assert_eq!(compare_junctions(&a, &c, 0), JunctionMatch::NoMatch);
        assert_eq!(compare_junctions(&a, &spliced, 0), JunctionMatch::NoMatch);
    }

    #[test]
    fn test_subset_and_super() {
        let long = chain(&[(100, 200), (300, 400), (500, 600)]);
        let tail = chain(&[(350, 400), (500, 650)]);
        assert_eq!(compare_junctions(&tail, &long, 0), JunctionMatch::Subset { offset: 1 });
        assert_eq!(compare_junctions(&long, &tail, 0), JunctionMatch::Super { offset: 1 });
    }

    #[test]
    fn test_subset_rejects_intron_overhang() {
        let long = chain(&[(100, 200), (300, 400), (500, 600)]);
        // first exon starts inside long's first intron by far more than the tolerance
        let overhang = chain(&[(250, 400), (500, 600)]);
        assert_eq!(compare_junctions(&overhang, &long, 5), JunctionMatch::NoMatch);
    }

    #[test]
    fn test_five_prime_policy_forward_strand() {
        let long = chain(&[(100, 200), (300, 400), (500, 600)]);
        let missing_5p = chain(&[(320, 400), (500, 600)]);
        let missing_3p = chain(&[(100, 200), (300, 380)]);
        let allow = MergePolicy::exact().with_extra_5exon(true);
        let deny = MergePolicy::exact();

        assert!(can_merge(&missing_5p, &long, Strand::Forward, &allow));
        assert!(can_merge(&long, &missing_5p, Strand::Forward, &allow));
        assert!(!can_merge(&missing_5p, &long, Strand::Forward, &deny));
        assert!(!can_merge(&missing_3p, &long, Strand::Forward, &allow));
    }

    #[test]
    fn test_five_prime_policy_reverse_strand() {
        let long = chain(&[(100, 200), (300, 400), (500, 600)]);
        // on the minus strand the 5' end is on the right
        let missing_5p = chain(&[(100, 200), (300, 380)]);
        let missing_3p = chain(&[(320, 400), (500, 600)]);
        let allow = MergePolicy::exact().with_extra_5exon(true);

        assert!(can_merge(&missing_5p, &long, Strand::Reverse, &allow));
        assert!(!can_merge(&missing_3p, &long, Strand::Reverse, &allow));
    }

    #[test]
    fn test_huge_tolerance_does_not_overflow() {
        let long = chain(&[(100, 200), (300, 400), (500, 600)]);
        let missing_5p = chain(&[(320, 400), (500, 600)]);
        let policy = MergePolicy::exact().with_tolerance(u64::MAX).with_extra_5exon(true);
        assert!(can_merge(&missing_5p, &long, Strand::Forward, &policy));
        assert!(can_merge(&long, &missing_5p, Strand::Reverse, &policy));
    }

    #[test]
    fn test_interior_containment_never_merges() {
        let long = chain(&[(100, 200), (300, 400), (500, 600), (700, 800)]);
        let middle = chain(&[(320, 400), (500, 580)]);
        let allow = MergePolicy::exact().with_extra_5exon(true);
        assert_eq!(compare_junctions(&middle, &long, 0), JunctionMatch::Subset { offset: 1 });
        assert!(!can_merge(&middle, &long, Strand::Forward, &allow));
        assert!(!can_merge(&middle, &long, Strand::Reverse, &allow));
    }
}
