//! Sample list for chaining.
//!
//! ```text
//! SAMPLE=A;/data/A
//! SAMPLE=B;/data/B
//! GROUP_FILENAME=hq.no5merge.collapsed.group.txt
//! GFF_FILENAME=hq.no5merge.collapsed.good.gff
//! COUNT_FILENAME=hq.no5merge.collapsed.abundance.txt
//! ```
use crate::error::{Error, Result};
use crate::io_utils::{open_input, require_exists};
use std::collections::HashSet;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Files of one sample in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFiles {
    pub name: String,
    pub dir: PathBuf,
    pub gff: PathBuf,
    pub group: PathBuf,
    pub abundance: PathBuf,
}

impl SampleFiles {
    pub fn require_exists(&self) -> Result<()> {
        require_exists(&self.gff)?;
        require_exists(&self.group)?;
        require_exists(&self.abundance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub samples: Vec<SampleFiles>,
}

impl ChainConfig {
    pub fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut samples: Vec<(String, PathBuf)> = Vec::new();
        let mut group_name = None;
        let mut gff_name = None;
        let mut count_name = None;

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::io(e, path))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::parse(path, idx + 1, format!("expected KEY=VALUE, found '{line}'")));
            };
            let value = value.trim();
            match key.trim() {
                "SAMPLE" => {
                    let Some((name, dir)) = value.split_once(';') else {
                        return Err(Error::parse(path, idx + 1, "expected SAMPLE=<name>;<directory>"));
                    };
                    let name = name.trim();
                    if name.is_empty() || name.contains(['|', '\t']) {
                        return Err(Error::parse(path, idx + 1, format!("invalid sample name '{name}'")));
                    }
                    samples.push((name.to_string(), PathBuf::from(dir.trim())));
                }
                "GROUP_FILENAME" => group_name = Some(value.to_string()),
                "GFF_FILENAME" => gff_name = Some(value.to_string()),
                "COUNT_FILENAME" => count_name = Some(value.to_string()),
                other => {
                    return Err(Error::parse(path, idx + 1, format!("unknown key '{other}'")));
                }
            }
        }

        let missing = |key: &str| Error::Config(format!("{} is missing {}", path.display(), key));
        let group_name = group_name.ok_or_else(|| missing("GROUP_FILENAME"))?;
        let gff_name = gff_name.ok_or_else(|| missing("GFF_FILENAME"))?;
        let count_name = count_name.ok_or_else(|| missing("COUNT_FILENAME"))?;
        if samples.is_empty() {
            return Err(missing("SAMPLE entries"));
        }

        let mut seen = HashSet::new();
        for (name, _) in &samples {
            if !seen.insert(name.as_str()) {
                return Err(Error::Config(format!("sample {name} is listed twice in {}", path.display())));
            }
        }

        let samples = samples
            .into_iter()
            .map(|(name, dir)| SampleFiles {
                gff: dir.join(&gff_name),
                group: dir.join(&group_name),
                abundance: dir.join(&count_name),
                name,
                dir,
            })
            .collect();
        Ok(ChainConfig { samples })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::from_reader(open_input(path)?, path)
    }

    pub fn sample_names(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<ChainConfig> {
        ChainConfig::from_reader(Cursor::new(text), Path::new("samples.config"))
    }

    #[test]
    fn test_parse_config() {
        let cfg = parse(
            "# samples\nSAMPLE=A;/d/A\nSAMPLE=B;/d/B\n\nGROUP_FILENAME=g.txt\nGFF_FILENAME=c.gff\nCOUNT_FILENAME=ab.txt\n",
        )
        .unwrap();
        assert_eq!(cfg.sample_names(), vec!["A", "B"]);
        assert_eq!(cfg.samples[1].gff, PathBuf::from("/d/B/c.gff"));
        assert_eq!(cfg.samples[0].abundance, PathBuf::from("/d/A/ab.txt"));
    }

    #[test]
    fn test_duplicate_sample_and_missing_key() {
        let dup = parse("SAMPLE=A;/d/A\nSAMPLE=A;/d/B\nGROUP_FILENAME=g\nGFF_FILENAME=c\nCOUNT_FILENAME=a\n");
        assert!(matches!(dup, Err(Error::Config(_))));

        let missing = parse("SAMPLE=A;/d/A\nGFF_FILENAME=c\nCOUNT_FILENAME=a\n");
        match missing {
            Err(Error::Config(msg)) => assert!(msg.contains("GROUP_FILENAME")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_sample_line() {
        let err = parse("SAMPLE=A\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }
}
