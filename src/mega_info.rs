//! Per-step provenance of a chaining merge: which accumulated record and
//! which new-sample record each mega id came from.
use crate::error::{Error, Result};
use crate::io_utils::open_input;
use indexmap::IndexMap;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

pub const NA: &str = "NA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeGroupOperation {
    pub pbid: String,
    /// Id in the accumulated (previous) set
    pub prev: Option<String>,
    /// Id in the newly added sample
    pub sample: Option<String>,
}

fn or_na(id: &Option<String>) -> &str {
    id.as_deref().unwrap_or(NA)
}

fn from_na(field: &str) -> Option<String> {
    (field != NA).then(|| field.to_string())
}

impl fmt::Display for MergeGroupOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.pbid, or_na(&self.prev), or_na(&self.sample))
    }
}

/// A parsed mega_info file
#[derive(Debug, Clone)]
pub struct MegaInfoTable {
    pub path: PathBuf,
    pub prev_prefix: String,
    pub sample: String,
    pub rows: IndexMap<String, MergeGroupOperation>,
}

impl MegaInfoTable {
    pub fn from_reader<R: BufRead>(reader: R, path: &Path) -> Result<Self> {
        let mut lines = reader.lines().enumerate();
        let (prev_prefix, sample) = match lines.next() {
            Some((_, line)) => {
                let line = line.map_err(|e| Error::io(e, path))?;
                let cols: Vec<&str> = line.trim_end().split('\t').collect();
                match cols.as_slice() {
                    ["pbid", prev, sample] => (prev.to_string(), sample.to_string()),
                    _ => return Err(Error::parse(path, 1, "expected header pbid<TAB>prev<TAB>sample")),
                }
            }
            None => return Err(Error::parse(path, 1, "empty mega_info file")),
        };

        let mut rows = IndexMap::new();
        for (idx, line) in lines {
            let line = line.map_err(|e| Error::io(e, path))?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            let [pbid, prev, new] = cols.as_slice() else {
                return Err(Error::parse(path, idx + 1, format!("expected 3 columns, found {}", cols.len())));
            };
            let op = MergeGroupOperation {
                pbid: pbid.to_string(),
                prev: from_na(prev),
                sample: from_na(new),
            };
            if op.prev.is_none() && op.sample.is_none() {
                return Err(Error::parse(path, idx + 1, format!("{pbid} has no parent")));
            }
            if rows.insert(op.pbid.clone(), op).is_some() {
                return Err(Error::DuplicateId {
                    id: pbid.to_string(),
                    path: path.to_path_buf(),
                });
            }
        }

        Ok(MegaInfoTable {
            path: path.to_path_buf(),
            prev_prefix,
            sample,
            rows,
        })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::from_reader(open_input(path)?, path)
    }

    pub fn get(&self, pbid: &str) -> Option<&MergeGroupOperation> {
        self.rows.get(pbid)
    }
}

pub struct MegaInfoWriter<W: Write> {
    writer: W,
}

impl<W: Write> MegaInfoWriter<W> {
    /// Start a file whose parent columns are named `prev_prefix` and `sample`
    pub fn new(mut writer: W, prev_prefix: &str, sample: &str) -> std::io::Result<Self> {
        writeln!(writer, "pbid\t{prev_prefix}\t{sample}")?;
        Ok(MegaInfoWriter { writer })
    }

    pub fn write(&mut self, op: &MergeGroupOperation) -> std::io::Result<()> {
        writeln!(self.writer, "{op}")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
