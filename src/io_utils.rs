use crate::error::{Error, Result};
use noodles::bgzf;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Open a file and auto-detect bgzip compression, returning a boxed BufRead
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| Error::io(e, path))?;

    // Check by file extension (faster than reading magic bytes)
    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz" || ext == "bgz")
        .unwrap_or(false);

    if is_compressed {
        Ok(Box::new(BufReader::new(bgzf::io::reader::Reader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Fail with `MissingInput` unless `path` exists.
pub fn require_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        Ok(())
    } else {
        Err(Error::MissingInput(path.to_path_buf()))
    }
}

/// An output file that only appears under its final name once `commit` is
/// called. Dropping it without committing removes the partial file.
pub struct AtomicOutput {
    path: PathBuf,
    writer: BufWriter<NamedTempFile>,
}

impl AtomicOutput {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = NamedTempFile::new_in(&dir).map_err(|e| Error::io(e, &dir))?;
        Ok(AtomicOutput {
            path,
            writer: BufWriter::new(temp),
        })
    }

    /// Flush and move the temporary file to its final name.
    pub fn commit(self) -> Result<PathBuf> {
        let AtomicOutput { path, writer } = self;
        let temp = writer
            .into_inner()
            .map_err(|e| Error::io(e.into_error(), &path))?;
        temp.persist(&path).map_err(|e| Error::io(e.error, &path))?;
        Ok(path)
    }
}

impl Write for AtomicOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Copy `from` to `to` through an `AtomicOutput`.
pub fn copy_file<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Result<()> {
    let from = from.as_ref();
    let mut input = File::open(from).map_err(|e| Error::io(e, from))?;
    let mut out = AtomicOutput::create(to)?;
    std::io::copy(&mut input, &mut out).map_err(|e| Error::io(e, from))?;
    out.commit()?;
    Ok(())
}

/// Format a float like C's `%.4e`, e.g. `6.3667e-03`.
pub fn format_sci(value: f64) -> String {
    let s = format!("{value:.4e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_sci_matches_c_style() {
        assert_eq!(format_sci(6.3667e-3), "6.3667e-03");
        assert_eq!(format_sci(30.0), "3.0000e+01");
        assert_eq!(format_sci(0.0), "0.0000e+00");
        assert_eq!(format_sci(1.5e-120), "1.5000e-120");
    }

    #[test]
    fn test_atomic_output_only_visible_after_commit() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.txt");

        let mut out = AtomicOutput::create(&target).unwrap();
        writeln!(out, "hello").unwrap();
        assert!(!target.exists());
        out.commit().unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello\n");

        let mut dropped = AtomicOutput::create(dir.path().join("never.txt")).unwrap();
        writeln!(dropped, "partial").unwrap();
        drop(dropped);
        assert!(!dir.path().join("never.txt").exists());
    }

    #[test]
    fn test_open_missing_input() {
        let err = open_input("/nonexistent/definitely/missing.sam").err().unwrap();
        assert!(matches!(err, Error::MissingInput(_)));
    }
}
