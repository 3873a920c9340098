use crate::error::{Error, Result};
use crate::io_utils::open_input;
use indexmap::IndexMap;
use std::io::{BufRead, Write};
use std::path::Path;

/// Groups keyed by collapsed id (one group record per entry), in file order
pub type GroupTable = IndexMap<String, Vec<String>>;

pub fn read_groups_from<R: BufRead>(reader: R, path: &Path) -> Result<GroupTable> {
    let mut groups = GroupTable::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::io(e, path))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split('\t');
        let (id, members) = match (fields.next(), fields.next(), fields.next()) {
            (Some(id), Some(members), None) if !id.is_empty() && !members.is_empty() => (id, members),
            _ => {
                return Err(Error::parse(
                    path,
                    idx + 1,
                    format!("could not recognize '{line}' as a group record"),
                ))
            }
        };
        let members: Vec<String> = members.split(',').map(str::to_string).collect();
        if groups.insert(id.to_string(), members).is_some() {
            return Err(Error::DuplicateId {
                id: id.to_string(),
                path: path.to_path_buf(),
            });
        }
    }
    Ok(groups)
}

/// Read a group file (`id<TAB>member,member,...`)
pub fn read_groups<P: AsRef<Path>>(path: P) -> Result<GroupTable> {
    let path = path.as_ref();
    let input = open_input(path)?;
    read_groups_from(input, path)
}

/// Same as `read_groups` with every member rewritten as `prefix|member`
pub fn read_groups_with_prefix<P: AsRef<Path>>(path: P, prefix: &str) -> Result<GroupTable> {
    let mut groups = read_groups(path)?;
    for members in groups.values_mut() {
        for m in members.iter_mut() {
            *m = format!("{prefix}|{m}");
        }
    }
    Ok(groups)
}

pub struct GroupWriter<W: Write> {
    writer: W,
}

impl<W: Write> GroupWriter<W> {
    pub fn new(writer: W) -> Self {
        GroupWriter { writer }
    }

    pub fn write_group(&mut self, id: &str, members: &[String]) -> std::io::Result<()> {
        writeln!(self.writer, "{}\t{}", id, members.join(","))
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_groups() {
        let text = "# comment\nPB.1.1\ta,b,c\n\nPB.1.2\td\n";
        let groups = read_groups_from(Cursor::new(text), Path::new("g.txt")).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["PB.1.1"], vec!["a", "b", "c"]);
        assert_eq!(groups.get_index(1).unwrap().0, "PB.1.2");
    }

    #[test]
    fn test_rejects_malformed_and_duplicates() {
        let malformed = read_groups_from(Cursor::new("PB.1.1\n"), Path::new("g.txt"));
        assert!(matches!(malformed, Err(Error::Parse { line: 1, .. })));

        let dup = read_groups_from(Cursor::new("PB.1.1\ta\nPB.1.1\tb\n"), Path::new("g.txt"));
        assert!(matches!(dup, Err(Error::DuplicateId { .. })));
    }
}
