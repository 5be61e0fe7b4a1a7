//! Canonical tar bundling of materialized entries
//!
//! Archives are serialized as tar streams with normalized headers (mtime 0,
//! uid/gid 0, fixed modes) so that the same entries always produce the same
//! bytes. Signatures are computed over these bytes.

use std::io::{self, Read};

use tar::{Builder, Header};

use super::{EntryKind, MaterializedEntry};

/// Serialize entries, in order, into a canonical tar stream
pub fn bundle_entries(entries: &[MaterializedEntry]) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut builder = Builder::new(&mut buffer);

        for entry in entries {
            let mut header = Header::new_gnu();
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);

            match entry.kind {
                EntryKind::File => {
                    header.set_path(&entry.path)?;
                    header.set_size(entry.contents.len() as u64);
                    header.set_mode(0o644);
                    header.set_cksum();
                    builder.append(&header, entry.contents.as_slice())?;
                }
                EntryKind::Directory => {
                    header.set_path(format!("{}/", entry.path))?;
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_cksum();
                    builder.append(&header, &[] as &[u8])?;
                }
            }
        }

        builder.finish()?;
    }
    Ok(buffer)
}

/// Read a tar stream back into entries, preserving stream order
pub fn unbundle(bytes: &[u8]) -> io::Result<Vec<MaterializedEntry>> {
    let mut archive = tar::Archive::new(bytes);
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = String::from_utf8_lossy(&entry.path_bytes())
            .trim_end_matches('/')
            .to_string();

        if entry.header().entry_type().is_dir() {
            entries.push(MaterializedEntry::directory(path));
        } else {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            entries.push(MaterializedEntry::file(path, contents));
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_preserves_order_and_contents() {
        let entries = vec![
            MaterializedEntry::file("b.bin", vec![2; 10]),
            MaterializedEntry::directory("dir"),
            MaterializedEntry::file("dir/a.bin", vec![1; 700]),
            MaterializedEntry::file("empty", Vec::new()),
        ];

        let bytes = bundle_entries(&entries).unwrap();
        assert_eq!(unbundle(&bytes).unwrap(), entries);
    }

    #[test]
    fn test_bundle_is_byte_stable() {
        let entries = vec![MaterializedEntry::file("export.bin", b"abc".to_vec())];
        assert_eq!(
            bundle_entries(&entries).unwrap(),
            bundle_entries(&entries).unwrap()
        );
    }

    #[test]
    fn test_empty_bundle() {
        let bytes = bundle_entries(&[]).unwrap();
        assert!(unbundle(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_header_normalized() {
        let bytes = bundle_entries(&[MaterializedEntry::file("x", vec![1])]).unwrap();
        let mut archive = tar::Archive::new(bytes.as_slice());
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        let header = entry.header();
        assert_eq!(header.mtime().unwrap(), 0);
        assert_eq!(header.uid().unwrap(), 0);
        assert_eq!(header.mode().unwrap(), 0o644);
    }
}
