//! Mount table snapshots and before/after diffing.
//!
//! The table uses the `/proc/self/mounts` layout: one record per line, with
//! the device, the mount point, the filesystem type and the mount options as
//! the first four space separated fields. Anything after the fourth field is
//! ignored, but must be present.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::MountError;

/// Records longer than this are rejected instead of being read in pieces.
pub const MAX_RECORD_LEN: usize = 64 * 1024;

/// One active mount, at the time the table was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub device: String,
    pub path: PathBuf,
    pub filesystem: String,
    pub options: String,
}

/// Read the whole mount table at `table`.
pub fn list_mounts(table: &Path) -> Result<Vec<Mount>, MountError> {
    parse_mounts(BufReader::with_capacity(MAX_RECORD_LEN, File::open(table)?))
}

/// Parse a mount table. Any malformed record fails the whole table.
pub fn parse_mounts<R: BufRead>(mut reader: R) -> Result<Vec<Mount>, MountError> {
    let mut mounts = Vec::new();
    let mut record = Vec::new();
    let mut line = 0;
    loop {
        record.clear();
        let read = (&mut reader)
            .take(MAX_RECORD_LEN as u64 + 1)
            .read_until(b'\n', &mut record)?;
        if read == 0 {
            return Ok(mounts);
        }
        line += 1;
        if record.last() == Some(&b'\n') {
            record.pop();
        } else if read > MAX_RECORD_LEN {
            return Err(MountError::Parse {
                line,
                reason: format!("record longer than {} bytes", MAX_RECORD_LEN),
            });
        }
        mounts.push(parse_record(&String::from_utf8_lossy(&record), line)?);
    }
}

/// Paths present in `current` but not in `before`, in `current` order.
pub fn new_mount_paths(before: &[Mount], current: &[Mount]) -> Vec<PathBuf> {
    let known: HashSet<&Path> = before.iter().map(|m| m.path.as_path()).collect();
    let mut seen = HashSet::new();
    current
        .iter()
        .map(|m| m.path.as_path())
        .filter(|p| !known.contains(p) && seen.insert(*p))
        .map(Path::to_path_buf)
        .collect()
}

fn parse_record(record: &str, line: usize) -> Result<Mount, MountError> {
    let fields: Vec<&str> = record.splitn(5, ' ').collect();
    if fields.len() != 5 {
        return Err(MountError::Parse {
            line,
            reason: format!("expected at least 5 fields, got {}", fields.len()),
        });
    }
    Ok(Mount {
        device: unescape(fields[0]),
        path: PathBuf::from(unescape(fields[1])),
        filesystem: fields[2].to_owned(),
        options: fields[3].to_owned(),
    })
}

/// Undo the kernel's octal escaping of ` `, `\t`, `\n` and `\\`.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let digits = &bytes[i + 1..i + 4];
            out.push((digits[0] - b'0') * 64 + (digits[1] - b'0') * 8 + (digits[2] - b'0'));
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits[0] <= b'3'
        && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
";

    fn mount(path: &str) -> Mount {
        Mount {
            device: "/dev/sdb1".into(),
            path: path.into(),
            filesystem: "vfat".into(),
            options: "rw".into(),
        }
    }

    #[test]
    fn parses_proc_mounts_layout() {
        let mounts = parse_mounts(TABLE.as_bytes()).unwrap();
        assert_eq!(mounts.len(), 3);
        assert_eq!(
            mounts[2],
            Mount {
                device: "/dev/nvme0n1p2".into(),
                path: "/".into(),
                filesystem: "ext4".into(),
                options: "rw,relatime".into(),
            }
        );
    }

    #[test]
    fn last_record_without_newline_is_kept() {
        let mounts = parse_mounts("/dev/sdb1 /media/boot vfat rw 0 0".as_bytes()).unwrap();
        assert_eq!(mounts[0].path, PathBuf::from("/media/boot"));
    }

    #[test]
    fn decodes_escaped_mount_points() {
        let table = "/dev/sdb1 /media/user/BOOT\\040DISK vfat rw 0 0\n";
        let mounts = parse_mounts(table.as_bytes()).unwrap();
        assert_eq!(mounts[0].path, PathBuf::from("/media/user/BOOT DISK"));
        assert_eq!(unescape("a\\134b\\011c"), "a\\b\tc");
        assert_eq!(unescape("trailing\\04"), "trailing\\04");
    }

    #[test]
    fn short_record_is_a_parse_error() {
        let table = "proc /proc proc rw 0 0\nbroken /mnt\n";
        match parse_mounts(table.as_bytes()) {
            Err(MountError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn overlong_record_is_a_parse_error() {
        let table = format!("dev /{} ext4 rw 0 0\n", "x".repeat(MAX_RECORD_LEN));
        assert!(matches!(
            parse_mounts(table.as_bytes()),
            Err(MountError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn diff_yields_exactly_the_new_path() {
        let before = vec![mount("/"), mount("/boot")];
        let mut after = before.clone();
        after.insert(1, mount("/media/user/BOOT"));
        assert_eq!(
            new_mount_paths(&before, &after),
            vec![PathBuf::from("/media/user/BOOT")]
        );
    }

    #[test]
    fn diff_of_identical_snapshots_is_empty() {
        let before = vec![mount("/"), mount("/boot")];
        assert!(new_mount_paths(&before, &before.clone()).is_empty());
    }

    #[test]
    fn diff_ignores_stacked_mounts_on_a_known_path() {
        let before = vec![mount("/")];
        let after = vec![mount("/"), mount("/"), mount("/media/a"), mount("/media/a")];
        assert_eq!(new_mount_paths(&before, &after), vec![PathBuf::from("/media/a")]);
    }

    #[test]
    fn missing_table_is_an_io_error() {
        assert!(matches!(
            list_mounts(Path::new("/nonexistent/mounts")),
            Err(MountError::Io(_))
        ));
    }
}
