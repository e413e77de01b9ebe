//! Mount table classification.
//!
//! Virtual, pseudo and ephemeral filesystems (procfs, sysfs, tmpfs, overlay,
//! FUSE bridges, ...) can block, lie about sizes or expose unbounded content,
//! so their mountpoints are excluded from a sweep.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::OsStringExt;
use std::path::{Component, Path, PathBuf};

use hashsweep_core::SweepError;

/// Preferred mount table: carries the optional fields and the separator.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";
/// Fallback mount table in fstab layout.
pub const PROC_MOUNTS_PATH: &str = "/proc/mounts";

/// Filesystem types that are always excluded.
pub const EXCLUDED_FS_TYPES: &[&str] = &[
    "proc",
    "sysfs",
    "devtmpfs",
    "devpts",
    "tmpfs",
    "hugetlbfs",
    "cgroup",
    "cgroup2",
    "configfs",
    "fusectl",
    "debugfs",
    "securityfs",
    "pstore",
    "bpf",
    "tracefs",
    "ramfs",
    "autofs",
    "sockfs",
    "pipefs",
    "overlay",
    "squashfs",
    "nsfs",
    "binfmt_misc",
    "rpc_pipefs",
    "mqueue",
    "zramfs",
    "zsmalloc",
];

/// Filesystem type prefixes that are always excluded.
pub const EXCLUDED_FS_PREFIXES: &[&str] = &["cgroup", "fuse.", "fusectl"];

/// One entry of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub mountpoint: PathBuf,
    pub fs_type: String,
}

impl MountRecord {
    pub fn new(mountpoint: impl Into<PathBuf>, fs_type: impl Into<String>) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            fs_type: fs_type.into(),
        }
    }

    /// Check if this mount's filesystem type is on the denylist.
    pub fn is_excluded_type(&self) -> bool {
        is_excluded_fs_type(&self.fs_type)
    }
}

/// Check a filesystem type against the exact list and the prefix list.
pub fn is_excluded_fs_type(fs_type: &str) -> bool {
    EXCLUDED_FS_TYPES.contains(&fs_type)
        || EXCLUDED_FS_PREFIXES
            .iter()
            .any(|prefix| fs_type.starts_with(prefix))
}

/// Layout of a mount table source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountTableFormat {
    /// `/proc/self/mountinfo`: `id parent maj:min root mountpoint opts [optional...] - fstype source superopts`
    MountInfo,
    /// `/proc/mounts`: `source mountpoint fstype opts dump pass`
    ProcMounts,
}

impl MountTableFormat {
    /// Guess the layout from file contents.
    pub fn detect(raw: &str) -> Self {
        if raw.lines().any(|line| line.contains(" - ")) {
            Self::MountInfo
        } else {
            Self::ProcMounts
        }
    }
}

/// Parse one mount table line, `None` if it is malformed.
pub fn parse_line(line: &str, format: MountTableFormat) -> Option<MountRecord> {
    match format {
        MountTableFormat::MountInfo => {
            let (left, right) = line.trim().split_once(" - ")?;
            let mountpoint = left.split_whitespace().nth(4)?;
            let fs_type = right.split_whitespace().next()?;
            Some(MountRecord::new(unescape_mount_path(mountpoint), fs_type))
        }
        MountTableFormat::ProcMounts => {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return None;
            }
            Some(MountRecord::new(unescape_mount_path(fields[1]), fields[2]))
        }
    }
}

/// Parse a whole mount table.
///
/// Malformed lines are dropped unless `strict` is set, in which case the
/// first one is returned as an error message naming its line number.
pub fn parse_table(
    raw: &str,
    format: MountTableFormat,
    strict: bool,
) -> Result<Vec<MountRecord>, String> {
    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line, format) {
            Some(record) => records.push(record),
            None if strict => return Err(format!("line {}: unparseable entry {line:?}", index + 1)),
            None => {}
        }
    }
    Ok(records)
}

/// Decode the octal escapes the kernel uses for whitespace and backslashes.
fn unescape_mount_path(raw: &str) -> PathBuf {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(OsString::from_vec(out))
}

/// Make a path absolute without touching the filesystem.
///
/// `.` and `..` components are folded lexically; symlinks are not resolved.
pub fn absolutize(path: &Path) -> PathBuf {
    let joined;
    let path = if path.is_absolute() {
        path
    } else {
        joined = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path);
        joined.as_path()
    };

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Mountpoints excluded from a sweep, most specific first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedMounts {
    mounts: Vec<PathBuf>,
    fs_types: HashMap<PathBuf, String>,
}

impl ExcludedMounts {
    /// An empty set: nothing is excluded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the set from arbitrary mountpoints.
    ///
    /// Paths are made absolute, deduplicated, and ordered by descending
    /// length, then lexicographically.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut mounts: Vec<PathBuf> = paths
            .into_iter()
            .map(|p| absolutize(p.as_ref()))
            .collect();
        mounts.sort_by(|a, b| {
            b.as_os_str()
                .len()
                .cmp(&a.as_os_str().len())
                .then_with(|| a.cmp(b))
        });
        mounts.dedup();
        Self {
            mounts,
            fs_types: HashMap::new(),
        }
    }

    /// Keep the mountpoints of records whose filesystem type is excluded.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MountRecord>) -> Self {
        let excluded: Vec<&MountRecord> = records
            .into_iter()
            .filter(|record| record.is_excluded_type())
            .collect();
        let mut set = Self::from_paths(excluded.iter().map(|record| record.mountpoint.as_path()));
        // Later entries overmount earlier ones.
        for record in excluded {
            set.fs_types
                .insert(absolutize(&record.mountpoint), record.fs_type.clone());
        }
        set
    }

    /// Parse raw mount table text.
    pub fn parse(raw: &str, format: MountTableFormat, strict: bool) -> Result<Self, String> {
        parse_table(raw, format, strict).map(|records| Self::from_records(&records))
    }

    /// Read and parse a mount table file, detecting its layout.
    pub fn from_table_file(path: &Path, strict: bool) -> Result<Self, SweepError> {
        let raw = fs::read(path).map_err(|e| SweepError::io(path, e))?;
        let raw = String::from_utf8_lossy(&raw);
        Self::parse(&raw, MountTableFormat::detect(&raw), strict)
            .map_err(|message| SweepError::mount_table(path, message))
    }

    /// Build the set from the live mount table.
    ///
    /// Prefers `/proc/self/mountinfo`, falls back to `/proc/mounts`. When
    /// `strict` is false, an unreadable table yields an empty set.
    pub fn load_live(strict: bool) -> Result<Self, SweepError> {
        let source = if Path::new(MOUNTINFO_PATH).exists() {
            MOUNTINFO_PATH
        } else {
            PROC_MOUNTS_PATH
        };
        match Self::from_table_file(Path::new(source), strict) {
            Ok(set) => Ok(set),
            Err(err) if strict => Err(err),
            Err(err) => {
                tracing::warn!(%err, "mount table unavailable, nothing will be excluded");
                Ok(Self::empty())
            }
        }
    }

    /// Check whether `path` equals or lies inside an excluded mountpoint.
    pub fn contains(&self, path: &Path) -> bool {
        if self.mounts.is_empty() {
            return false;
        }
        let path = absolutize(path);
        self.mounts.iter().any(|mount| path.starts_with(mount))
    }

    /// The most specific excluded mountpoint covering `path`.
    pub fn mount_for(&self, path: &Path) -> Option<&Path> {
        let path = absolutize(path);
        self.mounts
            .iter()
            .find(|mount| path.starts_with(mount))
            .map(PathBuf::as_path)
    }

    /// Filesystem type recorded for an excluded mountpoint, if it came from a
    /// mount table.
    pub fn fs_type(&self, mount: &Path) -> Option<&str> {
        self.fs_types.get(mount).map(String::as_str)
    }

    /// Excluded mountpoints in match order.
    pub fn mounts(&self) -> &[PathBuf] {
        &self.mounts
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

/// Load the exclusion set from the live mount table, failing open.
pub fn load_excluded_mounts() -> ExcludedMounts {
    ExcludedMounts::load_live(false).unwrap_or_default()
}

/// Check `path` against an exclusion set.
pub fn is_excluded(path: &Path, excluded: &ExcludedMounts) -> bool {
    excluded.contains(path)
}
