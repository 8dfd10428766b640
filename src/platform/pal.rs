//! Drive platform abstraction: volume listing and removability classification.
//!
//! On Linux, volumes come from `/proc/self/mounts` (with kernel octal-escape
//! decoding of mount paths) and removability from the block layer's
//! `/sys/class/block/<name>/removable` flag, falling back from a partition to
//! its parent disk. A `MockPlatform` backs deterministic tests.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, UswError};

/// How the host classifies a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    Removable,
    Fixed,
    Other,
}

/// A mounted storage volume. Immutable once returned; produced fresh on each
/// enumeration call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveHandle {
    pub root: PathBuf,
    pub kind: VolumeKind,
    pub device: String,
    pub fs_type: String,
}

/// OS abstraction used by device enumeration and the scan engine.
pub trait DrivePlatform: Send + Sync {
    /// All currently mounted volumes, removability already classified.
    fn volumes(&self) -> Result<Vec<DriveHandle>>;

    /// Whether a previously returned handle still resolves to a mounted
    /// volume. Stale handles make later operations fail soft, never crash.
    fn is_available(&self, handle: &DriveHandle) -> bool {
        self.volumes()
            .map(|volumes| volumes.iter().any(|v| v.root == handle.root))
            .unwrap_or(false)
    }
}

/// List only the volumes the host classifies as removable media. No side
/// effects; callers re-enumerate to observe plug/unplug.
pub fn list_removable_devices(platform: &dyn DrivePlatform) -> Result<Vec<DriveHandle>> {
    Ok(platform
        .volumes()?
        .into_iter()
        .filter(|drive| drive.kind == VolumeKind::Removable)
        .collect())
}

/// Detect the active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn DrivePlatform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(UswError::UnsupportedPlatform {
            details: "only Linux device enumeration is currently implemented".to_string(),
        })
    }
}

/// Linux platform using `/proc/self/mounts` + sysfs removability flags.
#[derive(Debug)]
pub struct LinuxPlatform {
    mounts_cache: RwLock<Option<(Vec<DriveHandle>, Instant)>>,
    cache_ttl: Duration,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mounts_cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(2),
        }
    }

    fn collect_volumes(&self) -> Result<Vec<DriveHandle>> {
        let raw = fs::read_to_string("/proc/self/mounts")
            .map_err(|source| UswError::io("/proc/self/mounts", source))?;
        Ok(parse_mount_table(&raw, &sysfs_removable))
    }
}

impl DrivePlatform for LinuxPlatform {
    fn volumes(&self) -> Result<Vec<DriveHandle>> {
        {
            let cache = self.mounts_cache.read();
            if let Some((volumes, collected_at)) = &*cache
                && collected_at.elapsed() < self.cache_ttl
            {
                return Ok(volumes.clone());
            }
        }

        let volumes = self.collect_volumes()?;
        *self.mounts_cache.write() = Some((volumes.clone(), Instant::now()));
        Ok(volumes)
    }
}

/// Parse a `/proc/self/mounts` table into drive handles, keeping only real
/// block devices. `removable` probes the block layer for one device name and
/// returns `None` when the answer is unknown.
fn parse_mount_table(raw: &str, removable: &dyn Fn(&str) -> Option<bool>) -> Vec<DriveHandle> {
    let mut drives = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let device = fields[0];
        // Pseudo-filesystems (proc, tmpfs, cgroup, ...) have no /dev/ source.
        if !device.starts_with("/dev/") {
            continue;
        }
        let kind = match device.strip_prefix("/dev/").and_then(removable) {
            Some(true) => VolumeKind::Removable,
            Some(false) => VolumeKind::Fixed,
            None => VolumeKind::Other,
        };
        drives.push(DriveHandle {
            root: unescape_mount_path(fields[1]),
            kind,
            device: device.to_string(),
            fs_type: fields[2].to_string(),
        });
    }
    drives
}

/// Read `/sys/class/block/<name>/removable`, retrying with the parent disk
/// name when the exact node has no flag (partitions usually don't).
fn sysfs_removable(name: &str) -> Option<bool> {
    // Mapper/loop devices carry slashes once unescaped; sysfs names use them
    // verbatim under /sys/class/block only for plain block nodes.
    if name.contains('/') {
        return None;
    }
    if let Some(flag) = read_removable_flag(name) {
        return Some(flag);
    }
    read_removable_flag(&parent_disk_name(name))
}

fn read_removable_flag(name: &str) -> Option<bool> {
    let raw = fs::read_to_string(format!("/sys/class/block/{name}/removable")).ok()?;
    match raw.trim() {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Derive the parent disk name for a partition node: `sdb1` -> `sdb`,
/// `nvme0n1p2` -> `nvme0n1`, `mmcblk0p1` -> `mmcblk0`.
fn parent_disk_name(name: &str) -> String {
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let trimmed = trimmed.strip_suffix('p').unwrap_or(trimmed);
    trimmed.to_string()
}

/// Decode octal escape sequences (`\NNN`) used by the Linux kernel in mount
/// paths. Returns a PathBuf via OsString to preserve raw bytes.
fn unescape_mount_path(raw: &str) -> PathBuf {
    let mut bytes = Vec::with_capacity(raw.len());
    let raw_bytes = raw.as_bytes();
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\' && i + 3 < raw_bytes.len() {
            let a = raw_bytes[i + 1];
            let b = raw_bytes[i + 2];
            let c = raw_bytes[i + 3];
            // First digit capped at 3: escaped values are single bytes.
            if (b'0'..=b'3').contains(&a)
                && (b'0'..=b'7').contains(&b)
                && (b'0'..=b'7').contains(&c)
            {
                bytes.push((a - b'0') * 64 + (b - b'0') * 8 + (c - b'0'));
                i += 4;
                continue;
            }
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// In-memory platform for deterministic tests. Volumes can be "unplugged" to
/// exercise the stale-handle paths.
#[derive(Debug, Default)]
pub struct MockPlatform {
    volumes: RwLock<Vec<DriveHandle>>,
}

impl MockPlatform {
    #[must_use]
    pub fn new(volumes: Vec<DriveHandle>) -> Self {
        Self {
            volumes: RwLock::new(volumes),
        }
    }

    /// Convenience constructor for one removable volume rooted at `root`.
    #[must_use]
    pub fn single_removable(root: &Path) -> Self {
        Self::new(vec![DriveHandle {
            root: root.to_path_buf(),
            kind: VolumeKind::Removable,
            device: "/dev/sdz1".to_string(),
            fs_type: "vfat".to_string(),
        }])
    }

    /// Simulate the user yanking the device with `root` out of the port.
    pub fn unplug(&self, root: &Path) {
        self.volumes.write().retain(|v| v.root != root);
    }
}

impl DrivePlatform for MockPlatform {
    fn volumes(&self) -> Result<Vec<DriveHandle>> {
        Ok(self.volumes.read().clone())
    }
}
