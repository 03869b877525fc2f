// SPDX-License-Identifier: GPL-3.0-only

//! Capture storage information

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::constants::defaults;

const MIB: f64 = 1024.0 * 1024.0;

/// Readiness of the capture storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    NotAvailable,
    Unformatted,
    Ready,
}

/// Capacity figures in MiB for the filesystem holding captures
#[derive(Debug, Clone, PartialEq)]
pub struct StorageInfo {
    pub path: PathBuf,
    pub status: StorageStatus,
    pub total_mib: f64,
    pub available_mib: f64,
    pub used_mib: f64,
}

impl StorageInfo {
    /// Fixed figures reported when the filesystem cannot be queried
    pub fn fallback(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            status: StorageStatus::Ready,
            total_mib: defaults::STORAGE_CAPACITY_MIB,
            available_mib: defaults::STORAGE_AVAILABLE_MIB,
            used_mib: defaults::STORAGE_USED_MIB,
        }
    }

    /// Query the filesystem holding `path`
    pub fn query(path: &Path) -> Self {
        match statvfs(path) {
            Ok(stat) => {
                let fragment = stat.f_frsize as f64;
                let total = stat.f_blocks as f64 * fragment / MIB;
                let available = stat.f_bavail as f64 * fragment / MIB;
                let free = stat.f_bfree as f64 * fragment / MIB;
                debug!(path = %path.display(), total, available, "Storage queried");
                Self {
                    path: path.to_path_buf(),
                    status: StorageStatus::Ready,
                    total_mib: total,
                    available_mib: available,
                    used_mib: total - free,
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot query storage, reporting defaults");
                Self::fallback(path)
            }
        }
    }
}

fn statvfs(path: &Path) -> std::io::Result<libc::statvfs> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(stat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_reports_defaults() {
        let info = StorageInfo::query(Path::new("/nonexistent/camera-manager/storage"));
        assert_eq!(info, StorageInfo::fallback(Path::new("/nonexistent/camera-manager/storage")));
        assert_eq!(info.total_mib, 8000.0);
    }

    #[test]
    fn temp_dir_is_queryable() {
        let info = StorageInfo::query(&std::env::temp_dir());
        assert_eq!(info.status, StorageStatus::Ready);
        assert!(info.total_mib > 0.0);
        assert!(info.available_mib <= info.total_mib);
    }
}
