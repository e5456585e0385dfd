//! Host-side metadata helpers built around `chmod` and `utimes` semantics.

use std::fs;
use std::path::Path;

use filetime::{FileTime, set_file_times};

use crate::error::MetadataError;
use crate::time::TimePair;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Extracts the nine permission bits from a `stat` result.
///
/// Non-Unix targets have no permission bits to report; they fall back to
/// conventional defaults so emitted headers stay well-formed.
#[must_use]
pub fn mode_bits(metadata: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        metadata.permissions().mode() & 0o777
    }

    #[cfg(not(unix))]
    {
        if metadata.is_dir() { 0o755 } else { 0o644 }
    }
}

/// Reads the timestamp pair from a `stat` result, when the filesystem
/// reports both.
#[must_use]
pub fn file_times(metadata: &fs::Metadata) -> Option<TimePair> {
    let mtime = metadata.modified().ok()?;
    let atime = metadata.accessed().ok()?;
    Some(TimePair::new(mtime, atime))
}

/// Sets the permission bits of `path`, overriding the process umask.
pub fn apply_mode(path: &Path, mode: u32) -> Result<(), MetadataError> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
            .map_err(|error| MetadataError::new("change mode of", path, error))
    }

    #[cfg(not(unix))]
    {
        let _ = mode;
        let _ = path;
        Ok(())
    }
}

/// Sets the access and modification times of `path`.
pub fn apply_times(path: &Path, times: &TimePair) -> Result<(), MetadataError> {
    set_file_times(
        path,
        FileTime::from_system_time(times.atime()),
        FileTime::from_system_time(times.mtime()),
    )
    .map_err(|error| MetadataError::new("change times of", path, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn times_round_trip_through_the_filesystem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stamped");
        fs::write(&path, b"x").expect("write");

        let times = TimePair::new(
            UNIX_EPOCH + Duration::from_secs(1_600_000_000),
            UNIX_EPOCH + Duration::from_secs(1_600_000_500),
        );
        apply_times(&path, &times).expect("utimes");

        let metadata = fs::metadata(&path).expect("stat");
        let read_back = file_times(&metadata).expect("times supported");
        assert_eq!(read_back.mtime(), times.mtime());
        assert_eq!(read_back.atime(), times.atime());
    }

    #[cfg(unix)]
    #[test]
    fn mode_round_trips_through_the_filesystem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("moded");
        fs::write(&path, b"x").expect("write");

        apply_mode(&path, 0o640).expect("chmod");
        let metadata = fs::metadata(&path).expect("stat");
        assert_eq!(mode_bits(&metadata), 0o640);
    }
}
