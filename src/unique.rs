//! Collision-avoiding name allocation for files and directories.
//!
//! Tries `base+suffix`, then `base N+suffix` for increasing N. The
//! check-then-create is performed with create-new semantics, so a race
//! against a concurrent external creator surfaces as AlreadyExists and
//! is retried within the same bounded loop.

use crate::error::{VfsError, VfsResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Attempt budget before giving up with InvalidFilename.
const MAX_UNIQUE_ATTEMPTS: u32 = 1024;

/// Create an empty file named `base+suffix` (or `base N+suffix`) in
/// `parent`, returning the path actually created.
pub async fn create_unique_file(
    parent: &Path,
    base_name: &str,
    suffix: &str,
) -> VfsResult<PathBuf> {
    for n in 1..=MAX_UNIQUE_ATTEMPTS {
        let candidate = parent.join(candidate_name(base_name, suffix, n));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(VfsError::from_io(e, &candidate)),
        }
    }
    Err(VfsError::InvalidFilename(format!("{base_name}{suffix}")))
}

/// Create a directory named `base+suffix` (or `base N+suffix`) in
/// `parent`, returning the path actually created.
pub async fn create_unique_dir(
    parent: &Path,
    base_name: &str,
    suffix: &str,
) -> VfsResult<PathBuf> {
    for n in 1..=MAX_UNIQUE_ATTEMPTS {
        let candidate = parent.join(candidate_name(base_name, suffix, n));
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(VfsError::from_io(e, &candidate)),
        }
    }
    Err(VfsError::InvalidFilename(format!("{base_name}{suffix}")))
}

fn candidate_name(base_name: &str, suffix: &str, n: u32) -> String {
    if n == 1 {
        format!("{base_name}{suffix}")
    } else {
        format!("{base_name} {n}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_candidate_has_no_number() {
        assert_eq!(candidate_name("photo", ".jpg", 1), "photo.jpg");
    }

    #[test]
    fn later_candidates_number_before_suffix() {
        assert_eq!(candidate_name("photo", ".jpg", 2), "photo 2.jpg");
        assert_eq!(candidate_name("album", "", 7), "album 7");
    }
}
