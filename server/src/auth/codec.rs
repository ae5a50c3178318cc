//! Credential file I/O. The codec is the only component that puts credential
//! bytes on disk: it enforces the 0600 permission contract on every read,
//! writes atomically (temp file + fsync + rename), and serialises concurrent
//! operator invocations through a sibling `<file>.lock`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::CodecError;
use crate::models::token::TokenFile;
use crate::models::user::UserFile;

pub const CREDENTIAL_FILE_MODE: u32 = 0o600;

pub fn load_token_file(path: &Path) -> Result<TokenFile, CodecError> {
    let text = read_checked(path)?;
    serde_yaml::from_str(&text).map_err(|source| CodecError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_user_file(path: &Path) -> Result<UserFile, CodecError> {
    let text = read_checked(path)?;
    serde_yaml::from_str(&text).map_err(|source| CodecError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_token_file(path: &Path, file: &TokenFile) -> Result<(), CodecError> {
    let text = serde_yaml::to_string(file).map_err(|source| CodecError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, text.as_bytes())
}

pub fn save_user_file(path: &Path, file: &UserFile) -> Result<(), CodecError> {
    let text = serde_yaml::to_string(file).map_err(|source| CodecError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, text.as_bytes())
}

fn read_checked(path: &Path) -> Result<String, CodecError> {
    let metadata = fs::metadata(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    check_mode(path, metadata.permissions())?;
    fs::read_to_string(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn check_mode(path: &Path, permissions: fs::Permissions) -> Result<(), CodecError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = permissions.mode() & 0o777;
    if mode != CREDENTIAL_FILE_MODE {
        return Err(CodecError::Permission {
            path: path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_mode(_path: &Path, _permissions: fs::Permissions) -> Result<(), CodecError> {
    Ok(())
}

/// Write temp file in the target directory, fsync, set 0600, rename over the
/// destination. Readers observe either the old or the new file, never a
/// partial one.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CodecError> {
    let io_err = |source: std::io::Error| CodecError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = dir.unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    set_mode(tmp.as_file()).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(fs::Permissions::from_mode(CREDENTIAL_FILE_MODE))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

/// Exclusive advisory lock on `<file>.lock`, released on drop. Serialises
/// concurrent operator processes mutating the same credential file.
pub struct FileLock {
    file: fs::File,
}

pub fn lock_sibling(path: &Path) -> Result<FileLock, CodecError> {
    let mut lock_path = PathBuf::from(path);
    lock_path.as_mut_os_string().push(".lock");

    let io_err = |source: std::io::Error| CodecError::Io {
        path: lock_path.clone(),
        source,
    };
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(io_err)?;
    file.lock_exclusive().map_err(io_err)?;
    Ok(FileLock { file })
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
