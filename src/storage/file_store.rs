//! File-backed secret storage for hosts without a keychain.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::storage::{SecureStorage, StorageError};

/// Directory-backed storage for the device key and the attestation record.
///
/// Each entry is a single `*.cred` file in a private credentials directory.
/// Writes go through a staging file and an atomic rename, so a crash can
/// never leave a torn device key or attestation record behind. An entry
/// readable by group or other is refused as `AccessDenied`, the same signal
/// a refusing keychain produces, which the engine reports as
/// `SecureEnclaveUnavailable`.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open the default per-user credentials directory.
    pub fn new() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("com", "attest-auth", "attest-auth").ok_or_else(|| {
            StorageError::Backend("no home directory for credential storage".to_string())
        })?;
        Self::at(dirs.data_local_dir().join("credentials"))
    }

    /// Open (creating if needed) a specific credentials directory.
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(map_io)?;
        restrict_dir(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.cred", encode_file_name(key)))
    }
}

impl SecureStorage for FileStorage {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        let staging = path.with_extension("cred.tmp");

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&staging).map_err(map_io)?;
        file.write_all(value).map_err(map_io)?;
        file.sync_all().map_err(map_io)?;
        drop(file);

        // Rename within one directory is atomic; readers see either the old
        // entry or the new one, never a partial write.
        fs::rename(&staging, &path).map_err(map_io)
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.entry_path(key);

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(map_io(e)),
        };
        refuse_shared(&path, key)?;

        let mut value = Vec::new();
        file.read_to_end(&mut value).map_err(map_io)?;
        Ok(value)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        scrub(&path);
        fs::remove_file(&path).map_err(map_io)
    }

    fn exists(&self, key: &str) -> bool {
        self.entry_path(key).exists()
    }
}

/// Encode a storage tag as a flat file name.
///
/// Tags are derived from bundle identifiers, so they are dotted and would
/// collide under lossy substitution (`com.a.b` and `com.a_b` both becoming
/// `com_a_b`). Alphanumerics and `-` pass through; every other byte is
/// hex-escaped, which keeps the mapping injective and free of path
/// separators.
fn encode_file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => name.push(byte as char),
            other => name.push_str(&format!("%{other:02x}")),
        }
    }
    name
}

/// Best-effort zero overwrite before unlink so key bytes do not linger in
/// the file.
fn scrub(path: &Path) {
    let Ok(len) = fs::metadata(path).map(|metadata| metadata.len()) else {
        return;
    };
    if let Ok(mut file) = OpenOptions::new().write(true).open(path) {
        let _ = file.write_all(&vec![0u8; len as usize]);
        let _ = file.sync_all();
    }
}

#[cfg(unix)]
fn restrict_dir(dir: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(map_io)
}

#[cfg(not(unix))]
fn restrict_dir(_dir: &Path) -> Result<(), StorageError> {
    Ok(())
}

/// A credential file readable by anyone else is treated like a keychain that
/// refuses access.
#[cfg(unix)]
fn refuse_shared(path: &Path, key: &str) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    let mode = fs::metadata(path).map_err(map_io)?.permissions().mode();
    if mode & 0o077 != 0 {
        tracing::warn!(key, mode = mode & 0o777, "credential file is shared; refusing");
        return Err(StorageError::AccessDenied);
    }
    Ok(())
}

#[cfg(not(unix))]
fn refuse_shared(_path: &Path, _key: &str) -> Result<(), StorageError> {
    Ok(())
}

fn map_io(e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::PermissionDenied => StorageError::AccessDenied,
        _ => StorageError::Io(e.to_string()),
    }
}
