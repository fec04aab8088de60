use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(err) => write!(f, "IoError({:#?})", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::IoError(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub fn read_binary<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn read_string<P: AsRef<Path>>(path: P) -> Result<String> {
    let content = fs::read_to_string(path)?;
    Ok(content)
}

/// Writes via a temp file in the same directory and renames it over the
/// target, so readers never observe a half-written file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_owned());
    let tmp_path = path.with_file_name(format!("{}.tmp-{}", file_name, std::process::id()));
    fs::write(&tmp_path, bytes)?;
    if let Err(rename_err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(rename_err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn scratch_file(name: &str) -> std::path::PathBuf {
        let nonce: u64 = rand::rng().random();
        std::env::temp_dir().join(format!("lote-utils-{nonce}-{name}"))
    }

    #[test]
    fn atomic_write_then_read_back() {
        let path = scratch_file("roundtrip");
        atomic_write(&path, b"token-bytes").unwrap();
        assert_eq!(read_binary(&path).unwrap(), b"token-bytes");
        assert_eq!(read_string(&path).unwrap(), "token-bytes");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let path = scratch_file("replace");
        atomic_write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(read_string(&path).unwrap(), "new");
        fs::remove_file(&path).unwrap();
    }

}
