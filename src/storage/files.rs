use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

const WAV_EXTENSION: &str = "wav";
const RAW_FALLBACK_EXTENSION: &str = "bin";

/// WAV filename for a sequence id: zero-padded numeric stem.
pub fn wav_filename_for(sequence_id: u64) -> String {
    format!("{:08}.{}", sequence_id, WAV_EXTENSION)
}

/// Sequence id embedded in a WAV filename, if the stem is numeric.
pub fn sequence_id_from_filename(filename: &str) -> Option<u64> {
    let stem = filename.strip_suffix(".wav")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Raw uploads and converted WAV files on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    raw_dir: PathBuf,
    wav_dir: PathBuf,
}

/// Listing entry used for ordering.
struct WavEntry {
    modified: SystemTime,
    sequence_id: Option<u64>,
    filename: String,
}

impl FileStore {
    /// Open the store, creating both directories if needed.
    pub async fn open(raw_dir: impl Into<PathBuf>, wav_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self {
            raw_dir: raw_dir.into(),
            wav_dir: wav_dir.into(),
        };

        for dir in [&store.raw_dir, &store.wav_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|source| StorageError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(store)
    }

    /// Directory holding raw uploads.
    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Directory holding converted WAV files.
    pub fn wav_dir(&self) -> &Path {
        &self.wav_dir
    }

    /// Persist a raw upload under a fresh unique name, keeping a sane extension.
    pub async fn store_raw(&self, bytes: &[u8], original_name: &str) -> StorageResult<PathBuf> {
        let filename = format!("{}.{}", Uuid::new_v4(), raw_extension(original_name));
        let path = self.raw_dir.join(&filename);

        write_file(&path, bytes).await?;
        debug!(path = %path.display(), bytes = bytes.len(), original_name, "Stored raw upload");

        Ok(path)
    }

    /// Persist converted audio under the filename derived from `sequence_id`.
    ///
    /// Written to a hidden `.part` file and renamed, so a listed or resolvable
    /// WAV is always complete.
    pub async fn store_wav(&self, bytes: &[u8], sequence_id: u64) -> StorageResult<String> {
        let filename = wav_filename_for(sequence_id);
        let path = self.wav_dir.join(&filename);
        let partial = self.wav_dir.join(format!(".{}.part", filename));

        write_file(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), sequence_id, "Stored WAV");
        Ok(filename)
    }

    /// Converted WAV filenames, most recent first.
    ///
    /// Ordered by modification time, ties broken by the embedded sequence id
    /// (descending) and then by name.
    pub async fn list_wav_files(&self) -> StorageResult<Vec<String>> {
        let io_err = |source| StorageError::Io {
            path: self.wav_dir.clone(),
            source,
        };

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.wav_dir).await.map_err(io_err)?;

        while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
            let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if filename.starts_with('.') || !filename.ends_with(".wav") {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    // Removed between read_dir and stat.
                    warn!(filename, error = %e, "Skipping unreadable WAV entry");
                    continue;
                }
            };

            entries.push(WavEntry {
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                sequence_id: sequence_id_from_filename(&filename),
                filename,
            });
        }

        entries.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.sequence_id.cmp(&a.sequence_id))
                .then_with(|| b.filename.cmp(&a.filename))
        });

        Ok(entries.into_iter().map(|e| e.filename).collect())
    }

    /// The most recent WAV, if any exist.
    pub async fn most_recent(&self) -> StorageResult<Option<String>> {
        Ok(self.list_wav_files().await?.into_iter().next())
    }

    /// Path of an existing WAV file.
    pub async fn resolve(&self, filename: &str) -> StorageResult<PathBuf> {
        if !is_plain_wav_name(filename) {
            return Err(StorageError::InvalidFilename {
                filename: filename.to_string(),
            });
        }

        let path = self.wav_dir.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(path),
            Ok(_) => Err(StorageError::NotFound {
                filename: filename.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                filename: filename.to_string(),
            }),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    /// Contents of an existing WAV file.
    pub async fn read_wav(&self, filename: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(filename).await?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| StorageError::Io { path, source })
    }

    /// Delete a raw upload. Failures are logged, never surfaced.
    pub async fn discard_raw(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove raw upload");
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Extension of the client's filename, if it looks like one.
fn raw_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or_else(|| RAW_FALLBACK_EXTENSION.to_string())
}

/// A bare `*.wav` name: no separators, no parent references, not hidden.
fn is_plain_wav_name(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
        && filename.ends_with(".wav")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_filename_is_zero_padded() {
        assert_eq!(wav_filename_for(1), "00000001.wav");
        assert_eq!(wav_filename_for(123_456_789), "123456789.wav");
    }

    #[test]
    fn test_sequence_id_from_filename() {
        assert_eq!(sequence_id_from_filename("00000042.wav"), Some(42));
        assert_eq!(sequence_id_from_filename("7.wav"), Some(7));
        assert_eq!(sequence_id_from_filename("answer.wav"), None);
        assert_eq!(sequence_id_from_filename("00000042.mp3"), None);
        assert_eq!(sequence_id_from_filename(".wav"), None);
    }

    #[test]
    fn test_raw_extension() {
        assert_eq!(raw_extension("recording.WEBM"), "webm");
        assert_eq!(raw_extension("clip.m4a"), "m4a");
        assert_eq!(raw_extension("blob"), "bin");
        assert_eq!(raw_extension("weird.e x"), "bin");
        assert_eq!(raw_extension(""), "bin");
    }

    #[test]
    fn test_plain_wav_names() {
        assert!(is_plain_wav_name("00000001.wav"));
        assert!(!is_plain_wav_name("../00000001.wav"));
        assert!(!is_plain_wav_name("sub/00000001.wav"));
        assert!(!is_plain_wav_name("..\\x.wav"));
        assert!(!is_plain_wav_name(".00000001.wav.part"));
        assert!(!is_plain_wav_name("00000001.mp3"));
        assert!(!is_plain_wav_name(""));
    }
}
