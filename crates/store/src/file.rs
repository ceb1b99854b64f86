//! File-backed record store.
//!
//! Layout: `<root>/<table>/<escaped id>.json`. Every write goes to a
//! temporary file in the table directory and is renamed into place, so a
//! reader never observes a half-written record.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use relay::{
    InsertOutcome, MessageId, NewRecord, RecordReader, RecordStore, RecordUpdate, StoreError,
    StoredRecord, TableName,
};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Record store keeping one JSON document per record.
#[derive(Debug)]
pub struct FileRecordStore {
    dir: PathBuf,
    table: TableName,
    // Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    /// Opens (creating if needed) the directory for `table` under `root`.
    pub async fn open(root: impl AsRef<Path>, table: TableName) -> Result<Self, StoreError> {
        let dir = root.as_ref().join(escape(table.as_str()));
        fs::create_dir_all(&dir).await.map_err(|e| unavailable(&dir, e))?;
        let swept = sweep_temp_files(&dir).await?;
        debug!(dir = %dir.display(), swept, "Opened file record store");
        Ok(Self {
            dir,
            table,
            write_lock: Mutex::new(()),
        })
    }

    /// The table directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &MessageId) -> PathBuf {
        self.dir.join(format!("{}.json", escape(id.as_str())))
    }

    async fn read(&self, id: &MessageId) -> Result<Option<StoredRecord>, StoreError> {
        let path = self.path_for(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization {
                message: format!("{}: {e}", path.display()),
            })
    }

    async fn write(&self, record: &StoredRecord) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialization {
            message: e.to_string(),
        })?;
        let path = self.path_for(&record.id);
        let temp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        fs::write(&temp, &json).await.map_err(|e| unavailable(&temp, e))?;
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(unavailable(&path, e));
        }
        Ok(())
    }
}

/// Removes temporary files left by writes that never reached their rename.
/// Escaped record names never start with `.`, so only temporaries match.
async fn sweep_temp_files(dir: &Path) -> Result<usize, StoreError> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| unavailable(dir, e))?;
    let mut swept = 0;
    while let Some(entry) = entries.next_entry().await.map_err(|e| unavailable(dir, e))? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with('.') && name.ends_with(".tmp")) {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => swept += 1,
            Err(e) => warn!(
                file = %entry.path().display(),
                error = %e,
                "Could not remove temporary file"
            ),
        }
    }
    Ok(swept)
}

fn unavailable(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Unavailable {
        message: format!("{}: {e}", path.display()),
    }
}

/// Maps an identifier onto a portable file name: ASCII alphanumerics, `-`
/// and `.` pass through, everything else (including `_`) becomes `_xx`.
fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => escaped.push(byte as char),
            b'.' if !escaped.is_empty() => escaped.push('.'),
            _ => escaped.push_str(&format!("_{byte:02x}")),
        }
    }
    escaped
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<InsertOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.read(&record.id).await?.is_some() {
            debug!(table = %self.table, id = %record.id, "Record already present, insert skipped");
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.write(&StoredRecord::from_new(record)).await?;
        Ok(InsertOutcome::Created)
    }

    async fn update(&self, id: &MessageId, update: RecordUpdate) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let record = match self.read(id).await? {
            Some(mut record) => {
                record.apply(&update);
                record
            }
            None => StoredRecord::from_update(id.clone(), &update),
        };
        self.write(&record).await
    }
}

#[async_trait]
impl RecordReader for FileRecordStore {
    async fn get(&self, id: &MessageId) -> Result<Option<StoredRecord>, StoreError> {
        self.read(id).await
    }
}
