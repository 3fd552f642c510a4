use crate::domain::assignment::Assignment;
use crate::domain::dispatch::DispatchReport;
use crate::domain::participant::{Participant, RosterSnapshot};
use crate::domain::ports::{AssignmentStore, RosterStore};
use crate::error::{Result, SantaError};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

/// File holding the participant roster.
pub const ROSTER_FILE: &str = "roster.json";
/// File holding the current assignment.
pub const ASSIGNMENT_FILE: &str = "assignment.json";
/// File holding the latest dispatch report.
pub const REPORT_FILE: &str = "report.json";

/// A persistent store keeping roster, assignment and report as JSON documents
/// in one directory.
///
/// Every write goes to a temporary file in the same directory which is then
/// renamed over the target, so a reader never observes a half-written
/// document. Writers are serialized through a shared lock; `Clone` shares it.
#[derive(Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Opens the store rooted at `dir`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        let bytes = tokio::task::spawn_blocking(move || match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        })
        .await
        .map_err(io::Error::other)??;

        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        let dir = self.dir.clone();
        let target = self.dir.join(name);
        tokio::task::spawn_blocking(move || write_atomic(&dir, &target, &bytes))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        tokio::task::spawn_blocking(move || match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        })
        .await
        .map_err(io::Error::other)??;
        Ok(())
    }

    async fn roster(&self) -> Result<RosterSnapshot> {
        Ok(self.read_json(ROSTER_FILE).await?.unwrap_or_default())
    }
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl RosterStore for JsonFileStore {
    async fn create(&self, participant: Participant) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut participants = self.roster().await?.into_participants();
        if let Some(existing) = participants.iter().find(|p| p.conflicts_with(&participant)) {
            return Err(SantaError::DuplicateParticipant(existing.id.clone()));
        }
        participants.push(participant);
        self.write_json(ROSTER_FILE, &RosterSnapshot::new(participants)?)
            .await
    }

    async fn list(&self) -> Result<RosterSnapshot> {
        self.roster().await
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.roster().await?.len())
    }

    async fn delete_all(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let removed = self.roster().await?.len();
        self.remove(ROSTER_FILE).await?;
        Ok(removed)
    }
}

#[async_trait]
impl AssignmentStore for JsonFileStore {
    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(ASSIGNMENT_FILE, assignment).await
    }

    async fn load_assignment(&self) -> Result<Option<Assignment>> {
        self.read_json(ASSIGNMENT_FILE).await
    }

    async fn save_report(&self, report: &DispatchReport) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(REPORT_FILE, report).await
    }

    async fn load_report(&self) -> Result<Option<DispatchReport>> {
        self.read_json(REPORT_FILE).await
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.remove(REPORT_FILE).await?;
        self.remove(ASSIGNMENT_FILE).await
    }
}
