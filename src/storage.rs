use crate::model::Task;
use anyhow::Context;
use directories::ProjectDirs;
use log::{debug, error, warn};
#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use tempfile::NamedTempFile;

/// Key under which the whole task collection is stored.
pub const TASKS_KEY: &str = "tasks";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage io: {0}")]
    Io(#[from] io::Error),
    #[error("serializing tasks: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("store writer is closed")]
    WriterClosed,
}

/// A durable string key-value store. `set` must replace the value atomically.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating {:?}", dir))?;
        Ok(FileBackend { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        atomic_write(&path, value.as_bytes())?;
        Ok(())
    }
}

/// Writes through a temp file in the same directory, syncs, then renames over `path`.
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-process backend; nothing survives the process.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let backend = Self::new();
        backend.insert(key, value);
        backend
    }

    fn insert(&self, key: &str, value: &str) {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.insert(key, value);
        Ok(())
    }
}

/// The task collection as one JSON array under [`TASKS_KEY`].
#[derive(Clone)]
pub struct TaskStore {
    backend: Arc<dyn KvBackend>,
}

impl TaskStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        TaskStore { backend }
    }

    /// Never fails: an unreadable or non-JSON blob yields no tasks, and a
    /// malformed record is skipped. Both are logged.
    pub fn load(&self) -> Vec<Task> {
        let raw = match self.backend.get(TASKS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("event=tasks_load status=empty key={}", TASKS_KEY);
                return Vec::new();
            }
            Err(err) => {
                error!("event=tasks_load status=error key={} error={}", TASKS_KEY, err);
                return Vec::new();
            }
        };
        if raw.trim().is_empty() {
            return Vec::new();
        }
        let records = match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!("event=tasks_load status=corrupt key={} error={}", TASKS_KEY, err);
                return Vec::new();
            }
        };
        let tasks: Vec<Task> = records
            .into_iter()
            .enumerate()
            .filter_map(|(idx, record)| match serde_json::from_value::<Task>(record) {
                Ok(task) => Some(task),
                Err(err) => {
                    warn!(
                        "event=tasks_load status=skipped_record index={} error={}",
                        idx, err
                    );
                    None
                }
            })
            .collect();
        debug!("event=tasks_load status=ok count={}", tasks.len());
        tasks
    }

    /// Rewrites the whole collection. Failures are logged before being returned.
    pub fn save(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let result = serde_json::to_string(tasks)
            .map_err(StoreError::from)
            .and_then(|blob| self.backend.set(TASKS_KEY, &blob));
        match &result {
            Ok(()) => debug!("event=tasks_save status=ok count={}", tasks.len()),
            Err(err) => error!(
                "event=tasks_save status=error count={} error={}",
                tasks.len(),
                err
            ),
        }
        result
    }
}

enum Job {
    Save {
        tasks: Vec<Task>,
        done: mpsc::Sender<Result<(), StoreError>>,
    },
    Flush(mpsc::Sender<()>),
}

/// Completion signal for one background save. Dropping it is fine.
#[must_use = "drop the ticket explicitly if the save outcome does not matter"]
#[derive(Debug)]
pub struct SaveTicket {
    rx: mpsc::Receiver<Result<(), StoreError>>,
}

impl SaveTicket {
    /// Blocks until the save this ticket belongs to has finished.
    pub fn wait(self) -> Result<(), StoreError> {
        self.rx.recv().unwrap_or(Err(StoreError::WriterClosed))
    }

    /// Non-blocking check; yields the outcome once, when it is ready.
    pub fn poll(&self) -> Option<Result<(), StoreError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(StoreError::WriterClosed)),
        }
    }

    fn failed(err: StoreError) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(Err(err));
        SaveTicket { rx }
    }
}

/// Background thread that performs saves in the order they were submitted.
///
/// Dropping the writer drains the queue before returning.
pub struct StoreWriter {
    tx: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWriter {
    pub fn spawn(store: TaskStore) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("dayplan-store".into())
            .spawn(move || {
                for job in rx {
                    match job {
                        Job::Save { tasks, done } => {
                            let _ = done.send(store.save(&tasks));
                        }
                        Job::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })
            .context("starting store writer thread")?;
        Ok(StoreWriter {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queues a full snapshot for saving and returns without waiting.
    pub fn submit(&self, tasks: Vec<Task>) -> SaveTicket {
        let (done, rx) = mpsc::channel();
        let job = Job::Save { tasks, done };
        match &self.tx {
            Some(tx) if tx.send(job).is_ok() => SaveTicket { rx },
            _ => {
                error!("event=tasks_save status=error error=writer_closed");
                SaveTicket::failed(StoreError::WriterClosed)
            }
        }
    }

    /// Waits until every save submitted so far has finished.
    pub fn flush(&self) -> Result<(), StoreError> {
        let (done, rx) = mpsc::channel();
        let tx = self.tx.as_ref().ok_or(StoreError::WriterClosed)?;
        tx.send(Job::Flush(done))
            .map_err(|_| StoreError::WriterClosed)?;
        rx.recv().map_err(|_| StoreError::WriterClosed)
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("event=store_writer status=panicked");
            }
        }
    }
}

pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "dayplan").context("locating data directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn task(id: &str, date: &str, time: Option<&str>, is_done: bool) -> Task {
        Task {
            id: id.into(),
            title: format!("title {id}"),
            description: format!("description {id}"),
            date: date.into(),
            time: time.map(String::from),
            is_done,
        }
    }

    fn sample() -> Vec<Task> {
        vec![
            task("a", "2025-03-05T00:00:00Z", Some("09:00"), false),
            task("b", "2025-03-05T14:30:00.000Z", None, true),
        ]
    }

    #[test]
    fn load_without_stored_value_is_empty() {
        let store = TaskStore::new(Arc::new(MemoryBackend::new()));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_blob_loads_as_empty() {
        let store = TaskStore::new(Arc::new(MemoryBackend::with_value(TASKS_KEY, "{not json")));
        assert!(store.load().is_empty());
        let store = TaskStore::new(Arc::new(MemoryBackend::with_value(TASKS_KEY, "")));
        assert!(store.load().is_empty());
    }

    #[test]
    fn malformed_record_is_skipped_and_the_rest_survive() {
        let raw = r#"[
            {"id":"a","title":"t","description":"d","date":"2025-03-05T00:00:00Z","isDone":false},
            {"id":"b","title":"t","description":"d","date":"2025-03-06T00:00:00Z","isDone":true},
            {"id":"c","title":"t","date":"2025-03-07T00:00:00Z","isDone":false}
        ]"#;
        let backend = Arc::new(MemoryBackend::with_value(TASKS_KEY, raw));
        let store = TaskStore::new(backend.clone());
        let ids: Vec<String> = store.load().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let mut tasks = store.load();
        tasks.push(task("n", "2025-03-08T00:00:00Z", None, false));
        store.save(&tasks).unwrap();
        let ids: Vec<String> = store.load().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["a", "b", "n"]);
    }

    #[test]
    fn non_array_json_loads_as_empty() {
        let store = TaskStore::new(Arc::new(MemoryBackend::with_value(TASKS_KEY, r#"{"id":"a"}"#)));
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_writes_one_blob_under_the_fixed_key() {
        let backend = Arc::new(MemoryBackend::new());
        let store = TaskStore::new(backend.clone());
        store.save(&sample()).unwrap();
        let raw = backend.get(TASKS_KEY).unwrap().unwrap();
        let parsed: Vec<Task> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn file_backend_round_trip_preserves_tasks() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path().join("data")).unwrap();
        let store = TaskStore::new(Arc::new(backend.clone()));
        store.save(&sample()).unwrap();

        let loaded = store.load();
        store.save(&loaded).unwrap();
        assert_eq!(store.load(), sample());
        assert!(backend.dir().join("tasks.json").exists());
    }

    #[test]
    fn file_backend_reads_foreign_blob() {
        let dir = TempDir::new().unwrap();
        let raw = r#"[{"id":"x","title":"t","description":"d","date":"2025-03-06T08:00:00.000Z","isDone":false}]"#;
        fs::write(dir.path().join("tasks.json"), raw).unwrap();
        let store = TaskStore::new(Arc::new(FileBackend::open(dir.path()).unwrap()));
        let tasks = store.load();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].date, "2025-03-06T08:00:00.000Z");
    }

    #[test]
    fn file_backend_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(matches!(
            backend.set("../escape", "x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(backend.get(""), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn unreadable_store_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("tasks.json")).unwrap();
        let store = TaskStore::new(Arc::new(FileBackend::open(dir.path()).unwrap()));
        assert!(store.load().is_empty());
        assert!(store.save(&sample()).is_err());
    }

    #[test]
    fn writer_applies_saves_in_submission_order() {
        let backend = Arc::new(MemoryBackend::new());
        let writer = StoreWriter::spawn(TaskStore::new(backend.clone())).unwrap();
        let all = sample();
        drop(writer.submit(all.clone()));
        drop(writer.submit(all[..1].to_vec()));
        let last = writer.submit(Vec::new());
        last.wait().unwrap();
        assert_eq!(backend.get(TASKS_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn dropping_writer_drains_pending_saves() {
        let backend = Arc::new(MemoryBackend::new());
        let writer = StoreWriter::spawn(TaskStore::new(backend.clone())).unwrap();
        drop(writer.submit(sample()));
        drop(writer);
        let store = TaskStore::new(backend);
        assert_eq!(store.load(), sample());
    }

    #[test]
    fn polled_ticket_resolves_after_flush() {
        let writer = StoreWriter::spawn(TaskStore::new(Arc::new(MemoryBackend::new()))).unwrap();
        let ticket = writer.submit(sample());
        writer.flush().unwrap();
        assert!(matches!(ticket.poll(), Some(Ok(()))));
    }

    #[test]
    fn ticket_reports_write_failure() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("tasks.json")).unwrap();
        let store = TaskStore::new(Arc::new(FileBackend::open(dir.path()).unwrap()));
        let writer = StoreWriter::spawn(store).unwrap();
        assert!(writer.submit(sample()).wait().is_err());
        writer.flush().unwrap();
    }

    mod proptests {
        use super::*;
        use crate::model::strategies;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn reloading_and_resaving_keeps_the_blob(tasks in strategies::tasks(30)) {
                let backend = Arc::new(MemoryBackend::new());
                let store = TaskStore::new(backend.clone());
                store.save(&tasks).unwrap();
                let first = backend.get(TASKS_KEY).unwrap();

                let loaded = store.load();
                prop_assert_eq!(&loaded, &tasks);
                store.save(&loaded).unwrap();
                prop_assert_eq!(backend.get(TASKS_KEY).unwrap(), first);
            }

            #[test]
            fn toggling_twice_through_the_writer_restores_the_blob(
                tasks in strategies::tasks(20),
                pick in any::<prop::sample::Index>(),
            ) {
                prop_assume!(!tasks.is_empty());
                let backend = Arc::new(MemoryBackend::new());
                let store = TaskStore::new(backend.clone());
                store.save(&tasks).unwrap();
                let original = backend.get(TASKS_KEY).unwrap();

                let mut repo = crate::repository::TaskRepository::open(store).unwrap();
                let id = tasks[pick.index(tasks.len())].id.clone();
                prop_assert!(repo.toggle_done(&id).wait().unwrap());
                prop_assert!(repo.toggle_done(&id).wait().unwrap());
                prop_assert_eq!(repo.tasks(), tasks.as_slice());
                prop_assert_eq!(backend.get(TASKS_KEY).unwrap(), original);
            }
        }
    }
}
