//! Shared test harness for rc-trim integration tests.
//!
//! Provides [`TestFs`], a [`FileSystem`] over the real disk that logs every
//! call and can inject faults or hold the first read until released, plus
//! recording collaborators.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rc_core::{Error, ProjectKey, Result};
use rc_media::fixture::{write_fixture, FixtureSpec};
use rc_media::fs::{ReadSeek, WriteSeek};
use rc_media::{FileSystem, StdFileSystem};
use rc_trim::{PlaybackSurface, ProjectStore};

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// One logged filesystem call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    OpenRead(PathBuf),
    Create(PathBuf),
    FileSize(PathBuf),
    Exists(PathBuf),
    Rename(PathBuf, PathBuf),
    RemoveFile(PathBuf),
    Canonicalize(PathBuf),
}

type FaultRule = Box<dyn Fn(usize, &FsOp) -> bool + Send + Sync>;

pub struct TestFs {
    inner: StdFileSystem,
    log: Mutex<Vec<FsOp>>,
    fault: FaultRule,
    gate: Mutex<Option<Receiver<()>>>,
}

impl TestFs {
    /// Pass-through filesystem that only logs.
    pub fn spy() -> Arc<Self> {
        Self::failing(|_, _| false)
    }

    /// Fail every call (except `exists`) for which `rule(call_index, op)`
    /// returns true.
    pub fn failing(rule: impl Fn(usize, &FsOp) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: StdFileSystem,
            log: Mutex::new(Vec::new()),
            fault: Box::new(rule),
            gate: Mutex::new(None),
        })
    }

    /// Filesystem whose first `open_read` blocks until the sender fires.
    pub fn gated() -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = channel();
        let fs = Self::spy();
        *fs.gate.lock() = Some(rx);
        (fs, tx)
    }

    pub fn ops(&self) -> Vec<FsOp> {
        self.log.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&FsOp) -> bool) -> usize {
        self.log.lock().iter().filter(|op| pred(op)).count()
    }

    fn record(&self, op: FsOp) -> io::Result<()> {
        let index = {
            let mut log = self.log.lock();
            log.push(op.clone());
            log.len() - 1
        };
        if (self.fault)(index, &op) {
            return Err(io::Error::other(format!("injected fault at call {index}: {op:?}")));
        }
        Ok(())
    }
}

impl FileSystem for TestFs {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        self.record(FsOp::OpenRead(path.to_path_buf()))?;
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        self.inner.open_read(path)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WriteSeek>> {
        self.record(FsOp::Create(path.to_path_buf()))?;
        self.inner.create(path)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.record(FsOp::FileSize(path.to_path_buf()))?;
        self.inner.file_size(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.log.lock().push(FsOp::Exists(path.to_path_buf()));
        self.inner.exists(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record(FsOp::Rename(from.to_path_buf(), to.to_path_buf()))?;
        self.inner.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.record(FsOp::RemoveFile(path.to_path_buf()))?;
        self.inner.remove_file(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.record(FsOp::Canonicalize(path.to_path_buf()))?;
        self.inner.canonicalize(path)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Write a fixture called `name` into `dir` and return its path and bytes.
pub fn source_file(dir: &Path, name: &str, spec: &FixtureSpec) -> (PathBuf, Vec<u8>) {
    let path = dir.join(name);
    write_fixture(&path, spec).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    (path, bytes)
}

/// File names in `dir`, sorted.
pub fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPlayback {
    pub calls: Mutex<Vec<(&'static str, PathBuf)>>,
}

impl PlaybackSurface for RecordingPlayback {
    fn pause(&self, path: &Path) {
        self.calls.lock().push(("pause", path.to_path_buf()));
    }

    fn reload(&self, path: &Path) {
        self.calls.lock().push(("reload", path.to_path_buf()));
    }
}

#[derive(Default)]
pub struct RecordingStore {
    pub calls: Mutex<Vec<(Option<ProjectKey>, PathBuf, u64)>>,
    pub fail: bool,
}

#[async_trait]
impl ProjectStore for RecordingStore {
    async fn persist_trim(
        &self,
        project: Option<&ProjectKey>,
        path: &Path,
        duration_us: u64,
    ) -> Result<()> {
        self.calls
            .lock()
            .push((project.cloned(), path.to_path_buf(), duration_us));
        if self.fail {
            return Err(Error::collaborator("project_store", "service unavailable"));
        }
        Ok(())
    }
}
