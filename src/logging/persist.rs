use std::{
    fs,
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use log::{debug, error};
use parking_lot::Mutex;
use tokio::{
    runtime::{self, Runtime},
    task::JoinHandle,
};

use crate::error::{NeuralTrackError, Result};

/// Completion signal of a single background persist.
///
/// It can be awaited from any executor or waited on synchronously, dropping
/// it detaches the persist which still runs to completion.
#[derive(Debug)]
pub struct PersistHandle {
    task: JoinHandle<Result<()>>,
    runtime: runtime::Handle,
}

impl PersistHandle {
    /// Blocks the current thread until the persist finishes.
    ///
    /// # Returns
    /// The outcome of the write.
    ///
    /// # Panics
    /// If called from within an asynchronous execution context, await the handle instead.
    pub fn wait(self) -> Result<()> {
        let runtime = self.runtime.clone();
        runtime.block_on(self)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for PersistHandle {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().task).poll(cx).map(|joined| {
            joined.unwrap_or_else(|e| Err(NeuralTrackError::PersistTask(e.to_string())))
        })
    }
}

/// Writes full log snapshots to a single file off the caller's thread.
///
/// Every snapshot gets an increasing generation number. The write critical
/// section is serialized by a lock that remembers the last written
/// generation, so a persist that loses the race against a newer one is
/// skipped instead of rolling the file back.
#[derive(Debug)]
pub(crate) struct BackgroundWriter {
    path: PathBuf,
    runtime: Option<Runtime>,
    next_generation: u64,
    written: Arc<Mutex<u64>>,
}

impl BackgroundWriter {
    /// Creates a new `BackgroundWriter` for the file at `path`.
    ///
    /// # Errors
    /// Returns an io error if the runtime backing the writes can't be built.
    pub(crate) fn new(path: PathBuf) -> Result<Self> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("neuraltrack-persist")
            .build()?;

        Ok(Self {
            path,
            runtime: Some(runtime),
            next_generation: 1,
            written: Arc::new(Mutex::new(0)),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Dispatches a write of `snapshot` without waiting for it.
    ///
    /// # Arguments
    /// * `snapshot` - The encoded contents of the whole log.
    ///
    /// # Returns
    /// The completion signal of the dispatched write.
    pub(crate) fn dispatch(&mut self, snapshot: Vec<u8>) -> PersistHandle {
        let generation = self.bump_generation();
        let path = self.path.clone();
        let written = Arc::clone(&self.written);

        let runtime = self.runtime();
        let task = runtime.spawn_blocking(move || {
            let ret = write_generation(&path, &snapshot, generation, &written);
            if let Err(e) = &ret {
                error!("failed to persist '{}': {e}", path.display());
            }
            ret
        });

        PersistHandle {
            task,
            runtime: runtime.handle().clone(),
        }
    }

    /// Writes `snapshot` on the caller's thread, superseding every dispatched write.
    ///
    /// # Errors
    /// Returns an io error if the file can't be written.
    pub(crate) fn write_now(&mut self, snapshot: &[u8]) -> Result<()> {
        let generation = self.bump_generation();
        write_generation(&self.path, snapshot, generation, &self.written)
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn runtime(&self) -> &Runtime {
        self.runtime.as_ref().expect("runtime is only taken on drop")
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        // A runtime can't be dropped while blocking inside another one.
        if runtime::Handle::try_current().is_ok() {
            debug!("detaching pending writes of '{}'", self.path.display());
            runtime.shutdown_background();
        } else {
            drop(runtime);
        }
    }
}

fn write_generation(path: &Path, snapshot: &[u8], generation: u64, written: &Mutex<u64>) -> Result<()> {
    let mut last = written.lock();
    if *last > generation {
        debug!("skipping stale snapshot {generation}, {} already written", *last);
        return Ok(());
    }

    fs::write(path, snapshot)?;
    *last = generation;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_generation_does_not_overwrite_newer_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let written = Mutex::new(0);

        write_generation(&path, b"new", 2, &written).unwrap();
        write_generation(&path, b"old", 1, &written).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(*written.lock(), 2);
    }

    #[test]
    fn dispatched_write_lands_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = BackgroundWriter::new(path.clone()).unwrap();

        writer.dispatch(b"{}".to_vec()).wait().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn write_now_supersedes_pending_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = BackgroundWriter::new(path.clone()).unwrap();

        let pending = writer.dispatch(b"first".to_vec());
        writer.write_now(b"final").unwrap();
        pending.wait().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"final");
    }

    #[test]
    fn failed_write_is_reported_through_the_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("log.json");
        let mut writer = BackgroundWriter::new(path).unwrap();

        let err = writer.dispatch(b"{}".to_vec()).wait().unwrap_err();
        assert!(matches!(err, NeuralTrackError::Io(_)));
    }
}
