// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File-system print job spool.
//
// Layout:
//
// ```text
// <queue_folder>/
//   PDF/                      queue "PDF" (exists iff the folder exists)
//     1406576720765-1/        job folder, named by job id
//       cfA000localhost       control file
//       dfA000localhost       data file
//   RAW/
// ```
//
// Queues are never created by the server. An administrator creates the
// folders; the spool only adds and removes job folders inside them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use lpd_core::config::ServerConfig;
use lpd_core::error::{LpdError, Result};
use lpd_core::types::{Ack, CONTROL_FILE_PREFIX, DATA_FILE_PREFIX, JobId};

use crate::hook::{JobHook, ScriptHook};
use crate::queue::{PayloadSource, PrintJobQueue, QueueBackend};

/// The queue named in a receive-job command does not exist.
pub const ERR_QUEUE_DOES_NOT_EXIST: Ack = Ack(1);
/// A control file name does not start with `cfA`.
pub const ERR_WRONG_CONTROL_FILE_NAME: Ack = Ack(2);
/// A data file name does not start with `dfA`.
pub const ERR_WRONG_DATA_FILE_NAME: Ack = Ack(3);
/// The file could not be stored (bad name, duplicate, short read, disk).
pub const ERR_RECEIVE_FAILED: Ack = Ack(4);

const MAX_BUFFER_SIZE: usize = 4096;

/// Shared handle to a spool root. Cheap to clone.
#[derive(Clone)]
pub struct FileSpool {
    inner: Arc<SpoolInner>,
}

struct SpoolInner {
    queue_folder: PathBuf,
    hook: Option<Arc<dyn JobHook>>,
    next_job: AtomicU64,
}

impl FileSpool {
    pub fn new(queue_folder: impl Into<PathBuf>, hook: Option<Arc<dyn JobHook>>) -> Self {
        Self {
            inner: Arc::new(SpoolInner {
                queue_folder: queue_folder.into(),
                hook,
                next_job: AtomicU64::new(0),
            }),
        }
    }

    /// Spool at `config.queue_folder`, with a [`ScriptHook`] when a script is
    /// configured.
    pub fn from_config(config: &ServerConfig) -> Self {
        let hook = config
            .script
            .clone()
            .map(|script| Arc::new(ScriptHook::new(script)) as Arc<dyn JobHook>);
        Self::new(config.queue_folder.clone(), hook)
    }

    pub fn queue_folder(&self) -> &Path {
        &self.inner.queue_folder
    }

    fn next_job_id(&self) -> JobId {
        JobId::generate(self.inner.next_job.fetch_add(1, Ordering::Relaxed))
    }

    /// Folder of `queue`, if it is a plain name and the folder exists.
    async fn queue_path(&self, queue: &str) -> Option<PathBuf> {
        if queue.is_empty() || queue.contains("..") || queue.contains(['/', '\\']) {
            return None;
        }
        let path = self.inner.queue_folder.join(queue);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Some(path),
            _ => None,
        }
    }

    /// Job folders of a queue, sorted by name.
    async fn job_folders(&self, queue_path: &Path) -> Result<Vec<PathBuf>> {
        let mut folders = Vec::new();
        let mut entries = tokio::fs::read_dir(queue_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                folders.push(entry.path());
            }
        }
        folders.sort();
        Ok(folders)
    }

    async fn run_hook(&self, queue: &str, job_folder: &Path) -> Result<()> {
        let Some(hook) = &self.inner.hook else {
            debug!(queue, job = %job_folder.display(), "no job hook configured");
            return Ok(());
        };
        let job_path = tokio::fs::canonicalize(job_folder).await?;
        let output = hook.run(queue, &job_path).await?;
        info!(queue, job = %job_path.display(), "job hook finished");
        if !output.is_empty() {
            debug!(output = %output.trim_end(), "job hook output");
        }
        Ok(())
    }
}

impl QueueBackend for FileSpool {
    type Session = SpoolSession;

    fn session(&self) -> SpoolSession {
        SpoolSession {
            spool: self.clone(),
            job: None,
        }
    }
}

/// Job being received on one connection.
struct ActiveJob {
    queue: String,
    id: JobId,
    folder: PathBuf,
}

/// Per-connection view of a [`FileSpool`].
pub struct SpoolSession {
    spool: FileSpool,
    job: Option<ActiveJob>,
}

impl SpoolSession {
    async fn receive_file(
        &mut self,
        prefix: &str,
        wrong_name: Ack,
        count: u64,
        name: &str,
        source: PayloadSource<'_>,
    ) -> Result<Ack> {
        if !name.starts_with(prefix) {
            warn!(name, expected = prefix, "unexpected file name prefix");
            drain(source, count).await?;
            return Ok(wrong_name);
        }
        let Some(job) = &self.job else {
            warn!(name, "file received without an open print job");
            drain(source, count).await?;
            return Ok(ERR_QUEUE_DOES_NOT_EXIST);
        };

        match store_file(&job.folder, count, name, source).await {
            Ok(digest) => {
                info!(queue = %job.queue, job = %job.id, file = name, bytes = count, sha256 = %digest, "file stored");
                Ok(Ack::SUCCESS)
            }
            Err(err) => {
                warn!(queue = %job.queue, job = %job.id, file = name, error = %err, "file not stored");
                if matches!(err, LpdError::ShortTransfer { .. }) {
                    remove_folder(&job.folder).await?;
                }
                Ok(ERR_RECEIVE_FAILED)
            }
        }
    }
}

#[async_trait]
impl PrintJobQueue for SpoolSession {
    async fn print_any_waiting_jobs(&mut self, queue: &str) -> Result<()> {
        let Some(queue_path) = self.spool.queue_path(queue).await else {
            debug!(queue, "print request for unknown queue");
            return Ok(());
        };
        for folder in self.spool.job_folders(&queue_path).await? {
            self.spool.run_hook(queue, &folder).await?;
        }
        Ok(())
    }

    async fn receive_a_printer_job(&mut self, queue: &str) -> Result<Ack> {
        let Some(queue_path) = self.spool.queue_path(queue).await else {
            warn!(queue, "receive job for unknown queue");
            self.job = None;
            return Ok(ERR_QUEUE_DOES_NOT_EXIST);
        };
        let id = self.spool.next_job_id();
        info!(queue, job = %id, "receiving print job");
        self.job = Some(ActiveJob {
            queue: queue.to_string(),
            folder: queue_path.join(id.as_str()),
            id,
        });
        Ok(Ack::SUCCESS)
    }

    async fn send_queue_state_short(
        &mut self,
        queue: &str,
        jobs: Option<&[String]>,
    ) -> Result<String> {
        let Some(queue_path) = self.spool.queue_path(queue).await else {
            return Ok(missing_queue(queue));
        };
        let mut state = String::new();
        for folder in self.spool.job_folders(&queue_path).await? {
            let name = folder_name(&folder);
            if listed(jobs, &name) {
                state.push_str(&name);
                state.push('\n');
            }
        }
        Ok(state)
    }

    async fn send_queue_state_long(
        &mut self,
        queue: &str,
        jobs: Option<&[String]>,
    ) -> Result<String> {
        let Some(queue_path) = self.spool.queue_path(queue).await else {
            return Ok(missing_queue(queue));
        };
        let mut state = String::new();
        for folder in self.spool.job_folders(&queue_path).await? {
            let name = folder_name(&folder);
            if !listed(jobs, &name) {
                continue;
            }
            let modified = tokio::fs::metadata(&folder).await?.modified()?;
            let modified = chrono::DateTime::<chrono::Local>::from(modified);
            state.push_str(&format!("{name}\t{}\t", modified.format("%a %b %d %H:%M:%S %Y")));

            let mut files = Vec::new();
            let mut entries = tokio::fs::read_dir(&folder).await?;
            while let Some(entry) = entries.next_entry().await? {
                files.push((entry.file_name(), entry.metadata().await?.len()));
            }
            files.sort();
            for (file, len) in files {
                state.push_str(&format!("{} ({len} byte) ", file.to_string_lossy()));
            }
            state.push('\n');
        }
        Ok(state)
    }

    async fn remove_jobs(
        &mut self,
        queue: &str,
        agent: &str,
        jobs: Option<&[String]>,
    ) -> Result<()> {
        let (Some(queue_path), Some(jobs)) = (self.spool.queue_path(queue).await, jobs) else {
            return Ok(());
        };
        for folder in self.spool.job_folders(&queue_path).await? {
            let name = folder_name(&folder);
            if jobs.contains(&name) {
                remove_folder(&folder).await?;
                info!(queue, agent, job = %name, "job removed");
            }
        }
        Ok(())
    }

    async fn abort_job(&mut self) -> Result<()> {
        if let Some(job) = &self.job {
            remove_folder(&job.folder).await?;
            info!(queue = %job.queue, job = %job.id, "print job aborted");
        }
        Ok(())
    }

    async fn receive_control_file(
        &mut self,
        count: u64,
        name: &str,
        source: PayloadSource<'_>,
    ) -> Result<Ack> {
        self.receive_file(CONTROL_FILE_PREFIX, ERR_WRONG_CONTROL_FILE_NAME, count, name, source)
            .await
    }

    async fn receive_data_file(
        &mut self,
        count: u64,
        name: &str,
        source: PayloadSource<'_>,
    ) -> Result<Ack> {
        self.receive_file(DATA_FILE_PREFIX, ERR_WRONG_DATA_FILE_NAME, count, name, source)
            .await
    }

    async fn finished_receiving_a_printer_job(&mut self) -> Result<()> {
        let Some(job) = self.job.take() else {
            return Ok(());
        };
        match tokio::fs::metadata(&job.folder).await {
            Ok(meta) if meta.is_dir() => self.spool.run_hook(&job.queue, &job.folder).await,
            _ => {
                debug!(queue = %job.queue, job = %job.id, "no files received for job");
                Ok(())
            }
        }
    }
}

fn missing_queue(queue: &str) -> String {
    format!("Queue {queue} does not exist.")
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// An empty or absent list selects every job.
fn listed(jobs: Option<&[String]>, name: &str) -> bool {
    match jobs {
        Some(jobs) if !jobs.is_empty() => jobs.iter().any(|job| job == name),
        _ => true,
    }
}

fn check_file_name(name: &str) -> Result<()> {
    if name.contains("..") || name.contains([':', '?', '/', '\\']) {
        return Err(LpdError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// Store `count` bytes from `source` as `<job_folder>/<name>` and return the
/// hex SHA-256 digest. Whatever happens, `count` bytes are consumed unless
/// the source ends first.
async fn store_file(
    job_folder: &Path,
    count: u64,
    name: &str,
    source: PayloadSource<'_>,
) -> Result<String> {
    if let Err(err) = check_file_name(name) {
        drain(source, count).await?;
        return Err(err);
    }
    if let Err(err) = tokio::fs::create_dir_all(job_folder).await {
        drain(source, count).await?;
        return Err(err.into());
    }

    let path = job_folder.join(name);
    let open = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await;
    let mut file = match open {
        Ok(file) => file,
        Err(err) => {
            drain(source, count).await?;
            return Err(match err.kind() {
                std::io::ErrorKind::AlreadyExists => LpdError::FileExists(name.to_string()),
                _ => err.into(),
            });
        }
    };

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; MAX_BUFFER_SIZE];
    let mut received = 0u64;
    while received < count {
        let want = (count - received).min(MAX_BUFFER_SIZE as u64) as usize;
        let read = source.read(&mut buf[..want]).await?;
        if read == 0 {
            break;
        }
        received += read as u64;
        if let Err(err) = file.write_all(&buf[..read]).await {
            drain(source, count - received).await?;
            return Err(err.into());
        }
        hasher.update(&buf[..read]);
    }
    file.flush().await?;

    if received != count {
        return Err(LpdError::ShortTransfer {
            expected: count,
            actual: received,
        });
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Skip `count` bytes of a payload that will not be stored.
async fn drain(source: PayloadSource<'_>, count: u64) -> Result<()> {
    let skipped = tokio::io::copy(&mut source.take(count), &mut tokio::io::sink()).await?;
    debug!(skipped, "payload discarded");
    Ok(())
}

async fn remove_folder(folder: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(folder).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
