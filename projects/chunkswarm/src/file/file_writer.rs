use crate::log;
use errors::{AnyResult, Context};
use std::{
    collections::BTreeSet,
    io::SeekFrom,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncSeekExt, AsyncWriteExt},
    sync::{mpsc, watch},
    task::JoinHandle,
};

// Chunks a sink is done with, either persisted or lost.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteProgress {
    pub written: BTreeSet<u32>,
    pub failed: BTreeSet<u32>,
}

impl WriteProgress {
    pub fn is_written(&self, index: u32) -> bool {
        self.written.contains(&index)
    }

    pub fn settled(&self) -> usize {
        self.written.len() + self.failed.len()
    }
}

// Destination of verified chunks. Enqueuing never blocks, the sink reports
// each chunk once it reached the disk (or failed to).
pub trait ChunkSink: Send + Sync {
    fn enqueue_chunk(&self, index: u32, offset: u64, content: Vec<u8>);
    fn writes(&self) -> watch::Receiver<WriteProgress>;
}

#[derive(Debug)]
struct PendingWrite {
    index: u32,
    offset: u64,
    content: Vec<u8>,
}

// Write chunks into a preallocated file, in the order they were enqueued.
pub struct FileWriter {
    path: PathBuf,
    queue: mpsc::UnboundedSender<PendingWrite>,
    progress: Arc<watch::Sender<WriteProgress>>,
    task: JoinHandle<()>,
}

impl FileWriter {
    // Create (or truncate) the file, allocate its final size on the disk and
    // start draining the write queue.
    pub async fn create<P: AsRef<Path>>(path: P, size: u64) -> AnyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .truncate(true)
            .create(true)
            .write(true)
            .open(&path)
            .await
            .with_context(|| format!("can't create {}", path.display()))?;
        file.set_len(size)
            .await
            .with_context(|| format!("can't allocate {} bytes for {}", size, path.display()))?;

        let (queue, pending) = mpsc::unbounded_channel();
        let progress = Arc::new(watch::channel(WriteProgress::default()).0);
        let task = tokio::spawn(drain_queue(file, path.clone(), pending, Arc::clone(&progress)));

        Ok(Self {
            path,
            queue,
            progress,
            task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Stop accepting chunks, and wait for every queued one to be on the disk.
    pub async fn finish(self) -> AnyResult<()> {
        drop(self.queue);
        self.task.await?;
        Ok(())
    }
}

impl ChunkSink for FileWriter {
    fn enqueue_chunk(&self, index: u32, offset: u64, content: Vec<u8>) {
        // A lost chunk can be written again.
        self.progress.send_modify(|progress| {
            progress.failed.remove(&index);
        });
        let write = PendingWrite {
            index,
            offset,
            content,
        };
        if self.queue.send(write).is_err() {
            log!(error, "writer of {} is closed, chunk {} lost", self.path.display(), index);
            self.progress.send_modify(|progress| {
                progress.failed.insert(index);
            });
        }
    }

    fn writes(&self) -> watch::Receiver<WriteProgress> {
        self.progress.subscribe()
    }
}

async fn drain_queue(
    mut file: File,
    path: PathBuf,
    mut pending: mpsc::UnboundedReceiver<PendingWrite>,
    progress: Arc<watch::Sender<WriteProgress>>,
) {
    while let Some(write) = pending.recv().await {
        match write_at(&mut file, &write).await {
            Ok(()) => progress.send_modify(|progress| {
                progress.written.insert(write.index);
            }),
            Err(err) => {
                log!(
                    error,
                    "can't write chunk {} of {}: {:#}",
                    write.index,
                    path.display(),
                    err
                );
                progress.send_modify(|progress| {
                    progress.failed.insert(write.index);
                });
            }
        }
    }
}

async fn write_at(file: &mut File, write: &PendingWrite) -> AnyResult<()> {
    file.seek(SeekFrom::Start(write.offset)).await?;
    file.write_all(&write.content).await?;
    file.flush().await?;
    Ok(())
}
