use crate::{
    file::{
        file_writer::ChunkSink,
        hashing::{chunk_count, chunk_offset, chunk_size, hash_chunk, Sha1Hash, MAX_FILE_SIZE},
    },
    log,
    network::bitfield::Bitfield,
};
use errors::{bail, ensure, AnyResult};
use std::{
    collections::{BTreeMap, BTreeSet},
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

// Most chunks asked to one peer in a single request, which keeps the request
// and the burst of answers it triggers small enough.
pub const MAX_CHUNKS_PER_REQUEST: usize = 64;

// Whether a chunk can be asked (again) to a peer. Never asked, or asked long
// enough ago to consider the answer lost.
pub fn should_request(now: Instant, last_requested: Option<Instant>, timeout: Duration) -> bool {
    match last_requested {
        None => true,
        Some(last) => now.saturating_duration_since(last) > timeout,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub index: u32,
    // Verified and handed to the sink. Reset only when the sink lost it.
    pub downloaded: bool,
    pub hash: Sha1Hash,
}

// Chunks a peer advertised, with the last time each one was asked to it.
#[derive(Debug, Clone, Default)]
pub struct PeerChunkState {
    last_requested: BTreeMap<u32, Option<Instant>>,
}

impl PeerChunkState {
    // Replace the advertised chunks, keeping the request times of the chunks
    // still advertised.
    fn refresh(&mut self, bitfield: &Bitfield, chunk_count: u32) {
        let previous = std::mem::take(&mut self.last_requested);
        self.last_requested = bitfield
            .decode_bounded(chunk_count)
            .into_iter()
            .map(|index| (index, previous.get(&index).copied().flatten()))
            .collect();
    }

    fn mark_requested(&mut self, index: u32, now: Instant) {
        if let Some(last) = self.last_requested.get_mut(&index) {
            *last = Some(now);
        }
    }

    pub fn has(&self, index: u32) -> bool {
        self.last_requested.contains_key(&index)
    }

    pub fn last_requested(&self, index: u32) -> Option<Instant> {
        self.last_requested.get(&index).copied().flatten()
    }
}

// What the tracker told about a file, and where it goes on the disk.
pub struct DownloadMetadata {
    pub size: u64,
    pub file_hash: Sha1Hash,
    pub chunk_size: u64,
    pub chunk_count: u32,
    pub path: PathBuf,
    sink: Arc<dyn ChunkSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    // The tracker didn't answer yet, nothing can be verified.
    NotReady,
    OutOfRange,
    AlreadyDownloaded,
    HashMismatch,
    Stored { downloaded: u32, completed: bool },
}

#[derive(Debug, Default)]
struct Progress {
    chunks: Vec<ChunkInfo>,
    downloaded: u32,
}

/// A file being downloaded from the swarm.
///
/// Created empty when the node asks the tracker for the file, then populated
/// once the tracker answers with the file metadata. Chunk progress and peer
/// states are guarded independently, so ingesting a chunk never waits for a
/// request tick.
pub struct ForDownloadFile {
    name: String,
    metadata: OnceLock<DownloadMetadata>,
    progress: Mutex<Progress>,
    peers: Mutex<BTreeMap<SocketAddr, PeerChunkState>>,
}

impl ForDownloadFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: OnceLock::new(),
            progress: Mutex::new(Progress::default()),
            peers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> Option<&DownloadMetadata> {
        self.metadata.get()
    }

    pub fn is_ready(&self) -> bool {
        self.metadata.get().is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.metadata.get().map(|metadata| metadata.path.as_path())
    }

    // Fill the file metadata from the tracker answer. Verified chunks are
    // handed to the sink. Can only be done once.
    pub async fn populate(
        &self,
        size: u64,
        file_hash: Sha1Hash,
        chunk_hashes: Vec<Sha1Hash>,
        path: PathBuf,
        sink: Arc<dyn ChunkSink>,
    ) -> AnyResult<()> {
        ensure!(
            size > 0 && size <= MAX_FILE_SIZE,
            "{} has an unsupported size of {} bytes",
            self.name,
            size
        );
        let expected = chunk_count(size);
        ensure!(
            chunk_hashes.len() as u64 == expected,
            "{} comes with {} chunk hashes, {} expected",
            self.name,
            chunk_hashes.len(),
            expected
        );

        let mut progress = self.progress.lock().await;
        let metadata = DownloadMetadata {
            size,
            file_hash,
            chunk_size: chunk_size(size),
            chunk_count: expected as u32,
            path,
            sink,
        };
        if self.metadata.set(metadata).is_err() {
            bail!("metadata of {} are already known", self.name);
        }
        progress.chunks = chunk_hashes
            .into_iter()
            .enumerate()
            .map(|(index, hash)| ChunkInfo {
                index: index as u32,
                downloaded: false,
                hash,
            })
            .collect();
        Ok(())
    }

    // PEERS -------------------------------------------------------------------

    // Merge peers advertised by the tracker. Unknown peers start with nothing
    // requested, known ones keep their request times. Return how many peers
    // were new.
    pub async fn upsert_peers<I>(&self, advertised: I) -> usize
    where
        I: IntoIterator<Item = (SocketAddr, Bitfield)>,
    {
        let chunk_count = match self.metadata.get() {
            Some(metadata) => metadata.chunk_count,
            None => return 0,
        };

        let mut peers = self.peers.lock().await;
        let mut added = 0;
        for (addr, bitfield) in advertised {
            let peer = peers.entry(addr).or_insert_with(|| {
                added += 1;
                PeerChunkState::default()
            });
            peer.refresh(&bitfield, chunk_count);
        }
        added
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    pub async fn peer_state(&self, addr: SocketAddr) -> Option<PeerChunkState> {
        self.peers.lock().await.get(&addr).cloned()
    }

    // SCHEDULING --------------------------------------------------------------

    // Ordered indexes of the chunks not downloaded yet.
    pub async fn missing_chunks(&self) -> Vec<u32> {
        self.progress
            .lock()
            .await
            .chunks
            .iter()
            .filter(|chunk| !chunk.downloaded)
            .map(|chunk| chunk.index)
            .collect()
    }

    /// Pick which chunks to ask to which peer right now.
    ///
    /// A missing chunk is skipped while a peer asked for it may still answer.
    /// Otherwise it is asked to one of the peers advertising it, preferring
    /// the least loaded peer of this round, then the one never (or least
    /// recently) asked. Every selected pair is marked as requested at `now`
    /// before being returned, so a given chunk is asked at most once per peer
    /// within a timeout.
    pub async fn schedule_requests(&self, now: Instant, timeout: Duration) -> Vec<(SocketAddr, Vec<u32>)> {
        let missing = self.missing_chunks().await;
        if missing.is_empty() {
            return Vec::new();
        }

        let mut peers = self.peers.lock().await;
        let mut batches: BTreeMap<SocketAddr, Vec<u32>> = BTreeMap::new();
        let load = |batches: &BTreeMap<SocketAddr, Vec<u32>>, addr: &SocketAddr| {
            batches.get(addr).map_or(0, Vec::len)
        };

        for index in missing {
            let in_flight = peers
                .values()
                .any(|peer| peer.has(index) && !should_request(now, peer.last_requested(index), timeout));
            if in_flight {
                continue;
            }

            let candidate = peers
                .iter()
                .filter(|(addr, peer)| peer.has(index) && load(&batches, *addr) < MAX_CHUNKS_PER_REQUEST)
                .min_by_key(|(addr, peer)| (load(&batches, *addr), peer.last_requested(index)))
                .map(|(addr, _)| *addr);

            if let Some(addr) = candidate {
                if let Some(peer) = peers.get_mut(&addr) {
                    peer.mark_requested(index, now);
                }
                batches.entry(addr).or_default().push(index);
            }
        }

        batches.into_iter().collect()
    }

    // INGESTION ---------------------------------------------------------------

    // Verify a received chunk, and hand it to the sink when it is a new valid
    // one.
    pub async fn ingest_chunk(&self, index: u32, content: Vec<u8>) -> IngestOutcome {
        let metadata = match self.metadata.get() {
            Some(metadata) => metadata,
            None => return IngestOutcome::NotReady,
        };

        let mut progress = self.progress.lock().await;
        let total = progress.chunks.len() as u32;
        let chunk = match progress.chunks.get_mut(index as usize) {
            Some(chunk) => chunk,
            None => return IngestOutcome::OutOfRange,
        };
        if chunk.downloaded {
            return IngestOutcome::AlreadyDownloaded;
        }
        if hash_chunk(&content) != chunk.hash {
            return IngestOutcome::HashMismatch;
        }

        chunk.downloaded = true;
        progress.downloaded += 1;
        let downloaded = progress.downloaded;
        metadata
            .sink
            .enqueue_chunk(index, chunk_offset(index, metadata.chunk_size), content);
        drop(progress);

        if decile(downloaded - 1, total) != decile(downloaded, total) {
            log!(
                info,
                "{}: {}% downloaded ({}/{} chunks)",
                self.name,
                decile(downloaded, total) * 10,
                downloaded,
                total
            );
        }

        IngestOutcome::Stored {
            downloaded,
            completed: downloaded == total,
        }
    }

    // GETTERS -----------------------------------------------------------------

    // Whether a verified chunk reached the disk, and can be read back.
    pub fn is_written(&self, index: u32) -> bool {
        self.metadata
            .get()
            .map_or(false, |metadata| metadata.sink.writes().borrow().is_written(index))
    }

    // Wait for every chunk handed to the sink to be settled. Chunks the sink
    // failed to persist are downloaded again, and returned.
    pub async fn wait_written(&self) -> Vec<u32> {
        let metadata = match self.metadata.get() {
            Some(metadata) => metadata,
            None => return Vec::new(),
        };
        let mut writes = metadata.sink.writes();
        while writes.borrow_and_update().settled() < metadata.chunk_count as usize {
            if writes.changed().await.is_err() {
                break;
            }
        }
        let lost = (0..metadata.chunk_count)
            .filter(|index| !writes.borrow().is_written(*index))
            .collect::<Vec<_>>();

        let mut progress = self.progress.lock().await;
        for index in &lost {
            if let Some(chunk) = progress.chunks.get_mut(*index as usize) {
                if chunk.downloaded {
                    chunk.downloaded = false;
                    progress.downloaded -= 1;
                }
            }
        }
        lost
    }

    pub async fn has_chunk(&self, index: u32) -> bool {
        self.progress
            .lock()
            .await
            .chunks
            .get(index as usize)
            .map_or(false, |chunk| chunk.downloaded)
    }

    // Downloaded chunks, and total chunks (0 until populated).
    pub async fn progress(&self) -> (u32, u32) {
        let progress = self.progress.lock().await;
        (progress.downloaded, progress.chunks.len() as u32)
    }

    // Chunks downloaded and written so far, as advertised to the tracker.
    pub async fn bitfield(&self) -> Bitfield {
        let written = match self.metadata.get() {
            Some(metadata) => metadata.sink.writes().borrow().written.clone(),
            None => BTreeSet::new(),
        };
        let progress = self.progress.lock().await;
        Bitfield::encode(
            progress
                .chunks
                .iter()
                .filter(|chunk| chunk.downloaded && written.contains(&chunk.index))
                .map(|chunk| chunk.index),
            progress.chunks.len() as u32,
        )
    }

    pub async fn chunk_hashes(&self) -> Vec<Sha1Hash> {
        self.progress.lock().await.chunks.iter().map(|chunk| chunk.hash).collect()
    }
}

// Tenth of the download done.
fn decile(downloaded: u32, total: u32) -> u64 {
    if total == 0 {
        0
    } else {
        downloaded as u64 * 10 / total as u64
    }
}

#[cfg(test)]
#[path = "download_test.rs"]
mod download_test;
