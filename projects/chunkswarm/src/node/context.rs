use super::{
    config::NodeConfig,
    download::ForDownloadFile,
    status::{DownloadStatus, NodeStatus},
};
use crate::{
    file::hashing::{chunk_count, chunk_size, Sha1Hash},
    network::protocol::Packet,
};
use std::{collections::HashMap, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::sync::RwLock;

// A packet produced by the node logic, with its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Tracker(Packet),
    Peer(SocketAddr, Packet),
}

// A file entirely available on the local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub file_hash: Sha1Hash,
    pub chunk_hashes: Vec<Sha1Hash>,
}

impl LocalFile {
    pub fn chunk_size(&self) -> u64 {
        chunk_size(self.size)
    }

    pub fn chunk_count(&self) -> u32 {
        chunk_count(self.size) as u32
    }
}

/// Everything a node owns.
///
/// Files waiting for the tracker to acknowledge their publication, files
/// published, and files being downloaded live in three independently guarded
/// maps, keyed by file name.
pub struct NodeContext {
    // Name and datagram port announced to the tracker.
    pub identity: String,
    pub data_port: u16,

    pub config: NodeConfig,

    pub pending: RwLock<HashMap<String, LocalFile>>,
    pub published: RwLock<HashMap<String, LocalFile>>,
    pub downloads: RwLock<HashMap<String, Arc<ForDownloadFile>>>,
}

impl NodeContext {
    pub fn new(identity: String, data_port: u16, config: NodeConfig) -> Self {
        Self {
            identity,
            data_port,
            config,
            pending: RwLock::new(HashMap::new()),
            published: RwLock::new(HashMap::new()),
            downloads: RwLock::new(HashMap::new()),
        }
    }

    // Whether a node advertised by the tracker is this very node.
    pub fn is_self(&self, identity: &str, data_port: u16) -> bool {
        self.identity == identity && self.data_port == data_port
    }

    pub async fn download(&self, name: &str) -> Option<Arc<ForDownloadFile>> {
        self.downloads.read().await.get(name).cloned()
    }

    // Every download in progress, in no particular order.
    pub async fn all_downloads(&self) -> Vec<Arc<ForDownloadFile>> {
        self.downloads.read().await.values().cloned().collect()
    }

    // Whether the name is already used by a pending, published or downloading
    // file.
    pub async fn is_known(&self, name: &str) -> bool {
        self.pending.read().await.contains_key(name)
            || self.published.read().await.contains_key(name)
            || self.downloads.read().await.contains_key(name)
    }

    // Snapshot of the node files.
    pub async fn status(&self) -> NodeStatus {
        let mut pending = self.pending.read().await.keys().cloned().collect::<Vec<_>>();
        pending.sort();
        let mut published = self.published.read().await.keys().cloned().collect::<Vec<_>>();
        published.sort();

        let mut downloads = Vec::new();
        for download in self.all_downloads().await {
            let (downloaded_chunks, total_chunks) = download.progress().await;
            downloads.push(DownloadStatus {
                name: download.name().to_owned(),
                downloaded_chunks,
                total_chunks,
                peers: download.peer_count().await,
            });
        }
        downloads.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));

        NodeStatus {
            identity: self.identity.clone(),
            data_port: self.data_port,
            pending,
            published,
            downloads,
        }
    }
}
