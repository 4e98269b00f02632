use crate::{
    file::hashing::Sha1Hash,
    log,
    network::{
        bitfield::Bitfield,
        protocol::{FileSuccessKind, NodeInfo, Packet},
        transport::ControlHandle,
    },
};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;

// TrackedFile -----------------------------------------------------------------

// A file published on the network. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub name: String,
    pub size: u64,
    pub file_hash: Sha1Hash,
    pub chunk_hashes: Vec<Sha1Hash>,
}

// NodeRegistration ------------------------------------------------------------

// A connected node, and the chunks it advertised for every file it holds.
#[derive(Debug)]
pub struct NodeRegistration {
    identity: String,
    data_port: u16,
    // Owned for the whole life of the registration.
    control: ControlHandle,
    files_held: RwLock<HashMap<String, Bitfield>>,
}

impl NodeRegistration {
    fn new(identity: String, data_port: u16, control: ControlHandle) -> Self {
        Self {
            identity,
            data_port,
            control,
            files_held: RwLock::new(HashMap::new()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn data_port(&self) -> u16 {
        self.data_port
    }

    pub fn control(&self) -> &ControlHandle {
        &self.control
    }

    // Chunks this node advertised for a file, if it holds it.
    pub async fn bitfield(&self, name: &str) -> Option<Bitfield> {
        self.files_held.read().await.get(name).cloned()
    }

    async fn availability(&self, name: &str) -> Option<NodeInfo> {
        self.bitfield(name).await.map(|bitfield| NodeInfo {
            identity: self.identity.clone(),
            data_port: self.data_port,
            bitfield,
        })
    }
}

// Registry --------------------------------------------------------------------

/// Which node holds which file, and which chunks of it.
///
/// Locks are always taken in the same order: `files`, then `nodes`, then a
/// node `files_held`. Publishing and removing a file keep the `files` lock
/// while they touch the nodes, so operations on a same file name are
/// linearized.
#[derive(Debug, Default)]
pub struct Registry {
    files: RwLock<HashMap<String, TrackedFile>>,
    nodes: RwLock<HashMap<SocketAddr, Arc<NodeRegistration>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // Interpret a packet received from a node connection, and give back the
    // reply to send, if any.
    pub async fn dispatch(&self, control: &ControlHandle, packet: Packet) -> Option<Packet> {
        let conn = control.peer_addr();
        match packet {
            Packet::Init { identity, data_port } => {
                self.handle_init(control.clone(), identity, data_port).await;
                None
            }
            Packet::PublishFile {
                name,
                size,
                file_hash,
                chunk_hashes,
            } => {
                let file = TrackedFile {
                    name,
                    size,
                    file_hash,
                    chunk_hashes,
                };
                Some(self.handle_publish(conn, file).await)
            }
            Packet::RemoveFile { name } => Some(self.handle_remove(conn, name).await),
            Packet::RequestFile { name } => Some(self.handle_request(conn, name).await),
            Packet::UpdateFile { name } => self.handle_update_file(conn, name).await,
            Packet::UpdateChunks { name, bitfield } => {
                self.handle_update_chunks(conn, name, bitfield).await;
                None
            }
            Packet::FileSuccess { .. }
            | Packet::AlreadyExists { .. }
            | Packet::NotFound { .. }
            | Packet::AnswerFileWithNodes { .. }
            | Packet::AnswerNodes { .. }
            | Packet::RequestChunks { .. }
            | Packet::Chunk { .. } => {
                log!(warn, "[{}] ignoring {}, not meant for a tracker", conn, packet);
                None
            }
        }
    }

    // Register a node. A second init on the same connection replaces the
    // previous registration.
    pub async fn handle_init(&self, control: ControlHandle, identity: String, data_port: u16) {
        let conn = control.peer_addr();
        log!(info, "[{}] registered node {} with data port {}", conn, identity, data_port);

        let node = NodeRegistration::new(identity, data_port, control);
        self.nodes.write().await.insert(conn, Arc::new(node));
    }

    // Track a new file, held by the publishing node. File names are unique
    // network wide, the first publisher wins.
    pub async fn handle_publish(&self, conn: SocketAddr, file: TrackedFile) -> Packet {
        let mut files = self.files.write().await;
        if files.contains_key(&file.name) {
            log!(info, "[{}] publish {}, but the file already exists", conn, file.name);
            return Packet::AlreadyExists { name: file.name };
        }

        let name = file.name.clone();
        let chunk_count = file.chunk_hashes.len() as u32;
        files.insert(name.clone(), file);

        if let Some(node) = self.node(conn).await {
            node.files_held
                .write()
                .await
                .insert(name.clone(), Bitfield::new(chunk_count));
        }

        log!(info, "[{}] published {} ({} chunks)", conn, name, chunk_count);
        Packet::FileSuccess {
            name,
            kind: FileSuccessKind::Publish,
        }
    }

    // Untrack a file, and forget every node holding it.
    pub async fn handle_remove(&self, conn: SocketAddr, name: String) -> Packet {
        let mut files = self.files.write().await;
        if files.remove(&name).is_none() {
            log!(info, "[{}] remove {}, but the file was not found", conn, name);
            return Packet::NotFound { name };
        }

        for node in self.nodes.read().await.values() {
            node.files_held.write().await.remove(&name);
        }

        log!(info, "[{}] removed {}", conn, name);
        Packet::FileSuccess {
            name,
            kind: FileSuccessKind::Remove,
        }
    }

    // Give the file metadata, and every node currently holding it.
    pub async fn handle_request(&self, conn: SocketAddr, name: String) -> Packet {
        let files = self.files.read().await;
        let file = match files.get(&name) {
            Some(file) => file.clone(),
            None => {
                log!(info, "[{}] request {}, but the file was not found", conn, name);
                return Packet::NotFound { name };
            }
        };
        let nodes = self.nodes_holding(&name).await;
        drop(files);

        log!(info, "[{}] request {}, {} node(s) hold it", conn, name, nodes.len());
        Packet::AnswerFileWithNodes {
            name,
            size: file.size,
            file_hash: file.file_hash,
            chunk_hashes: file.chunk_hashes,
            nodes,
        }
    }

    // Give the current nodes holding a file, when it is still tracked.
    pub async fn handle_update_file(&self, conn: SocketAddr, name: String) -> Option<Packet> {
        let files = self.files.read().await;
        if !files.contains_key(&name) {
            log!(info, "[{}] update {}, but the file was not found", conn, name);
            return None;
        }
        let nodes = self.nodes_holding(&name).await;
        drop(files);

        Some(Packet::AnswerNodes { name, nodes })
    }

    // Replace the chunks a node advertises for a file. The file is not checked
    // against the tracked ones: a node advertises what it downloads, before
    // it is complete.
    pub async fn handle_update_chunks(&self, conn: SocketAddr, name: String, bitfield: Bitfield) {
        match self.node(conn).await {
            Some(node) => {
                node.files_held.write().await.insert(name, bitfield);
            }
            None => log!(warn, "[{}] update chunks of {} from an unregistered node", conn, name),
        }
    }

    // Forget a node and everything it advertised.
    pub async fn handle_disconnect(&self, conn: SocketAddr) {
        if let Some(node) = self.nodes.write().await.remove(&conn) {
            log!(info, "[{}] node {} unregistered", conn, node.identity);
        }
    }

    // Getters -----------------------------------------------------------------

    pub async fn node(&self, conn: SocketAddr) -> Option<Arc<NodeRegistration>> {
        self.nodes.read().await.get(&conn).cloned()
    }

    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn tracked_file(&self, name: &str) -> Option<TrackedFile> {
        self.files.read().await.get(name).cloned()
    }

    // Every node holding a file, in no particular order.
    async fn nodes_holding(&self, name: &str) -> Vec<NodeInfo> {
        let mut res = Vec::new();
        for node in self.nodes.read().await.values() {
            if let Some(info) = node.availability(name).await {
                res.push(info);
            }
        }
        res
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
