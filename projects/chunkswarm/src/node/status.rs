use errors::AnyResult;
use serde::{Deserialize, Serialize};

// What a node shares and downloads, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub identity: String,
    pub data_port: u16,
    pub pending: Vec<String>,
    pub published: Vec<String>,
    pub downloads: Vec<DownloadStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub name: String,
    pub downloaded_chunks: u32,
    // Zero until the tracker answered.
    pub total_chunks: u32,
    pub peers: usize,
}

impl NodeStatus {
    pub fn to_json(&self) -> AnyResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
