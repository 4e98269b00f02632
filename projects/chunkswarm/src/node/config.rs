use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_TRACKER_ADDR: &str = "127.0.0.1:9090";
pub const DEFAULT_CHUNK_TIMEOUT_MS: u64 = 3 * 1000; // 3 sec
pub const DEFAULT_TICK_MS: u64 = 500;
pub const DEFAULT_REFRESH_MS: u64 = 5 * 1000; // 5 sec

// Everything a node needs to know before connecting to its tracker.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    // Control channel endpoint.
    pub tracker_addr: SocketAddr,

    // Port of the datagram socket. 0 lets the system pick one.
    pub data_port: u16,

    // Name announced to the tracker, other nodes resolve it to reach us.
    // Defaults to the local ip of the tracker connection.
    pub identity: Option<String>,

    // Where downloaded files are written.
    pub download_dir: PathBuf,

    /// Wait time before asking a peer again for a chunk it didn't deliver.
    pub chunk_timeout: Duration,

    /// Frequency at which missing chunks are requested.
    pub tick: Duration,

    /// Frequency at which progress is announced and peer lists refreshed.
    pub refresh: Duration,
}

impl NodeConfig {
    pub fn new(tracker_addr: SocketAddr, download_dir: impl AsRef<Path>) -> Self {
        Self {
            tracker_addr,
            data_port: 0,
            identity: None,
            download_dir: download_dir.as_ref().to_path_buf(),
            chunk_timeout: Duration::from_millis(DEFAULT_CHUNK_TIMEOUT_MS),
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            refresh: Duration::from_millis(DEFAULT_REFRESH_MS),
        }
    }

    // OPTIONS -----------------------------------------------------------------

    pub fn set_data_port(mut self, port: u16) -> Self {
        self.data_port = port;
        self
    }

    pub fn set_identity(mut self, identity: Option<String>) -> Self {
        self.identity = identity;
        self
    }

    /// Chunk retry timeout (default is 3000 ms).
    pub fn set_chunk_timeout(mut self, value: Option<u64>) -> Self {
        self.chunk_timeout = Duration::from_millis(value.unwrap_or(DEFAULT_CHUNK_TIMEOUT_MS));
        self
    }

    /// Chunk request tick (default is 500 ms).
    pub fn set_tick(mut self, value: Option<u64>) -> Self {
        self.tick = Duration::from_millis(value.unwrap_or(DEFAULT_TICK_MS));
        self
    }

    /// Tracker refresh frequency (default is 5000 ms).
    pub fn set_refresh(mut self, value: Option<u64>) -> Self {
        self.refresh = Duration::from_millis(value.unwrap_or(DEFAULT_REFRESH_MS));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        let addr = SocketAddr::from(([127, 0, 0, 1], 9090));
        let config = NodeConfig::new(addr, "/tmp");
        assert_eq!(Duration::from_secs(3), config.chunk_timeout);
        assert_eq!(Duration::from_millis(500), config.tick);
        assert_eq!(Duration::from_secs(5), config.refresh);
        assert_eq!(0, config.data_port);

        let config = config
            .set_chunk_timeout(Some(10))
            .set_tick(None)
            .set_refresh(Some(20))
            .set_data_port(4000)
            .set_identity(Some("alpha".to_owned()));
        assert_eq!(Duration::from_millis(10), config.chunk_timeout);
        assert_eq!(Duration::from_millis(500), config.tick);
        assert_eq!(Duration::from_millis(20), config.refresh);
        assert_eq!(4000, config.data_port);
        assert_eq!(Some("alpha".to_owned()), config.identity);
    }
}
