use chunkswarm::{
    log,
    node::{
        config::{DEFAULT_CHUNK_TIMEOUT_MS, DEFAULT_REFRESH_MS, DEFAULT_TICK_MS, DEFAULT_TRACKER_ADDR},
        Node, NodeConfig,
    },
};
use clap::Parser;
use errors::AnyResult;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Parser)]
#[clap(name = "chunkswarm-node")]
#[clap(about = "Publish and download files through a chunkswarm tracker", long_about = None)]
struct Cli {
    /// Tracker host:port
    #[clap(default_value = DEFAULT_TRACKER_ADDR)]
    #[clap(long, value_name = "host:port")]
    tracker_addr: SocketAddr,

    /// Datagram port used to exchange chunks (0 = any)
    #[clap(default_value_t = 0)]
    #[clap(long, value_name = "port")]
    data_port: u16,

    /// Name announced to the tracker (empty = local ip)
    #[clap(long, value_name = "name")]
    name: Option<String>,

    /// Where downloaded files are written
    #[clap(default_value = ".")]
    #[clap(long, value_name = "dir")]
    download_dir: PathBuf,

    /// Files or directories to publish
    #[clap(long, value_name = "path")]
    publish: Vec<PathBuf>,

    /// File names to download
    #[clap(long, value_name = "file_name")]
    request: Vec<String>,

    /// Wait time before asking a chunk again
    #[clap(long, value_name = "ms")]
    chunk_timeout_ms: Option<u64>,

    /// Frequency of the chunk requests
    #[clap(long, value_name = "ms")]
    tick_ms: Option<u64>,

    /// Frequency of the tracker refresh
    #[clap(long, value_name = "ms")]
    refresh_ms: Option<u64>,

    /// Frequency of the status report (empty = never)
    #[clap(long, value_name = "ms")]
    status_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let args = Cli::parse();
    log!(
        info,
        "timings: chunk timeout {} ms, tick {} ms, refresh {} ms",
        args.chunk_timeout_ms.unwrap_or(DEFAULT_CHUNK_TIMEOUT_MS),
        args.tick_ms.unwrap_or(DEFAULT_TICK_MS),
        args.refresh_ms.unwrap_or(DEFAULT_REFRESH_MS)
    );

    let config = NodeConfig::new(args.tracker_addr, &args.download_dir)
        .set_data_port(args.data_port)
        .set_identity(args.name)
        .set_chunk_timeout(args.chunk_timeout_ms)
        .set_tick(args.tick_ms)
        .set_refresh(args.refresh_ms);
    let node = Node::start(config).await?;

    for path in args.publish.iter() {
        if let Err(err) = node.publish(path).await {
            log!(error, "{:#}", err);
        }
    }
    for name in args.request.iter() {
        if let Err(err) = node.request(name).await {
            log!(error, "{:#}", err);
        }
    }

    // Let's print what the node is doing regularly.
    if let Some(status_ms) = args.status_ms {
        let ctx = node.context();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(status_ms));
            loop {
                interval.tick().await;
                match ctx.status().await.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(err) => log!(error, "can't dump the status: {:#}", err),
                }
            }
        });
    }

    node.wait().await
}
