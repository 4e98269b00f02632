use chunkswarm::tracker::Tracker;
use clap::Parser;
use errors::AnyResult;
use std::net::SocketAddr;

#[derive(Parser)]
#[clap(name = "chunkswarm-tracker")]
#[clap(about = "Keep track of which node holds which file chunks", long_about = None)]
struct Cli {
    /// Control channel host:port
    #[clap(default_value = "0.0.0.0:9090")]
    #[clap(long, value_name = "host:port")]
    listen_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let args = Cli::parse();
    let tracker = Tracker::bind(args.listen_addr).await?;
    tracker.run().await
}
