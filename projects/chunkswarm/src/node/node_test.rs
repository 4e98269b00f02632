use super::*;
use crate::tracker::Tracker;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);
const POLL: Duration = Duration::from_millis(20);

async fn start_tracker() -> AnyResult<SocketAddr> {
    let tracker = Tracker::bind("127.0.0.1:0".parse()?).await?;
    let addr = tracker.local_addr()?;
    tokio::spawn(tracker.run());
    Ok(addr)
}

fn config(tracker_addr: SocketAddr, download_dir: &Path) -> NodeConfig {
    NodeConfig::new(tracker_addr, download_dir)
        .set_tick(Some(50))
        .set_refresh(Some(200))
        .set_chunk_timeout(Some(300))
}

// Poll the node status until the condition holds.
async fn wait_for_status<F>(node: &Node, what: &str, condition: F) -> AnyResult<()>
where
    F: Fn(&NodeStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition(&node.status().await) {
            return Ok(());
        }
        tokio::time::sleep(POLL).await;
    }
    bail!("timed out waiting for {}: {:?}", what, node.status().await)
}

// Writes are flushed asynchronously.
async fn wait_for_content(path: &Path, expected: &[u8]) -> AnyResult<()> {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if tokio::fs::read(path).await.ok().as_deref() == Some(expected) {
            return Ok(());
        }
        tokio::time::sleep(POLL).await;
    }
    bail!("{} never got the expected content", path.display())
}

#[tokio::test]
async fn test_download_over_loopback() -> AnyResult<()> {
    let tracker_addr = start_tracker().await?;
    let data = (0..40_000u32).map(|idx| (idx * 31 % 256) as u8).collect::<Vec<_>>();
    let shared_dir = tempfile::tempdir()?;
    std::fs::write(shared_dir.path().join("swarm.bin"), &data)?;
    let (seeder_dir, leecher_dir) = (tempfile::tempdir()?, tempfile::tempdir()?);

    let seeder = Node::start(config(tracker_addr, seeder_dir.path())).await?;
    let leecher = Node::start(config(tracker_addr, leecher_dir.path())).await?;
    assert_ne!(seeder.data_port(), leecher.data_port());
    assert_eq!("127.0.0.1", seeder.identity());

    seeder.publish(shared_dir.path()).await?;
    wait_for_status(&seeder, "the publication", |status| {
        status.published == vec!["swarm.bin".to_owned()]
    })
    .await?;

    leecher.request("swarm.bin").await?;
    wait_for_status(&leecher, "the download", |status| {
        status.downloads.is_empty() && status.published == vec!["swarm.bin".to_owned()]
    })
    .await?;
    wait_for_content(&leecher_dir.path().join("swarm.bin"), &data).await?;

    leecher.shutdown();
    seeder.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_swarm_relay() -> AnyResult<()> {
    let tracker_addr = start_tracker().await?;
    let data = vec![42u8; 50_000];
    let source = temp_file::with_contents(&data);
    let name = source
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| errors::anyerror!("no file name"))?
        .to_owned();
    let dirs = [tempfile::tempdir()?, tempfile::tempdir()?, tempfile::tempdir()?];

    let seeder = Node::start(config(tracker_addr, dirs[0].path())).await?;
    seeder.publish(source.path()).await?;
    wait_for_status(&seeder, "the publication", |status| !status.published.is_empty()).await?;

    let first = Node::start(config(tracker_addr, dirs[1].path())).await?;
    first.request(&name).await?;
    wait_for_status(&first, "the first download", |status| {
        status.downloads.is_empty() && status.published.contains(&name)
    })
    .await?;

    // Once the seeder left, the file only lives on the first node.
    seeder.shutdown();
    let second = Node::start(config(tracker_addr, dirs[2].path())).await?;
    second.request(&name).await?;
    wait_for_status(&second, "the second download", |status| {
        status.downloads.is_empty() && status.published.contains(&name)
    })
    .await?;
    wait_for_content(&dirs[2].path().join(&name), &data).await?;
    Ok(())
}

#[tokio::test]
async fn test_session_ends_with_tracker() -> AnyResult<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let dir = tempfile::tempdir()?;

    let node = Node::start(config(addr, dir.path())).await?;
    let (stream, _) = listener.accept().await?;
    drop(stream);

    let ended = tokio::time::timeout(WAIT, node.wait()).await?;
    assert!(ended.is_err());
    Ok(())
}
