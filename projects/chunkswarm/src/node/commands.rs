use super::{
    context::{LocalFile, NodeContext, Outbound},
    download::ForDownloadFile,
};
use crate::{file::hashing::hash_file, log, network::protocol::Packet};
use errors::{ensure, AnyResult, Context};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
};

// Share a file, or every regular file of a directory. Files stay pending until
// the tracker acknowledges them.
pub async fn publish(ctx: &NodeContext, path: &Path) -> AnyResult<Vec<Outbound>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("can't publish {}", path.display()))?;
    if !metadata.is_dir() {
        return publish_file(ctx, path.to_path_buf()).await;
    }

    let mut outbound = Vec::new();
    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("can't list {}", path.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match publish_file(ctx, entry.path()).await {
            Ok(packets) => outbound.extend(packets),
            Err(err) => log!(warn, "skipping {}: {:#}", entry.path().display(), err),
        }
    }
    Ok(outbound)
}

async fn publish_file(ctx: &NodeContext, path: PathBuf) -> AnyResult<Vec<Outbound>> {
    let name = path
        .file_name()
        .and_then(OsStr::to_str)
        .ok_or_else(|| errors::anyerror!("{} has no usable file name", path.display()))?
        .to_owned();
    ensure!(!ctx.is_known(&name).await, "{} is already shared or downloaded", name);

    // Hashing reads the whole file.
    let hashed_path = path.clone();
    let hashes = tokio::task::spawn_blocking(move || hash_file(hashed_path)).await??;

    let packet = Packet::PublishFile {
        name: name.clone(),
        size: hashes.size,
        file_hash: hashes.file_hash,
        chunk_hashes: hashes.chunk_hashes.clone(),
    };
    let file = LocalFile {
        name: name.clone(),
        path,
        size: hashes.size,
        file_hash: hashes.file_hash,
        chunk_hashes: hashes.chunk_hashes,
    };
    log!(info, "publishing {} ({} bytes, {} chunks)", name, file.size, file.chunk_count());
    ctx.pending.write().await.insert(name, file);

    Ok(vec![Outbound::Tracker(packet)])
}

// Start downloading a file, once the tracker tells where it is.
pub async fn request(ctx: &NodeContext, name: &str) -> AnyResult<Vec<Outbound>> {
    let name = safe_file_name(name)?;
    ensure!(!ctx.is_known(name).await, "{} is already shared or downloaded", name);

    ctx.downloads
        .write()
        .await
        .insert(name.to_owned(), Arc::new(ForDownloadFile::new(name)));
    log!(info, "requesting {}", name);

    Ok(vec![Outbound::Tracker(Packet::RequestFile { name: name.to_owned() })])
}

// Stop sharing a file, and ask the tracker to forget it.
pub async fn remove(ctx: &NodeContext, name: &str) -> AnyResult<Vec<Outbound>> {
    if ctx.published.write().await.remove(name).is_none() {
        log!(warn, "{} is not published by this node, asking the tracker anyway", name);
    }
    Ok(vec![Outbound::Tracker(Packet::RemoveFile { name: name.to_owned() })])
}

// Names come from other nodes: refuse anything escaping the download
// directory.
pub fn safe_file_name(name: &str) -> AnyResult<&str> {
    let file_name = Path::new(name).file_name().and_then(OsStr::to_str);
    ensure!(file_name == Some(name), "{:?} is not a valid file name", name);
    Ok(name)
}
