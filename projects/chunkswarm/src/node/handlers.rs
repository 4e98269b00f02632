use super::{
    commands::safe_file_name,
    context::{LocalFile, NodeContext, Outbound},
    download::{ForDownloadFile, IngestOutcome},
    upload::serve_chunks,
};
use crate::{
    file::{file_writer::FileWriter, hashing::Sha1Hash},
    log,
    network::{
        bitfield::Bitfield,
        protocol::{FileSuccessKind, NodeInfo, Packet},
    },
};
use errors::{AnyResult, Context};
use std::{net::SocketAddr, sync::Arc, time::Instant};

// Tracker packets -------------------------------------------------------------

// React to a packet received on the tracker connection.
pub async fn handle_tracker_packet(ctx: &NodeContext, packet: Packet) -> Vec<Outbound> {
    match packet {
        Packet::FileSuccess {
            name,
            kind: FileSuccessKind::Publish,
        } => handle_published(ctx, name).await,
        Packet::FileSuccess {
            name,
            kind: FileSuccessKind::Remove,
        } => {
            log!(info, "{} removed from the tracker", name);
            Vec::new()
        }
        Packet::AlreadyExists { name } => {
            ctx.pending.write().await.remove(&name);
            log!(warn, "{} already exists on the tracker, not published", name);
            Vec::new()
        }
        Packet::NotFound { name } => {
            match ctx.downloads.write().await.remove(&name) {
                Some(_) => log!(warn, "{} not found on the tracker, download dropped", name),
                None => log!(warn, "{} not found on the tracker", name),
            }
            Vec::new()
        }
        Packet::AnswerFileWithNodes {
            name,
            size,
            file_hash,
            chunk_hashes,
            nodes,
        } => handle_file_answer(ctx, name, size, file_hash, chunk_hashes, nodes).await,
        Packet::AnswerNodes { name, nodes } => match ctx.download(&name).await {
            Some(download) if download.is_ready() => merge_peers(ctx, &download, nodes).await,
            _ => Vec::new(),
        },
        Packet::Init { .. }
        | Packet::PublishFile { .. }
        | Packet::RemoveFile { .. }
        | Packet::RequestFile { .. }
        | Packet::UpdateFile { .. }
        | Packet::UpdateChunks { .. }
        | Packet::RequestChunks { .. }
        | Packet::Chunk { .. } => {
            log!(warn, "ignoring {} sent by the tracker", packet);
            Vec::new()
        }
    }
}

// The tracker accepted a file: it can be served, and this node advertised as
// holding all of it.
async fn handle_published(ctx: &NodeContext, name: String) -> Vec<Outbound> {
    let file = match ctx.pending.write().await.remove(&name) {
        Some(file) => file,
        None => {
            log!(warn, "{} acknowledged, but it was not pending", name);
            return Vec::new();
        }
    };
    let chunk_count = file.chunk_count();
    ctx.published.write().await.insert(name.clone(), file);
    log!(info, "{} published", name);

    vec![Outbound::Tracker(Packet::UpdateChunks {
        name,
        bitfield: Bitfield::full(chunk_count),
    })]
}

async fn handle_file_answer(
    ctx: &NodeContext,
    name: String,
    size: u64,
    file_hash: Sha1Hash,
    chunk_hashes: Vec<Sha1Hash>,
    nodes: Vec<NodeInfo>,
) -> Vec<Outbound> {
    let download = match ctx.download(&name).await {
        Some(download) => download,
        None => {
            log!(warn, "got the metadata of {}, which is not requested", name);
            return Vec::new();
        }
    };

    if !download.is_ready() {
        if let Err(err) = prepare_download(ctx, &download, size, file_hash, chunk_hashes).await {
            log!(error, "can't download {}: {:#}", name, err);
            ctx.downloads.write().await.remove(&name);
            return Vec::new();
        }
        log!(info, "downloading {} ({} bytes)", name, size);
    }

    merge_peers(ctx, &download, nodes).await
}

// Allocate the destination file, and fill the download metadata.
async fn prepare_download(
    ctx: &NodeContext,
    download: &ForDownloadFile,
    size: u64,
    file_hash: Sha1Hash,
    chunk_hashes: Vec<Sha1Hash>,
) -> AnyResult<()> {
    let path = ctx.config.download_dir.join(safe_file_name(download.name())?);
    let writer = FileWriter::create(&path, size).await?;
    download
        .populate(size, file_hash, chunk_hashes, path, Arc::new(writer))
        .await
}

// Add the nodes advertised by the tracker to the download peers, then use the
// fresh information right away.
async fn merge_peers(ctx: &NodeContext, download: &ForDownloadFile, nodes: Vec<NodeInfo>) -> Vec<Outbound> {
    let mut advertised = Vec::with_capacity(nodes.len());
    for node in nodes {
        if ctx.is_self(&node.identity, node.data_port) {
            continue;
        }
        match resolve(&node.identity, node.data_port).await {
            Ok(addr) => advertised.push((addr, node.bitfield)),
            Err(err) => log!(warn, "ignoring a peer of {}: {:#}", download.name(), err),
        }
    }

    let added = download.upsert_peers(advertised).await;
    if added > 0 {
        log!(info, "{}: {} new peer(s)", download.name(), added);
    }
    schedule(ctx, download, Instant::now()).await
}

// Turn a node identity into the address of its datagram socket.
async fn resolve(identity: &str, data_port: u16) -> AnyResult<SocketAddr> {
    tokio::net::lookup_host((identity, data_port))
        .await
        .with_context(|| format!("can't resolve {}", identity))?
        .next()
        .ok_or_else(|| errors::anyerror!("{} resolves to nothing", identity))
}

// Peer packets ----------------------------------------------------------------

// React to a datagram received from another node.
pub async fn handle_peer_packet(ctx: &NodeContext, packet: Packet, from: SocketAddr) -> Vec<Outbound> {
    match packet {
        Packet::RequestChunks { name, chunk_indexes } => serve_chunks(ctx, name, chunk_indexes, from).await,
        Packet::Chunk { name, index, content } => handle_chunk(ctx, name, index, content, from).await,
        Packet::Init { .. }
        | Packet::PublishFile { .. }
        | Packet::FileSuccess { .. }
        | Packet::AlreadyExists { .. }
        | Packet::NotFound { .. }
        | Packet::RemoveFile { .. }
        | Packet::RequestFile { .. }
        | Packet::AnswerFileWithNodes { .. }
        | Packet::UpdateFile { .. }
        | Packet::AnswerNodes { .. }
        | Packet::UpdateChunks { .. } => {
            log!(warn, "ignoring {} sent by {}", packet, from);
            Vec::new()
        }
    }
}

async fn handle_chunk(ctx: &NodeContext, name: String, index: u32, content: Vec<u8>, from: SocketAddr) -> Vec<Outbound> {
    // Late chunks of completed or dropped downloads.
    let download = match ctx.download(&name).await {
        Some(download) => download,
        None => return Vec::new(),
    };

    match download.ingest_chunk(index, content).await {
        IngestOutcome::Stored { completed: true, .. } => complete_download(ctx, &download).await,
        IngestOutcome::HashMismatch => {
            log!(warn, "chunk {} of {} sent by {} has an invalid hash, dropped", index, name, from);
            Vec::new()
        }
        IngestOutcome::OutOfRange => {
            log!(warn, "{} sent chunk {} of {}, which doesn't exist", from, index, name);
            Vec::new()
        }
        IngestOutcome::NotReady | IngestOutcome::AlreadyDownloaded | IngestOutcome::Stored { .. } => Vec::new(),
    }
}

// Every chunk is verified: once they are all on the disk, serve the file as a
// published one and tell the tracker.
async fn complete_download(ctx: &NodeContext, download: &ForDownloadFile) -> Vec<Outbound> {
    let metadata = match download.metadata() {
        Some(metadata) => metadata,
        None => return Vec::new(),
    };
    let name = download.name().to_owned();

    let lost = download.wait_written().await;
    if !lost.is_empty() {
        log!(error, "{}: {} chunk(s) couldn't be written, downloading them again", name, lost.len());
        return Vec::new();
    }

    let file = LocalFile {
        name: name.clone(),
        path: metadata.path.clone(),
        size: metadata.size,
        file_hash: metadata.file_hash,
        chunk_hashes: download.chunk_hashes().await,
    };
    ctx.published.write().await.insert(name.clone(), file);
    ctx.downloads.write().await.remove(&name);
    log!(info, "{} downloaded into {}", name, metadata.path.display());

    vec![Outbound::Tracker(Packet::UpdateChunks {
        name,
        bitfield: Bitfield::full(metadata.chunk_count),
    })]
}

// Periodic work ---------------------------------------------------------------

// Ask peers for the chunks still missing, for every download.
pub async fn request_missing_chunks(ctx: &NodeContext, now: Instant) -> Vec<Outbound> {
    let mut outbound = Vec::new();
    for download in ctx.all_downloads().await {
        outbound.extend(schedule(ctx, &download, now).await);
    }
    outbound
}

// Advertise the progress of every download, and ask for fresh peer lists.
pub async fn refresh_downloads(ctx: &NodeContext) -> Vec<Outbound> {
    let mut outbound = Vec::new();
    for download in ctx.all_downloads().await {
        if !download.is_ready() {
            continue;
        }
        let name = download.name().to_owned();
        outbound.push(Outbound::Tracker(Packet::UpdateChunks {
            name: name.clone(),
            bitfield: download.bitfield().await,
        }));
        outbound.push(Outbound::Tracker(Packet::UpdateFile { name }));
    }
    outbound
}

async fn schedule(ctx: &NodeContext, download: &ForDownloadFile, now: Instant) -> Vec<Outbound> {
    download
        .schedule_requests(now, ctx.config.chunk_timeout)
        .await
        .into_iter()
        .map(|(addr, chunk_indexes)| {
            Outbound::Peer(
                addr,
                Packet::RequestChunks {
                    name: download.name().to_owned(),
                    chunk_indexes,
                },
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "handlers_test.rs"]
mod handlers_test;
