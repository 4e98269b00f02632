use super::{
    context::{NodeContext, Outbound},
    download::{ForDownloadFile, MAX_CHUNKS_PER_REQUEST},
};
use crate::{file::chunk_reader::ChunkReader, log, network::protocol::Packet};
use errors::AnyResult;
use std::{net::SocketAddr, path::PathBuf};

// Where the requested chunks are read from: a published file, or the chunks
// already downloaded of a file in progress.
struct ChunkSource {
    path: PathBuf,
    chunk_size: u64,
    indexes: Vec<u32>,
}

// Answer a chunk request with one `Chunk` per requested index this node has.
// Unknown files and chunks are ignored, the requester will ask someone else.
pub async fn serve_chunks(ctx: &NodeContext, name: String, indexes: Vec<u32>, from: SocketAddr) -> Vec<Outbound> {
    let mut source = match find_source(ctx, &name, indexes).await {
        Some(source) => source,
        None => {
            log!(warn, "{} asked for {}, which is not shared here", from, name);
            return Vec::new();
        }
    };
    if source.indexes.len() > MAX_CHUNKS_PER_REQUEST {
        log!(
            warn,
            "{} asked for {} chunks of {} at once, serving the first {}",
            from,
            source.indexes.len(),
            name,
            MAX_CHUNKS_PER_REQUEST
        );
        source.indexes.truncate(MAX_CHUNKS_PER_REQUEST);
    }

    let read = tokio::task::spawn_blocking(move || read_chunks(&source)).await;
    let chunks = match read {
        Ok(Ok(chunks)) => chunks,
        Ok(Err(err)) => {
            log!(error, "can't serve {} to {}: {:#}", name, from, err);
            return Vec::new();
        }
        Err(err) => {
            log!(error, "can't serve {} to {}: {}", name, from, err);
            return Vec::new();
        }
    };

    chunks
        .into_iter()
        .map(|(index, content)| {
            Outbound::Peer(
                from,
                Packet::Chunk {
                    name: name.clone(),
                    index,
                    content,
                },
            )
        })
        .collect()
}

async fn find_source(ctx: &NodeContext, name: &str, indexes: Vec<u32>) -> Option<ChunkSource> {
    if let Some(file) = ctx.published.read().await.get(name) {
        let chunk_count = file.chunk_count();
        return Some(ChunkSource {
            path: file.path.clone(),
            chunk_size: file.chunk_size(),
            indexes: indexes.into_iter().filter(|index| *index < chunk_count).collect(),
        });
    }

    let download = ctx.download(name).await?;
    downloaded_source(&download, indexes)
}

// Only chunks already on the disk can be read back, queued ones are skipped.
fn downloaded_source(download: &ForDownloadFile, indexes: Vec<u32>) -> Option<ChunkSource> {
    let metadata = download.metadata()?;
    Some(ChunkSource {
        path: metadata.path.clone(),
        chunk_size: metadata.chunk_size,
        indexes: indexes
            .into_iter()
            .filter(|index| download.is_written(*index))
            .collect(),
    })
}

// Any failure aborts the whole request.
fn read_chunks(source: &ChunkSource) -> AnyResult<Vec<(u32, Vec<u8>)>> {
    if source.indexes.is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = ChunkReader::open(&source.path, source.chunk_size)?;
    source
        .indexes
        .iter()
        .map(|index| Ok((*index, reader.read_chunk(*index)?)))
        .collect()
}
