use crate::{network::transport::MAX_DATAGRAM_SIZE, utils::div_ceil};
use errors::{AnyResult, Context};
use sha1::{Digest, Sha1};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use thiserror::Error;

// Chunk sizes are always a multiple of this block.
pub const CHUNK_BLOCK_SIZE: u64 = 16_000;
// Whatever the file size, it will never be split in more chunks than this.
pub const MAX_CHUNK_COUNT: u64 = 1 << 16;
// Room left in a datagram for the chunk packet header and the file name.
pub const CHUNK_HEADER_ROOM: u64 = 1024;
// A chunk must fit inside a single datagram, which caps the shareable size.
pub const MAX_CHUNK_SIZE: u64 =
    (MAX_DATAGRAM_SIZE as u64 - CHUNK_HEADER_ROOM) / CHUNK_BLOCK_SIZE * CHUNK_BLOCK_SIZE;
pub const MAX_FILE_SIZE: u64 = MAX_CHUNK_COUNT * MAX_CHUNK_SIZE;

// SHA-1 digest of a whole file or of a single chunk.
pub type Sha1Hash = [u8; 20];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashingError {
    #[error("file is empty")]
    EmptyFile,
    #[error("file of {size} bytes is bigger than the {max} bytes limit")]
    FileTooLarge { size: u64, max: u64 },
}

/// Everything the tracker and the downloaders need to know to split and
/// verify a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashes {
    pub size: u64,
    pub file_hash: Sha1Hash,
    pub chunk_hashes: Vec<Sha1Hash>,
}

// Size of every chunk of a file (the last one may be shorter).
// Rounded up to the block size, so the chunk count never exceeds
// `MAX_CHUNK_COUNT`.
pub const fn chunk_size(file_size: u64) -> u64 {
    div_ceil(file_size, MAX_CHUNK_COUNT * CHUNK_BLOCK_SIZE) * CHUNK_BLOCK_SIZE
}

// Number of chunks a file of the given size is split into.
pub const fn chunk_count(file_size: u64) -> u64 {
    if file_size == 0 {
        0
    } else {
        div_ceil(file_size, chunk_size(file_size))
    }
}

// Byte offset of a chunk inside its file.
pub const fn chunk_offset(index: u32, chunk_size: u64) -> u64 {
    index as u64 * chunk_size
}

pub fn hash_chunk(content: &[u8]) -> Sha1Hash {
    Sha1::digest(content).into()
}

// Whole content digest.
pub fn hash_content(content: &[u8]) -> Sha1Hash {
    Sha1::digest(content).into()
}

// Split the content into contiguous chunks and digest each of them.
pub fn hash_chunks(content: &[u8]) -> Result<Vec<Sha1Hash>, HashingError> {
    let size = check_size(content.len() as u64)?;
    Ok(content
        .chunks(chunk_size(size) as usize)
        .map(hash_chunk)
        .collect())
}

// Hash a file on the disk, chunk per chunk, without loading it in memory.
pub fn hash_file<P: AsRef<Path>>(path: P) -> AnyResult<FileHashes> {
    let file = File::open(&path)
        .with_context(|| format!("can't open {}", path.as_ref().display()))?;
    let size = check_size(file.metadata().context("can't get file size")?.len())?;
    let chunk_size = chunk_size(size);

    let mut reader = BufReader::new(file);
    let mut whole_file_hasher = Sha1::new();
    let mut chunk_hashes = Vec::with_capacity(chunk_count(size) as usize);
    let mut buf = vec![0u8; chunk_size as usize];

    for index in 0..chunk_count(size) {
        let len = chunk_size.min(size - index * chunk_size) as usize;
        reader
            .read_exact(&mut buf[..len])
            .with_context(|| format!("can't read chunk {}", index))?;
        whole_file_hasher.update(&buf[..len]);
        chunk_hashes.push(hash_chunk(&buf[..len]));
    }

    Ok(FileHashes {
        size,
        file_hash: whole_file_hasher.finalize().into(),
        chunk_hashes,
    })
}

fn check_size(size: u64) -> Result<u64, HashingError> {
    if size == 0 {
        return Err(HashingError::EmptyFile);
    }
    if size > MAX_FILE_SIZE {
        return Err(HashingError::FileTooLarge {
            size,
            max: MAX_FILE_SIZE,
        });
    }
    Ok(size)
}

#[cfg(test)]
#[path = "hashing_test.rs"]
mod hashing_test;
