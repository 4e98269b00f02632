use super::hashing::chunk_offset;
use errors::{AnyResult, Context};
use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
};

// Read chunks of a local file, to serve them to other nodes.
pub struct ChunkReader {
    chunk_size: u64,
    reader: BufReader<File>,
}

impl ChunkReader {
    // Open an already existing file. File must exists.
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: u64) -> AnyResult<Self> {
        let file = File::open(&path)
            .with_context(|| format!("can't open {}", path.as_ref().display()))?;
        Ok(Self {
            chunk_size,
            reader: BufReader::new(file),
        })
    }

    // Read a chunk by its index. Reads up to a chunk size: the last chunk of a
    // file is shorter, and a chunk past the end of the file is empty.
    pub fn read_chunk(&mut self, index: u32) -> AnyResult<Vec<u8>> {
        self.reader
            .seek(SeekFrom::Start(chunk_offset(index, self.chunk_size)))
            .with_context(|| format!("can't seek to chunk {}", index))?;

        let mut buf = Vec::with_capacity(self.chunk_size as usize);
        (&mut self.reader)
            .take(self.chunk_size)
            .read_to_end(&mut buf)
            .with_context(|| format!("can't read chunk {}", index))?;
        Ok(buf)
    }
}
