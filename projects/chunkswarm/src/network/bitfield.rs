/// Packed availability of the chunks of a file, one bit per chunk index.
///
/// Bit 0 of byte 0 is chunk 0, bit 7 of byte 0 is chunk 7, bit 0 of byte 1 is
/// chunk 8, and so on. Bits past the chunk count are meaningless and ignored
/// by the consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bitfield(Vec<u8>);

impl Bitfield {
    // Bitfield with room for `chunk_count` chunks, none of them set.
    pub fn new(chunk_count: u32) -> Self {
        Self(vec![0; byte_len(chunk_count)])
    }

    // Bitfield with every chunk set.
    pub fn full(chunk_count: u32) -> Self {
        Self::encode(0..chunk_count, chunk_count)
    }

    // Build a bitfield from a set of chunk indexes. Indexes out of
    // `chunk_count` are dropped.
    pub fn encode<I>(indexes: I, chunk_count: u32) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut bitfield = Self::new(chunk_count);
        for index in indexes.into_iter().filter(|index| *index < chunk_count) {
            bitfield.set(index);
        }
        bitfield
    }

    // Ordered list of every set chunk index.
    pub fn decode(&self) -> Vec<u32> {
        self.iter().collect()
    }

    // Ordered list of every set chunk index below `chunk_count`.
    pub fn decode_bounded(&self, chunk_count: u32) -> Vec<u32> {
        self.iter().take_while(|index| *index < chunk_count).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().enumerate().flat_map(|(byte_idx, byte)| {
            (0..8u32)
                .filter(move |bit| byte & (1 << bit) != 0)
                .map(move |bit| byte_idx as u32 * 8 + bit)
        })
    }

    // Mark a chunk as available, growing the bitfield when needed.
    pub fn set(&mut self, index: u32) {
        let byte_idx = (index / 8) as usize;
        if byte_idx >= self.0.len() {
            self.0.resize(byte_idx + 1, 0);
        }
        self.0[byte_idx] |= 1 << (index % 8);
    }

    pub fn has(&self, index: u32) -> bool {
        self.0
            .get((index / 8) as usize)
            .map_or(false, |byte| byte & (1 << (index % 8)) != 0)
    }

    // Number of chunks set.
    pub fn count(&self) -> usize {
        self.0.iter().map(|byte| byte.count_ones() as usize).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bitfield {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<Bitfield> for Vec<u8> {
    fn from(value: Bitfield) -> Self {
        value.0
    }
}

fn byte_len(chunk_count: u32) -> usize {
    (chunk_count as usize + 7) / 8
}

#[cfg(test)]
#[path = "bitfield_test.rs"]
mod bitfield_test;
