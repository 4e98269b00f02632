use super::bitfield::Bitfield;
use crate::{
    file::hashing::Sha1Hash,
    utils::codec::{put_bytes, put_string, put_u16, put_u32, put_u32_list, put_u64, ByteReader, CodecError},
};
use std::fmt::Display;

// Protocol constants ----------------------------------------------------------

const INIT: u8 = 0x1;
const PUBLISH_FILE: u8 = 0x2;
const FILE_SUCCESS: u8 = 0x3;
const ALREADY_EXISTS: u8 = 0x4;
const NOT_FOUND: u8 = 0x5;
const REMOVE_FILE: u8 = 0x6;
const REQUEST_FILE: u8 = 0x7;
const ANSWER_FILE_WITH_NODES: u8 = 0x8;
const UPDATE_FILE: u8 = 0x9;
const ANSWER_NODES: u8 = 0xa;
const UPDATE_CHUNKS: u8 = 0xb;
const REQUEST_CHUNKS: u8 = 0xc;
const CHUNK: u8 = 0xd;

const PUBLISH_KIND: u8 = 0x0;
const REMOVE_KIND: u8 = 0x1;

// Packets ---------------------------------------------------------------------

/// Every message exchanged by trackers and nodes.
///
/// Each encoded packet starts with a one byte type, followed by its fixed size
/// fields, then its length prefixed fields. Packets are self-delimiting, so
/// they can be streamed back to back on the tracker connection as well as sent
/// one per datagram between nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    // node -> tracker, no reply.
    Init {
        identity: String,
        data_port: u16,
    },
    // node -> tracker, replied with FileSuccess or AlreadyExists.
    PublishFile {
        name: String,
        size: u64,
        file_hash: Sha1Hash,
        chunk_hashes: Vec<Sha1Hash>,
    },
    FileSuccess {
        name: String,
        kind: FileSuccessKind,
    },
    AlreadyExists {
        name: String,
    },
    NotFound {
        name: String,
    },
    // node -> tracker, replied with FileSuccess or NotFound.
    RemoveFile {
        name: String,
    },
    // node -> tracker, replied with AnswerFileWithNodes or NotFound.
    RequestFile {
        name: String,
    },
    AnswerFileWithNodes {
        name: String,
        size: u64,
        file_hash: Sha1Hash,
        chunk_hashes: Vec<Sha1Hash>,
        nodes: Vec<NodeInfo>,
    },
    // node -> tracker, replied with AnswerNodes when the file is tracked.
    UpdateFile {
        name: String,
    },
    AnswerNodes {
        name: String,
        nodes: Vec<NodeInfo>,
    },
    // node -> tracker, no reply.
    UpdateChunks {
        name: String,
        bitfield: Bitfield,
    },
    // node -> node, answered with zero or more Chunk.
    RequestChunks {
        name: String,
        chunk_indexes: Vec<u32>,
    },
    Chunk {
        name: String,
        index: u32,
        content: Vec<u8>,
    },
}

// Which request a FileSuccess acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSuccessKind {
    Publish,
    Remove,
}

// A node holding (part of) a file, as advertised by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub identity: String,
    pub data_port: u16,
    pub bitfield: Bitfield,
}

impl Packet {
    // Name of the file the packet is about. Init is the only packet without.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Packet::Init { .. } => None,
            Packet::PublishFile { name, .. }
            | Packet::FileSuccess { name, .. }
            | Packet::AlreadyExists { name }
            | Packet::NotFound { name }
            | Packet::RemoveFile { name }
            | Packet::RequestFile { name }
            | Packet::AnswerFileWithNodes { name, .. }
            | Packet::UpdateFile { name }
            | Packet::AnswerNodes { name, .. }
            | Packet::UpdateChunks { name, .. }
            | Packet::RequestChunks { name, .. }
            | Packet::Chunk { name, .. } => Some(name),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Init { .. } => "INIT",
            Packet::PublishFile { .. } => "PUBLISH_FILE",
            Packet::FileSuccess { .. } => "FILE_SUCCESS",
            Packet::AlreadyExists { .. } => "ALREADY_EXISTS",
            Packet::NotFound { .. } => "NOT_FOUND",
            Packet::RemoveFile { .. } => "REMOVE_FILE",
            Packet::RequestFile { .. } => "REQUEST_FILE",
            Packet::AnswerFileWithNodes { .. } => "ANSWER_FILE_WITH_NODES",
            Packet::UpdateFile { .. } => "UPDATE_FILE",
            Packet::AnswerNodes { .. } => "ANSWER_NODES",
            Packet::UpdateChunks { .. } => "UPDATE_CHUNKS",
            Packet::RequestChunks { .. } => "REQUEST_CHUNKS",
            Packet::Chunk { .. } => "CHUNK",
        }
    }

    // Encode the packet into a raw buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut res = Vec::new();
        match self {
            Packet::Init { identity, data_port } => {
                res.push(INIT);
                put_u16(&mut res, *data_port);
                put_string(&mut res, identity);
            }
            Packet::PublishFile {
                name,
                size,
                file_hash,
                chunk_hashes,
            } => {
                res.push(PUBLISH_FILE);
                put_u64(&mut res, *size);
                res.extend(file_hash);
                put_string(&mut res, name);
                put_hashes(&mut res, chunk_hashes);
            }
            Packet::FileSuccess { name, kind } => {
                res.push(FILE_SUCCESS);
                res.push(match kind {
                    FileSuccessKind::Publish => PUBLISH_KIND,
                    FileSuccessKind::Remove => REMOVE_KIND,
                });
                put_string(&mut res, name);
            }
            Packet::AlreadyExists { name } => put_named(&mut res, ALREADY_EXISTS, name),
            Packet::NotFound { name } => put_named(&mut res, NOT_FOUND, name),
            Packet::RemoveFile { name } => put_named(&mut res, REMOVE_FILE, name),
            Packet::RequestFile { name } => put_named(&mut res, REQUEST_FILE, name),
            Packet::UpdateFile { name } => put_named(&mut res, UPDATE_FILE, name),
            Packet::AnswerFileWithNodes {
                name,
                size,
                file_hash,
                chunk_hashes,
                nodes,
            } => {
                res.push(ANSWER_FILE_WITH_NODES);
                put_u64(&mut res, *size);
                res.extend(file_hash);
                put_string(&mut res, name);
                put_hashes(&mut res, chunk_hashes);
                put_nodes(&mut res, nodes);
            }
            Packet::AnswerNodes { name, nodes } => {
                res.push(ANSWER_NODES);
                put_string(&mut res, name);
                put_nodes(&mut res, nodes);
            }
            Packet::UpdateChunks { name, bitfield } => {
                res.push(UPDATE_CHUNKS);
                put_string(&mut res, name);
                put_bytes(&mut res, bitfield.as_bytes());
            }
            Packet::RequestChunks { name, chunk_indexes } => {
                res.push(REQUEST_CHUNKS);
                put_string(&mut res, name);
                put_u32_list(&mut res, chunk_indexes);
            }
            Packet::Chunk { name, index, content } => {
                res.push(CHUNK);
                put_u32(&mut res, *index);
                put_string(&mut res, name);
                put_bytes(&mut res, content);
            }
        }
        res
    }

    // Decode the first packet of a stream buffer. Return the packet and how
    // many bytes it used, or `Incomplete` when the buffer doesn't hold a whole
    // packet yet.
    pub fn decode(buf: &[u8]) -> Result<(Packet, usize), CodecError> {
        let mut reader = ByteReader::new(buf);
        let packet = match reader.u8()? {
            INIT => {
                let data_port = reader.u16()?;
                let identity = reader.string()?;
                Packet::Init { identity, data_port }
            }
            PUBLISH_FILE => {
                let size = reader.u64()?;
                let file_hash = reader.array()?;
                let name = reader.string()?;
                let chunk_hashes = reader.array_list()?;
                Packet::PublishFile {
                    name,
                    size,
                    file_hash,
                    chunk_hashes,
                }
            }
            FILE_SUCCESS => {
                let kind = match reader.u8()? {
                    PUBLISH_KIND => FileSuccessKind::Publish,
                    REMOVE_KIND => FileSuccessKind::Remove,
                    unknown => return Err(CodecError::UnknownFileSuccessKind(unknown)),
                };
                let name = reader.string()?;
                Packet::FileSuccess { name, kind }
            }
            ALREADY_EXISTS => Packet::AlreadyExists {
                name: reader.string()?,
            },
            NOT_FOUND => Packet::NotFound {
                name: reader.string()?,
            },
            REMOVE_FILE => Packet::RemoveFile {
                name: reader.string()?,
            },
            REQUEST_FILE => Packet::RequestFile {
                name: reader.string()?,
            },
            UPDATE_FILE => Packet::UpdateFile {
                name: reader.string()?,
            },
            ANSWER_FILE_WITH_NODES => {
                let size = reader.u64()?;
                let file_hash = reader.array()?;
                let name = reader.string()?;
                let chunk_hashes = reader.array_list()?;
                let nodes = read_nodes(&mut reader)?;
                Packet::AnswerFileWithNodes {
                    name,
                    size,
                    file_hash,
                    chunk_hashes,
                    nodes,
                }
            }
            ANSWER_NODES => {
                let name = reader.string()?;
                let nodes = read_nodes(&mut reader)?;
                Packet::AnswerNodes { name, nodes }
            }
            UPDATE_CHUNKS => {
                let name = reader.string()?;
                let bitfield = reader.bytes()?.into();
                Packet::UpdateChunks { name, bitfield }
            }
            REQUEST_CHUNKS => {
                let name = reader.string()?;
                let chunk_indexes = reader.u32_list()?;
                Packet::RequestChunks { name, chunk_indexes }
            }
            CHUNK => {
                let index = reader.u32()?;
                let name = reader.string()?;
                let content = reader.bytes()?;
                Packet::Chunk { name, index, content }
            }
            unknown => return Err(CodecError::UnknownPacket(unknown)),
        };
        Ok((packet, reader.position()))
    }
}

// Convert a packet to a raw buffer.
impl From<&Packet> for Vec<u8> {
    fn from(value: &Packet) -> Self {
        value.encode()
    }
}

// Convert a whole datagram into a packet. Unlike a stream, a datagram holds
// exactly one packet: missing or extra bytes are an error.
impl TryFrom<&[u8]> for Packet {
    type Error = CodecError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let (packet, used) = Packet::decode(value)?;
        if used != value.len() {
            return Err(CodecError::TrailingBytes(value.len() - used));
        }
        Ok(packet)
    }
}

impl Display for Packet {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.file_name() {
            Some(name) => write!(fmt, "{}({})", self.kind(), name),
            None => write!(fmt, "{}", self.kind()),
        }
    }
}

// Helpers ---------------------------------------------------------------------

fn put_named(buf: &mut Vec<u8>, order: u8, name: &str) {
    buf.push(order);
    put_string(buf, name);
}

fn put_hashes(buf: &mut Vec<u8>, hashes: &[Sha1Hash]) {
    put_u32(buf, hashes.len() as u32);
    for hash in hashes {
        buf.extend(hash);
    }
}

// Node list is count(4) + count*(port(2) + identity(4+) + bitfield(4+)).
fn put_nodes(buf: &mut Vec<u8>, nodes: &[NodeInfo]) {
    put_u32(buf, nodes.len() as u32);
    for node in nodes {
        put_u16(buf, node.data_port);
        put_string(buf, &node.identity);
        put_bytes(buf, node.bitfield.as_bytes());
    }
}

// Smallest encoded node: port(2) + empty identity(4) + empty bitfield(4).
const MIN_NODE_LEN: usize = 2 + 4 + 4;

fn read_nodes(reader: &mut ByteReader) -> Result<Vec<NodeInfo>, CodecError> {
    let count = reader.length(MIN_NODE_LEN)?;
    (0..count)
        .map(|_| {
            let data_port = reader.u16()?;
            let identity = reader.string()?;
            let bitfield = reader.bytes()?.into();
            Ok(NodeInfo {
                identity,
                data_port,
                bitfield,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod protocol_test;
