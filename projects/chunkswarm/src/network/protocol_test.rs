use super::*;
use errors::AnyResult;

fn sample_nodes() -> Vec<NodeInfo> {
    vec![
        NodeInfo {
            identity: "node1.lan".to_owned(),
            data_port: 9091,
            bitfield: Bitfield::encode([0, 1], 2),
        },
        NodeInfo {
            identity: "10.0.0.2".to_owned(),
            data_port: 9092,
            bitfield: Bitfield::new(2),
        },
    ]
}

// One value of every packet variant.
fn all_packets() -> Vec<Packet> {
    let chunk_hashes = vec![[1; 20], [2; 20]];
    vec![
        Packet::Init {
            identity: "node1.lan".to_owned(),
            data_port: 9091,
        },
        Packet::PublishFile {
            name: "movie.mkv".to_owned(),
            size: 32_000,
            file_hash: [9; 20],
            chunk_hashes: chunk_hashes.clone(),
        },
        Packet::FileSuccess {
            name: "movie.mkv".to_owned(),
            kind: FileSuccessKind::Publish,
        },
        Packet::FileSuccess {
            name: "movie.mkv".to_owned(),
            kind: FileSuccessKind::Remove,
        },
        Packet::AlreadyExists {
            name: "movie.mkv".to_owned(),
        },
        Packet::NotFound {
            name: "movie.mkv".to_owned(),
        },
        Packet::RemoveFile {
            name: "movie.mkv".to_owned(),
        },
        Packet::RequestFile {
            name: "movie.mkv".to_owned(),
        },
        Packet::AnswerFileWithNodes {
            name: "movie.mkv".to_owned(),
            size: 32_000,
            file_hash: [9; 20],
            chunk_hashes,
            nodes: sample_nodes(),
        },
        Packet::UpdateFile {
            name: "movie.mkv".to_owned(),
        },
        Packet::AnswerNodes {
            name: "movie.mkv".to_owned(),
            nodes: vec![],
        },
        Packet::UpdateChunks {
            name: "movie.mkv".to_owned(),
            bitfield: Bitfield::encode([1], 2),
        },
        Packet::RequestChunks {
            name: "movie.mkv".to_owned(),
            chunk_indexes: vec![0, 1],
        },
        Packet::Chunk {
            name: "movie.mkv".to_owned(),
            index: 1,
            content: vec![0xca, 0xfe],
        },
    ]
}

#[test]
fn test_init_layout() {
    let packet = Packet::Init {
        identity: "n1".to_owned(),
        data_port: 9091,
    };
    #[rustfmt::skip]
    assert_eq!(vec![
            0x1,
            0x23, 0x83,
            0, 0, 0, 2, 110, 49,
        ],
        packet.encode()
    );
}

#[test]
fn test_chunk_layout() {
    let packet = Packet::Chunk {
        name: "a".to_owned(),
        index: 258,
        content: vec![7, 8, 9],
    };
    #[rustfmt::skip]
    assert_eq!(vec![
            0xd,
            0, 0, 1, 2,
            0, 0, 0, 1, 97,
            0, 0, 0, 3, 7, 8, 9,
        ],
        Vec::<u8>::from(&packet)
    );
}

#[test]
fn test_round_trip() -> AnyResult<()> {
    for packet in all_packets() {
        let raw = packet.encode();

        let (decoded, used) = Packet::decode(&raw)?;
        assert_eq!(packet, decoded);
        assert_eq!(raw.len(), used);

        assert_eq!(packet, Packet::try_from(raw.as_slice())?);
    }
    Ok(())
}

#[test]
fn test_every_truncation_is_incomplete() {
    for packet in all_packets() {
        let raw = packet.encode();
        for len in 0..raw.len() {
            let err = Packet::decode(&raw[..len]).unwrap_err();
            assert!(err.is_incomplete(), "{} cut at {}: {}", packet, len, err);
        }
    }
}

#[test]
fn test_stream_of_packets() -> AnyResult<()> {
    let packets = all_packets();
    let stream = packets.iter().flat_map(Packet::encode).collect::<Vec<u8>>();

    let mut decoded = Vec::new();
    let mut shift = 0;
    while shift < stream.len() {
        let (packet, used) = Packet::decode(&stream[shift..])?;
        decoded.push(packet);
        shift += used;
    }

    assert_eq!(packets, decoded);
    Ok(())
}

#[test]
fn test_unknown_packet() {
    assert_eq!(Err(CodecError::UnknownPacket(0)), Packet::decode(&[0]));
    assert_eq!(Err(CodecError::UnknownPacket(0x42)), Packet::decode(&[0x42, 0, 0]));
    assert_eq!(
        Err(CodecError::UnknownPacket(0xff)),
        Packet::try_from([0xffu8].as_slice())
    );
}

#[test]
fn test_unknown_file_success_kind() {
    assert_eq!(
        Err(CodecError::UnknownFileSuccessKind(7)),
        Packet::decode(&[0x3, 7, 0, 0, 0, 0])
    );
}

#[test]
fn test_reject_forged_node_count() {
    let mut raw = vec![0xa];
    put_string(&mut raw, "a");
    put_u32(&mut raw, u32::MAX);
    for _ in 0..1000 {
        put_u16(&mut raw, 9091);
        put_string(&mut raw, "node");
        put_bytes(&mut raw, &[1]);
    }

    let err = Packet::decode(&raw).unwrap_err();
    assert!(matches!(err, CodecError::TooLarge { .. }));
    assert!(!err.is_incomplete());

    // Same for the nodes trailing a file answer.
    let mut raw = Packet::AnswerFileWithNodes {
        name: "a".to_owned(),
        size: 1,
        file_hash: [0; 20],
        chunk_hashes: vec![[0; 20]],
        nodes: vec![],
    }
    .encode();
    let len = raw.len();
    raw[len - 4..].copy_from_slice(&u32::MAX.to_be_bytes());
    assert!(matches!(
        Packet::decode(&raw),
        Err(CodecError::TooLarge { .. })
    ));
}

#[test]
fn test_datagram_with_trailing_bytes() {
    let mut raw = Packet::RequestFile {
        name: "a".to_owned(),
    }
    .encode();
    raw.extend([1, 2]);

    assert_eq!(
        Err(CodecError::TrailingBytes(2)),
        Packet::try_from(raw.as_slice())
    );
}

#[test]
fn test_display() {
    let packet = Packet::RequestFile {
        name: "movie.mkv".to_owned(),
    };
    assert_eq!("REQUEST_FILE(movie.mkv)", packet.to_string());

    let packet = Packet::Init {
        identity: "n1".to_owned(),
        data_port: 1,
    };
    assert_eq!("INIT", packet.to_string());
    assert_eq!(None, packet.file_name());
}
