use super::*;
use std::time::Duration;
use tokio::{net::TcpListener, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

// Connect a client to a freshly bound listener, and return both ends.
async fn connected_pair() -> AnyResult<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let client = TcpStream::connect(listener.local_addr()?).await?;
    let (server, _) = listener.accept().await?;
    Ok((client, server))
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ControlEvent>) -> AnyResult<ControlEvent> {
    timeout(WAIT, events.recv())
        .await?
        .ok_or_else(|| errors::anyerror!("event channel closed"))
}

#[tokio::test]
async fn test_control_exchange_in_order() -> AnyResult<()> {
    let (client, server) = connected_pair().await?;
    let (client, _client_events) = spawn_control(client)?;
    let (server, mut server_events) = spawn_control(server)?;
    assert_eq!(client.local_addr(), server.peer_addr());

    let packets = (0..50)
        .map(|idx| Packet::RequestFile {
            name: format!("file-{}", idx),
        })
        .collect::<Vec<_>>();
    for packet in packets.iter() {
        client.enqueue(packet.clone())?;
    }

    for expected in packets {
        match next_event(&mut server_events).await? {
            ControlEvent::Packet(packet) => assert_eq!(expected, packet),
            other => errors::bail!("unexpected event {:?}", other),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_control_packet_split_across_reads() -> AnyResult<()> {
    let (mut client, server) = connected_pair().await?;
    let (_server, mut server_events) = spawn_control(server)?;

    let expected = Packet::Chunk {
        name: "big".to_owned(),
        index: 3,
        content: vec![42; 3 * READ_BUF_SIZE],
    };
    let raw = expected.encode();
    let (head, tail) = raw.split_at(10);
    client.write_all(head).await?;
    client.flush().await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.write_all(tail).await?;

    match next_event(&mut server_events).await? {
        ControlEvent::Packet(packet) => assert_eq!(expected, packet),
        other => errors::bail!("unexpected event {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_control_protocol_error_closes() -> AnyResult<()> {
    let (mut client, server) = connected_pair().await?;
    let (_server, mut server_events) = spawn_control(server)?;

    client.write_all(&[0x42, 0, 0, 0]).await?;

    match next_event(&mut server_events).await? {
        ControlEvent::Closed(CloseReason::Protocol(CodecError::UnknownPacket(0x42))) => {}
        other => errors::bail!("unexpected event {:?}", other),
    }

    // The connection is really gone.
    let mut buf = [0u8; 1];
    let read = timeout(WAIT, client.read(&mut buf)).await?;
    assert!(matches!(read, Ok(0) | Err(_)));
    Ok(())
}

#[tokio::test]
async fn test_control_end_of_stream() -> AnyResult<()> {
    let (client, server) = connected_pair().await?;
    let (_server, mut server_events) = spawn_control(server)?;

    drop(client);

    match next_event(&mut server_events).await? {
        ControlEvent::Closed(CloseReason::EndOfStream) | ControlEvent::Closed(CloseReason::Io(_)) => {}
        other => errors::bail!("unexpected event {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_enqueue_on_closed_handle() {
    let (outbound, queue) = mpsc::unbounded_channel();
    let handle = ControlHandle::new("127.0.0.1:1".parse().unwrap(), "127.0.0.1:2".parse().unwrap(), outbound);
    drop(queue);

    assert!(handle
        .enqueue(Packet::RequestFile {
            name: "a".to_owned()
        })
        .is_err());
}

#[tokio::test]
async fn test_datagram_exchange() -> AnyResult<()> {
    let first = DatagramChannel::bind("127.0.0.1:0".parse()?).await?;
    let second = DatagramChannel::bind("127.0.0.1:0".parse()?).await?;
    let mut second_incoming = second.spawn_receiver();

    // Garbage is dropped, and doesn't stop the receiver.
    let raw_socket = UdpSocket::bind("127.0.0.1:0").await?;
    raw_socket.send_to(&[0x42, 1, 2], second.local_addr()?).await?;

    let packet = Packet::RequestChunks {
        name: "movie.mkv".to_owned(),
        chunk_indexes: vec![0, 4],
    };
    first.send(&packet, second.local_addr()?).await?;

    let (received, from) = timeout(WAIT, second_incoming.recv())
        .await?
        .ok_or_else(|| errors::anyerror!("receiver closed"))?;
    assert_eq!(packet, received);
    assert_eq!(first.local_addr()?, from);
    Ok(())
}

#[tokio::test]
async fn test_datagram_receiver_releases_socket() -> AnyResult<()> {
    let channel = DatagramChannel::bind("127.0.0.1:0".parse()?).await?;
    let addr = channel.local_addr()?;
    let incoming = channel.spawn_receiver();
    drop(incoming);
    drop(channel);

    // Nothing is ever received, the port still gets freed.
    for _ in 0..50 {
        if let Ok(rebound) = DatagramChannel::bind(addr).await {
            assert_eq!(addr, rebound.local_addr()?);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    errors::bail!("{} is still bound", addr)
}

#[tokio::test]
async fn test_datagram_too_big() -> AnyResult<()> {
    let channel = DatagramChannel::bind("127.0.0.1:0".parse()?).await?;
    let packet = Packet::Chunk {
        name: "big".to_owned(),
        index: 0,
        content: vec![0; MAX_DATAGRAM_SIZE],
    };
    assert!(channel.send(&packet, channel.local_addr()?).await.is_err());
    Ok(())
}
