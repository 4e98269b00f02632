use super::protocol::Packet;
use crate::{log, utils::codec::CodecError};
use errors::{AnyResult, Context};
use std::{fmt::Display, net::SocketAddr, sync::Arc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream, UdpSocket,
    },
    sync::mpsc,
    task::JoinHandle,
};

const READ_BUF_SIZE: usize = 8 * 1024;
// Biggest payload an UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

// Control channel -------------------------------------------------------------

// What happened on a control connection, reported to its owner.
#[derive(Debug)]
pub enum ControlEvent {
    Packet(Packet),
    Closed(CloseReason),
}

#[derive(Debug)]
pub enum CloseReason {
    // The remote side closed the connection.
    EndOfStream,
    // The remote side sent something which is not a packet.
    Protocol(CodecError),
    Io(std::io::Error),
    // Nobody listens to the events anymore.
    OwnerGone,
}

impl Display for CloseReason {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::EndOfStream => write!(fmt, "connection closed by peer"),
            CloseReason::Protocol(err) => write!(fmt, "protocol error: {}", err),
            CloseReason::Io(err) => write!(fmt, "i/o error: {}", err),
            CloseReason::OwnerGone => write!(fmt, "connection dropped locally"),
        }
    }
}

// Sending side of a control connection. Packets are queued, and written in
// order by a dedicated task.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Packet>,
}

impl ControlHandle {
    pub fn new(peer_addr: SocketAddr, local_addr: SocketAddr, outbound: mpsc::UnboundedSender<Packet>) -> Self {
        Self {
            peer_addr,
            local_addr,
            outbound,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    // Queue a packet. Fails only once the connection is gone.
    pub fn enqueue(&self, packet: Packet) -> AnyResult<()> {
        self.outbound
            .send(packet)
            .map_err(|err| errors::anyerror!("connection to {} is closed, can't send {}", self.peer_addr, err.0))
    }
}

// Take ownership of a connected stream: spawn its read loop and its outbound
// queue writer. Received packets and the final close are reported as events.
pub fn spawn_control(stream: TcpStream) -> AnyResult<(ControlHandle, mpsc::UnboundedReceiver<ControlEvent>)> {
    let peer_addr = stream.peer_addr().context("can't get peer address")?;
    let local_addr = stream.local_addr().context("can't get local address")?;
    let (reader, writer) = stream.into_split();

    let (outbound, queue) = mpsc::unbounded_channel();
    let (events, events_receiver) = mpsc::unbounded_channel();

    let writer_task = tokio::spawn(drain_outbound(writer, queue, events.clone()));
    tokio::spawn(read_loop(reader, events, writer_task));

    Ok((ControlHandle::new(peer_addr, local_addr, outbound), events_receiver))
}

async fn drain_outbound(
    writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<Packet>,
    events: mpsc::UnboundedSender<ControlEvent>,
) {
    let mut writer = tokio::io::BufWriter::new(writer);
    while let Some(packet) = queue.recv().await {
        let raw = packet.encode();
        let written = async {
            writer.write_all(&raw).await?;
            writer.flush().await
        };
        if let Err(err) = written.await {
            let _ = events.send(ControlEvent::Closed(CloseReason::Io(err)));
            return;
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    events: mpsc::UnboundedSender<ControlEvent>,
    writer_task: JoinHandle<()>,
) {
    let reason = read_packets(&mut reader, &events).await;
    writer_task.abort();
    let _ = events.send(ControlEvent::Closed(reason));
}

// Read the stream until it ends, decoding every complete packet as soon as
// its last byte arrives.
async fn read_packets(reader: &mut OwnedReadHalf, events: &mpsc::UnboundedSender<ControlEvent>) -> CloseReason {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        loop {
            match Packet::decode(&pending) {
                Ok((packet, used)) => {
                    pending.drain(..used);
                    if events.send(ControlEvent::Packet(packet)).is_err() {
                        return CloseReason::OwnerGone;
                    }
                }
                Err(err) if err.is_incomplete() => break,
                Err(err) => return CloseReason::Protocol(err),
            }
        }

        match reader.read(&mut buf).await {
            Ok(0) => return CloseReason::EndOfStream,
            Ok(len) => pending.extend_from_slice(&buf[..len]),
            Err(err) => return CloseReason::Io(err),
        }
    }
}

// Datagram channel ------------------------------------------------------------

// One socket shared by every exchange with other nodes. Nothing sent through
// it is guaranteed to arrive, nor to arrive in order.
#[derive(Debug, Clone)]
pub struct DatagramChannel {
    socket: Arc<UdpSocket>,
}

impl DatagramChannel {
    pub async fn bind(addr: SocketAddr) -> AnyResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("can't bind udp socket on {}", addr))?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> AnyResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn send(&self, packet: &Packet, to: SocketAddr) -> AnyResult<()> {
        let raw = packet.encode();
        if raw.len() > MAX_DATAGRAM_SIZE {
            errors::bail!("{} is too big for a datagram ({} bytes)", packet, raw.len());
        }
        self.socket
            .send_to(&raw, to)
            .await
            .with_context(|| format!("can't send {} to {}", packet, to))?;
        Ok(())
    }

    // Start receiving datagrams. Malformed ones are dropped, the others are
    // reported with their sender address. Stops as soon as the receiver is
    // dropped, even if nothing arrives anymore.
    pub fn spawn_receiver(&self) -> mpsc::UnboundedReceiver<(Packet, SocketAddr)> {
        let (incoming, receiver) = mpsc::unbounded_channel();
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
            loop {
                let received = tokio::select! {
                    _ = incoming.closed() => return,
                    received = socket.recv_from(&mut buf) => received,
                };
                let (len, from) = match received {
                    Ok(received) => received,
                    Err(err) => {
                        // Usually an ICMP error from a previous send, not fatal.
                        log!(warn, "can't receive datagram: {}", err);
                        continue;
                    }
                };
                match Packet::try_from(&buf[..len]) {
                    Ok(packet) => {
                        if incoming.send((packet, from)).is_err() {
                            return;
                        }
                    }
                    Err(err) => log!(warn, "dropping datagram of {} bytes from {}: {}", len, from, err),
                }
            }
        });

        receiver
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;
