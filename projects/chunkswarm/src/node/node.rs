use super::{
    commands,
    config::NodeConfig,
    context::{NodeContext, Outbound},
    handlers,
    status::NodeStatus,
};
use crate::{
    log,
    network::{
        protocol::Packet,
        transport::{spawn_control, ControlEvent, ControlHandle, DatagramChannel},
    },
};
use errors::{bail, AnyResult, Context};
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::Path,
    sync::Arc,
    time::Instant,
};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

// Send what the node logic produced, on the right channel.
#[derive(Debug, Clone)]
struct Router {
    control: ControlHandle,
    data: DatagramChannel,
}

impl Router {
    async fn route(&self, outbound: Vec<Outbound>) {
        for out in outbound {
            match out {
                Outbound::Tracker(packet) => {
                    if let Err(err) = self.control.enqueue(packet) {
                        log!(error, "{:#}", err);
                    }
                }
                Outbound::Peer(addr, packet) => {
                    if let Err(err) = self.data.send(&packet, addr).await {
                        log!(warn, "{:#}", err);
                    }
                }
            }
        }
    }
}

/// A running node: connected to its tracker, serving and downloading chunks
/// over its datagram socket.
///
/// The session ends when the tracker connection is lost, there is no
/// reconnection.
pub struct Node {
    ctx: Arc<NodeContext>,
    router: Router,
    task: JoinHandle<AnyResult<()>>,
}

impl Node {
    // CONSTRUCTOR -------------------------------------------------------------

    // Connect to the tracker, announce this node, and start processing
    // packets and timers in the background.
    pub async fn start(config: NodeConfig) -> AnyResult<Self> {
        let stream = TcpStream::connect(config.tracker_addr)
            .await
            .with_context(|| format!("can't connect to the tracker at {}", config.tracker_addr))?;
        let data = DatagramChannel::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.data_port))).await?;
        let (control, events) = spawn_control(stream)?;

        let identity = config
            .identity
            .clone()
            .unwrap_or_else(|| control.local_addr().ip().to_string());
        let data_port = data.local_addr()?.port();
        let datagrams = data.spawn_receiver();

        control.enqueue(Packet::Init {
            identity: identity.clone(),
            data_port,
        })?;
        log!(
            info,
            "node {} connected to {}, data port {}",
            identity,
            control.peer_addr(),
            data_port
        );

        let ctx = Arc::new(NodeContext::new(identity, data_port, config));
        let router = Router { control, data };
        let task = tokio::spawn(event_loop(Arc::clone(&ctx), router.clone(), events, datagrams));

        Ok(Self { ctx, router, task })
    }

    pub fn context(&self) -> Arc<NodeContext> {
        Arc::clone(&self.ctx)
    }

    pub fn identity(&self) -> &str {
        &self.ctx.identity
    }

    pub fn data_port(&self) -> u16 {
        self.ctx.data_port
    }

    // FILES -------------------------------------------------------------------

    // Publish a file, or every file of a directory.
    pub async fn publish<P: AsRef<Path>>(&self, path: P) -> AnyResult<()> {
        let outbound = commands::publish(&self.ctx, path.as_ref()).await?;
        self.router.route(outbound).await;
        Ok(())
    }

    // Download a file into the download directory.
    pub async fn request(&self, name: &str) -> AnyResult<()> {
        let outbound = commands::request(&self.ctx, name).await?;
        self.router.route(outbound).await;
        Ok(())
    }

    // Stop sharing a file, network wide.
    pub async fn remove(&self, name: &str) -> AnyResult<()> {
        let outbound = commands::remove(&self.ctx, name).await?;
        self.router.route(outbound).await;
        Ok(())
    }

    pub async fn status(&self) -> NodeStatus {
        self.ctx.status().await
    }

    // SESSION -----------------------------------------------------------------

    // Wait for the end of the session. Always an error: the tracker connection
    // was lost.
    pub async fn wait(self) -> AnyResult<()> {
        self.task.await?
    }

    // Stop processing packets and timers.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn event_loop(
    ctx: Arc<NodeContext>,
    router: Router,
    mut events: mpsc::UnboundedReceiver<ControlEvent>,
    mut datagrams: mpsc::UnboundedReceiver<(Packet, SocketAddr)>,
) -> AnyResult<()> {
    let mut tick = interval(ctx.config.tick);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut refresh = interval(ctx.config.refresh);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ControlEvent::Packet(packet)) => {
                    let outbound = handlers::handle_tracker_packet(&ctx, packet).await;
                    router.route(outbound).await;
                }
                Some(ControlEvent::Closed(reason)) => bail!("lost the tracker connection: {}", reason),
                None => bail!("lost the tracker connection"),
            },
            Some((packet, from)) = datagrams.recv() => {
                // Serving chunks reads the disk, don't hold the loop meanwhile.
                let ctx = Arc::clone(&ctx);
                let router = router.clone();
                tokio::spawn(async move {
                    let outbound = handlers::handle_peer_packet(&ctx, packet, from).await;
                    router.route(outbound).await;
                });
            }
            _ = tick.tick() => {
                let outbound = handlers::request_missing_chunks(&ctx, Instant::now()).await;
                router.route(outbound).await;
            }
            _ = refresh.tick() => {
                let outbound = handlers::refresh_downloads(&ctx).await;
                router.route(outbound).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
