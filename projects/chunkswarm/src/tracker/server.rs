use super::registry::Registry;
use crate::{
    log,
    network::transport::{spawn_control, ControlEvent},
};
use errors::{AnyResult, Context};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};

// Accept node connections, and answer their control packets from a shared
// registry.
pub struct Tracker {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Tracker {
    // CONSTRUCTOR -------------------------------------------------------------

    // Bind the control listener. Expect an address like "0.0.0.0:9090".
    pub async fn bind(addr: SocketAddr) -> AnyResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("can't listen on {}", addr))?;
        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
        })
    }

    // Real listening address, useful when bound on port 0.
    pub fn local_addr(&self) -> AnyResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    // SERVER ------------------------------------------------------------------

    // Accept all incoming connections forever, each one served by its own
    // task.
    pub async fn run(self) -> AnyResult<()> {
        log!(info, "tracker listening on {}", self.local_addr()?);
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    log!(warn, "can't accept a connection: {}", err);
                    continue;
                }
            };
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                if let Err(err) = serve_connection(registry, stream).await {
                    log!(error, "[{}] connection failed: {:?}", addr, err);
                }
            });
        }
    }
}

// Serve a node until its connection closes, then forget it.
async fn serve_connection(registry: Arc<Registry>, stream: TcpStream) -> AnyResult<()> {
    let (control, mut events) = spawn_control(stream)?;
    let conn = control.peer_addr();
    log!(info, "[{}] connected", conn);

    while let Some(event) = events.recv().await {
        match event {
            ControlEvent::Packet(packet) => {
                if let Some(reply) = registry.dispatch(&control, packet).await {
                    if let Err(err) = control.enqueue(reply) {
                        log!(warn, "[{}] {}", conn, err);
                        break;
                    }
                }
            }
            ControlEvent::Closed(reason) => {
                log!(info, "[{}] disconnected: {}", conn, reason);
                break;
            }
        }
    }

    registry.handle_disconnect(conn).await;
    Ok(())
}
