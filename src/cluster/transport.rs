// ==========================================
// TRANSPORT LAYER
// ==========================================

use std::sync::Arc;

use tokio::{net::UdpSocket, sync::mpsc};

use super::{OutboundMessage, SwimCommand, WIRE_CONFIG};

pub struct Transport {
    socket: Arc<UdpSocket>,
    to_actor: mpsc::Sender<SwimCommand>,
    from_actor: mpsc::Receiver<OutboundMessage>,
}

impl Transport {
    pub async fn bind(
        bind_addr: &str,
        to_actor: mpsc::Sender<SwimCommand>,
        from_actor: mpsc::Receiver<OutboundMessage>,
    ) -> anyhow::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        Ok(Self {
            socket,
            to_actor,
            from_actor,
        })
    }

    pub async fn run(mut self) {
        tracing::info!(
            "transport listening on {}",
            self.socket.local_addr().expect("socket is bound")
        );

        let mut buf = [0u8; 8192];
        loop {
            tokio::select! {
                // INCOMING: socket -> decode -> actor
                Ok((len, src)) = self.socket.recv_from(&mut buf) => {
                    match bincode::decode_from_slice(&buf[..len], WIRE_CONFIG) {
                        Ok((message, _)) => {
                            let _ = self
                                .to_actor
                                .send(SwimCommand::MessageReceived { src, message })
                                .await;
                        }
                        // A malformed datagram never reaches the state
                        // machine; drop it and move on.
                        Err(e) => tracing::warn!("failed to decode datagram from {}: {}", src, e),
                    }
                }

                // OUTGOING: actor -> encode -> socket
                Some(outbound) = self.from_actor.recv() => {
                    match bincode::encode_to_vec(outbound.message(), WIRE_CONFIG) {
                        Ok(bytes) => {
                            let _ = self.socket.send_to(&bytes, outbound.target).await;
                        }
                        Err(e) => tracing::warn!("failed to encode message: {}", e),
                    }
                }
            }
        }
    }
}
