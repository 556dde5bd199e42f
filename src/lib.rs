pub mod cluster;
pub mod config;
pub mod swim;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::cluster::{SwimActor, Transport};
use crate::config::ENV;
use crate::swim::Node;

#[derive(Debug)]
pub struct StartUp;

impl StartUp {
    pub async fn run(self) -> Result<()> {
        let bind_addr: std::net::SocketAddr = ENV.bind_addr().parse()?;
        // A fresh UID per process so restarts are distinguishable from the
        // previous incarnation of this endpoint.
        let myself = Node::with_uid(bind_addr, rand::random());

        let (command_tx, command_rx) = mpsc::channel(1024);
        let (outbound_tx, outbound_rx) = mpsc::channel(1024);
        let (events_tx, mut events_rx) = mpsc::channel(1024);

        let transport = Transport::bind(&ENV.bind_addr(), command_tx.clone(), outbound_rx).await?;
        let actor = SwimActor::new(
            myself,
            ENV.swim_settings(),
            &ENV.seeds,
            command_rx,
            command_tx,
            outbound_tx,
            events_tx,
        );

        tokio::spawn(transport.run());
        tokio::spawn(actor.run());

        while let Some(change) = events_rx.recv().await {
            tracing::info!("membership changed: {change}");
        }
        Ok(())
    }
}
