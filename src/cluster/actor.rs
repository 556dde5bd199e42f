// ==========================================
// PROTOCOL LAYER (SWIM actor)
// ==========================================

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{OutboundMessage, WireMessage};
use crate::swim::{
    ConfirmDeadDirective, GossipProcessed, MemberStatusChange, Node, PingDirective,
    PingRequestDirective, PingRequestResponseDirective, PingResponse, PingResponseDirective,
    Status, Swim, SwimSettings, TickDirective,
};

/// Inputs serialized into the actor mailbox. One event is in flight at a
/// time; the state machine never sees concurrency.
#[derive(Debug)]
pub enum SwimCommand {
    MessageReceived {
        src: SocketAddr,
        message: WireMessage,
    },
    ProbeTimedOut {
        sequence_number: u64,
    },
    ConfirmDead {
        node: Node,
    },
}

/// What a given sequence number is waiting on.
#[derive(Debug)]
enum InFlight {
    /// A ping we sent, directly or as a proxy. For proxy probes,
    /// `origin_sequence_number` is the number the origin used in its
    /// ping-request, so the relayed ack or nack is labelled in terms the
    /// origin can correlate.
    DirectProbe {
        target: Node,
        ping_request_origin: Option<Node>,
        origin_sequence_number: Option<u64>,
    },
    /// A ping-request we fanned out; an intermediary answers with a relayed
    /// ack or a nack, or the timer fires first.
    PingRequestProbe { target: Node },
}

pub struct SwimActor {
    mailbox: mpsc::Receiver<SwimCommand>,
    self_tx: mpsc::Sender<SwimCommand>,
    transport_tx: mpsc::Sender<OutboundMessage>,
    events_tx: mpsc::Sender<MemberStatusChange>,
    state: Swim,
    in_flight: HashMap<u64, InFlight>,
}

impl SwimActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        myself: Node,
        settings: SwimSettings,
        seeds: &[SocketAddr],
        mailbox: mpsc::Receiver<SwimCommand>,
        self_tx: mpsc::Sender<SwimCommand>,
        transport_tx: mpsc::Sender<OutboundMessage>,
        events_tx: mpsc::Sender<MemberStatusChange>,
    ) -> Self {
        let mut state = Swim::new(myself, settings);
        for &seed in seeds.iter().filter(|&&addr| addr != myself.addr) {
            // Half-known until the first successful contact replaces the
            // record with a UID-bearing identity.
            state.add_member(Node::new(seed), Status::Alive { incarnation: 0 });
        }

        Self {
            mailbox,
            self_tx,
            transport_tx,
            events_tx,
            state,
            in_flight: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        tracing::info!("swim actor started as {}", self.state.my_node());

        let mut period_started = Instant::now();
        let mut next_tick = period_started + self.state.dynamic_probe_interval();
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {
                    self.on_tick().await;
                    period_started = Instant::now();
                    next_tick = period_started + self.state.dynamic_probe_interval();
                }
                command = self.mailbox.recv() => match command {
                    Some(command) => {
                        self.handle_command(command).await;
                        // Local-health changes stretch or shrink the current
                        // period immediately, not one period late.
                        next_tick = period_started + self.state.dynamic_probe_interval();
                    }
                    None => return,
                },
            }
        }
    }

    async fn on_tick(&mut self) {
        for directive in self.state.on_periodic_ping_tick() {
            match directive {
                TickDirective::MembershipChanged(change) => self.publish(change).await,
                TickDirective::SendPing {
                    target,
                    payload,
                    timeout,
                    sequence_number,
                } => {
                    self.send(
                        target.addr,
                        WireMessage::Ping {
                            sequence_number,
                            origin: self.state.my_node(),
                            payload,
                        },
                    )
                    .await;
                    self.in_flight.insert(
                        sequence_number,
                        InFlight::DirectProbe {
                            target,
                            ping_request_origin: None,
                            origin_sequence_number: None,
                        },
                    );
                    self.arm_probe_timer(sequence_number, timeout);
                }
            }
        }
    }

    async fn handle_command(&mut self, command: SwimCommand) {
        match command {
            SwimCommand::MessageReceived { src, message } => {
                self.handle_message(src, message).await
            }
            SwimCommand::ProbeTimedOut { sequence_number } => {
                self.handle_probe_timeout(sequence_number).await
            }
            SwimCommand::ConfirmDead { node } => match self.state.confirm_dead(node) {
                ConfirmDeadDirective::Applied { change } => self.publish(change).await,
                ConfirmDeadDirective::Ignored => {
                    tracing::debug!("confirm-dead for {} ignored", node)
                }
            },
        }
    }

    async fn handle_message(&mut self, src: SocketAddr, message: WireMessage) {
        match message {
            WireMessage::Ping {
                sequence_number,
                origin,
                payload,
            } => {
                for directive in self.state.on_ping(origin, payload, sequence_number) {
                    match directive {
                        PingDirective::GossipProcessed(processed) => {
                            self.publish_gossip(processed).await
                        }
                        PingDirective::SendAck {
                            acknowledging,
                            incarnation,
                            payload,
                            ..
                        } => {
                            // Reply to where the datagram came from.
                            self.send(
                                src,
                                WireMessage::Ack {
                                    sequence_number: acknowledging,
                                    from: self.state.my_node(),
                                    incarnation,
                                    payload,
                                },
                            )
                            .await;
                        }
                    }
                }
            }

            WireMessage::PingRequest {
                sequence_number,
                origin,
                target,
                payload,
            } => {
                for directive in self.state.on_ping_request(target, origin, payload) {
                    match directive {
                        PingRequestDirective::GossipProcessed(processed) => {
                            self.publish_gossip(processed).await
                        }
                        PingRequestDirective::Ignore => {
                            tracing::debug!("ping-request from {} targeting ourselves", origin)
                        }
                        PingRequestDirective::SendPing {
                            target,
                            ping_request_origin,
                            payload,
                            timeout,
                            sequence_number: proxy_sequence_number,
                        } => {
                            self.send(
                                target.addr,
                                WireMessage::Ping {
                                    sequence_number: proxy_sequence_number,
                                    origin: self.state.my_node(),
                                    payload,
                                },
                            )
                            .await;
                            self.in_flight.insert(
                                proxy_sequence_number,
                                InFlight::DirectProbe {
                                    target,
                                    ping_request_origin: Some(ping_request_origin),
                                    origin_sequence_number: Some(sequence_number),
                                },
                            );
                            self.arm_probe_timer(proxy_sequence_number, timeout);
                        }
                    }
                }
            }

            WireMessage::Ack {
                sequence_number,
                incarnation,
                payload,
                ..
            } => match self.in_flight.remove(&sequence_number) {
                Some(InFlight::DirectProbe {
                    target,
                    ping_request_origin,
                    origin_sequence_number,
                }) => {
                    let response = PingResponse::Ack {
                        target,
                        incarnation,
                        payload,
                        sequence_number,
                    };
                    let directives = self.state.on_ping_response(response, ping_request_origin);
                    self.execute_ping_response(directives, origin_sequence_number)
                        .await;
                }
                Some(InFlight::PingRequestProbe { target }) => {
                    let response = PingResponse::Ack {
                        target,
                        incarnation,
                        payload,
                        sequence_number,
                    };
                    self.state.on_every_ping_request_response(&response, &target);
                    let directives = self.state.on_ping_request_response(response, target);
                    self.report_indirect_outcomes(target, directives).await;
                }
                None => tracing::debug!("ack for unknown probe {}", sequence_number),
            },

            WireMessage::Nack {
                sequence_number,
                target,
                ..
            } => match self.in_flight.remove(&sequence_number) {
                Some(InFlight::PingRequestProbe { target }) => {
                    let response = PingResponse::Nack {
                        target,
                        sequence_number,
                    };
                    self.state.on_every_ping_request_response(&response, &target);
                    let directives = self.state.on_ping_request_response(response, target);
                    self.report_indirect_outcomes(target, directives).await;
                }
                Some(other) => {
                    tracing::debug!("nack {} did not match a ping-request: {:?}", sequence_number, other)
                }
                None => tracing::debug!("nack for unknown probe {} about {}", sequence_number, target),
            },
        }
    }

    async fn handle_probe_timeout(&mut self, sequence_number: u64) {
        match self.in_flight.remove(&sequence_number) {
            Some(InFlight::DirectProbe {
                target,
                ping_request_origin,
                origin_sequence_number,
            }) => {
                let response = PingResponse::Timeout {
                    target,
                    sequence_number,
                };
                let directives = self.state.on_ping_response(response, ping_request_origin);
                self.execute_ping_response(directives, origin_sequence_number)
                    .await;
            }
            Some(InFlight::PingRequestProbe { target }) => {
                let response = PingResponse::Timeout {
                    target,
                    sequence_number,
                };
                self.state.on_every_ping_request_response(&response, &target);
                let directives = self.state.on_ping_request_response(response, target);
                self.report_indirect_outcomes(target, directives).await;
            }
            // The reply won the race; nothing timed out.
            None => {}
        }
    }

    async fn execute_ping_response(
        &mut self,
        directives: Vec<PingResponseDirective>,
        origin_sequence_number: Option<u64>,
    ) {
        for directive in directives {
            match directive {
                PingResponseDirective::GossipProcessed(processed) => {
                    self.publish_gossip(processed).await
                }
                PingResponseDirective::SendAck {
                    to,
                    acknowledging,
                    target,
                    incarnation,
                    payload,
                } => {
                    self.send(
                        to.addr,
                        WireMessage::Ack {
                            sequence_number: origin_sequence_number.unwrap_or(acknowledging),
                            from: target,
                            incarnation,
                            payload,
                        },
                    )
                    .await;
                }
                PingResponseDirective::SendNack {
                    to,
                    acknowledging,
                    target,
                } => {
                    self.send(
                        to.addr,
                        WireMessage::Nack {
                            sequence_number: origin_sequence_number.unwrap_or(acknowledging),
                            from: self.state.my_node(),
                            target,
                        },
                    )
                    .await;
                }
                PingResponseDirective::SendPingRequests(send) => {
                    for request in send.requests {
                        self.send(
                            request.peer.addr,
                            WireMessage::PingRequest {
                                sequence_number: request.sequence_number,
                                origin: self.state.my_node(),
                                target: send.target,
                                payload: request.payload,
                            },
                        )
                        .await;
                        self.in_flight.insert(
                            request.sequence_number,
                            InFlight::PingRequestProbe {
                                target: send.target,
                            },
                        );
                        self.arm_probe_timer(request.sequence_number, send.timeout);
                    }
                }
            }
        }
    }

    async fn report_indirect_outcomes(
        &mut self,
        pinged: Node,
        directives: Vec<PingRequestResponseDirective>,
    ) {
        for directive in directives {
            match directive {
                PingRequestResponseDirective::GossipProcessed(processed) => {
                    self.publish_gossip(processed).await
                }
                PingRequestResponseDirective::NewlySuspect { .. } => {
                    tracing::info!("indirect probes for {} exhausted, now suspect", pinged)
                }
                other => tracing::debug!("indirect probe outcome for {}: {:?}", pinged, other),
            }
        }
    }

    async fn publish_gossip(&mut self, processed: GossipProcessed) {
        if let GossipProcessed::Applied {
            change: Some(change),
        } = processed
        {
            self.publish(change).await;
        }
    }

    async fn publish(&mut self, change: MemberStatusChange) {
        tracing::debug!("membership changed: {}", change);
        let _ = self.events_tx.send(change).await;
    }

    async fn send(&mut self, target: SocketAddr, message: WireMessage) {
        let _ = self
            .transport_tx
            .send(OutboundMessage::new(target, message))
            .await;
    }

    fn arm_probe_timer(&self, sequence_number: u64, timeout: Duration) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(SwimCommand::ProbeTimedOut { sequence_number }).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct TestRig {
        actor: SwimActor,
        outbound_rx: mpsc::Receiver<OutboundMessage>,
        _events_rx: mpsc::Receiver<MemberStatusChange>,
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn node(port: u16) -> Node {
        Node::with_uid(addr(port), port as u64)
    }

    fn make_rig(port: u16) -> TestRig {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (events_tx, events_rx) = mpsc::channel(64);
        let settings = SwimSettings {
            rng_seed: Some(1),
            ..SwimSettings::default()
        };
        TestRig {
            actor: SwimActor::new(
                node(port),
                settings,
                &[],
                command_rx,
                command_tx,
                outbound_tx,
                events_tx,
            ),
            outbound_rx,
            _events_rx: events_rx,
        }
    }

    fn ping(sequence_number: u64, origin: Node) -> WireMessage {
        WireMessage::Ping {
            sequence_number,
            origin,
            payload: vec![],
        }
    }

    #[tokio::test]
    async fn incoming_ping_is_answered_with_an_ack() {
        let mut rig = make_rig(1);
        let src = addr(9000);

        rig.actor
            .handle_command(SwimCommand::MessageReceived {
                src,
                message: ping(7, node(2)),
            })
            .await;

        let outbound = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(outbound.target, src);
        match outbound.message() {
            WireMessage::Ack {
                sequence_number,
                from,
                ..
            } => {
                assert_eq!(*sequence_number, 7);
                assert_eq!(*from, node(1));
            }
            other => panic!("expected Ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unanswered_probe_turns_the_target_suspect() {
        let mut rig = make_rig(1);
        // Introduce a member through gossip carried by a ping.
        rig.actor
            .handle_command(SwimCommand::MessageReceived {
                src: addr(9000),
                message: WireMessage::Ping {
                    sequence_number: 1,
                    origin: node(2),
                    payload: vec![crate::swim::Member::new(
                        node(2),
                        Status::Alive { incarnation: 0 },
                        0,
                    )],
                },
            })
            .await;
        let _ack = rig.outbound_rx.recv().await.unwrap();

        rig.actor.on_tick().await;
        let probe = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(probe.target, addr(2));
        let sequence_number = match probe.message() {
            WireMessage::Ping {
                sequence_number, ..
            } => *sequence_number,
            other => panic!("expected Ping, got {other:?}"),
        };

        rig.actor
            .handle_command(SwimCommand::ProbeTimedOut { sequence_number })
            .await;

        let member = rig.actor.state.member(&node(2)).unwrap();
        assert!(member.status.is_suspect());
        assert!(!rig.actor.in_flight.contains_key(&sequence_number));
    }

    #[tokio::test]
    async fn proxy_probe_relays_the_ack_under_the_origins_sequence_number() {
        let mut rig = make_rig(1);
        let origin = node(2);
        let target = node(3);

        rig.actor
            .handle_command(SwimCommand::MessageReceived {
                src: addr(2),
                message: WireMessage::PingRequest {
                    sequence_number: 55,
                    origin,
                    target,
                    payload: vec![],
                },
            })
            .await;

        let proxy_ping = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(proxy_ping.target, addr(3));
        let proxy_sequence_number = match proxy_ping.message() {
            WireMessage::Ping {
                sequence_number, ..
            } => *sequence_number,
            other => panic!("expected Ping, got {other:?}"),
        };

        rig.actor
            .handle_command(SwimCommand::MessageReceived {
                src: addr(3),
                message: WireMessage::Ack {
                    sequence_number: proxy_sequence_number,
                    from: target,
                    incarnation: 0,
                    payload: vec![],
                },
            })
            .await;

        let relayed = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(relayed.target, addr(2));
        match relayed.message() {
            WireMessage::Ack {
                sequence_number,
                from,
                ..
            } => {
                assert_eq!(
                    *sequence_number, 55,
                    "the origin must see its own sequence number"
                );
                assert_eq!(*from, target);
            }
            other => panic!("expected Ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn proxy_probe_timeout_relays_a_nack() {
        let mut rig = make_rig(1);

        rig.actor
            .handle_command(SwimCommand::MessageReceived {
                src: addr(2),
                message: WireMessage::PingRequest {
                    sequence_number: 77,
                    origin: node(2),
                    target: node(3),
                    payload: vec![],
                },
            })
            .await;
        let proxy_ping = rig.outbound_rx.recv().await.unwrap();
        let proxy_sequence_number = match proxy_ping.message() {
            WireMessage::Ping {
                sequence_number, ..
            } => *sequence_number,
            other => panic!("expected Ping, got {other:?}"),
        };

        rig.actor
            .handle_command(SwimCommand::ProbeTimedOut {
                sequence_number: proxy_sequence_number,
            })
            .await;

        let nack = rig.outbound_rx.recv().await.unwrap();
        assert_eq!(nack.target, addr(2));
        match nack.message() {
            WireMessage::Nack {
                sequence_number,
                target,
                ..
            } => {
                assert_eq!(*sequence_number, 77);
                assert_eq!(*target, node(3));
            }
            other => panic!("expected Nack, got {other:?}"),
        }
        // Proxy timeouts never install suspicion on the intermediary.
        assert!(rig.actor.state.member(&node(3)).unwrap().status.is_alive());
    }

    #[tokio::test]
    async fn timer_firing_after_the_reply_is_a_no_op() {
        let mut rig = make_rig(1);
        rig.actor
            .handle_command(SwimCommand::ProbeTimedOut { sequence_number: 99 })
            .await;
        // Nothing in flight, nothing sent.
        assert!(
            tokio::time::timeout(Duration::from_millis(10), rig.outbound_rx.recv())
                .await
                .is_err()
        );
    }
}
