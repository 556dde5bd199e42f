// ==========================================
// I/O SHELL: WIRE FORMAT & TASKS
// ==========================================

use std::net::SocketAddr;

use bincode::{Decode, Encode};

use crate::swim::{Member, Node};

pub(crate) mod actor;
pub(crate) mod transport;

pub use actor::{SwimActor, SwimCommand};
pub use transport::Transport;

pub(crate) const WIRE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// What goes over UDP.
#[derive(Clone, Debug, Encode, Decode)]
pub enum WireMessage {
    Ping {
        sequence_number: u64,
        origin: Node,
        payload: Vec<Member>,
    },
    PingRequest {
        sequence_number: u64,
        origin: Node,
        target: Node,
        payload: Vec<Member>,
    },
    Ack {
        sequence_number: u64,
        from: Node,
        incarnation: u64,
        payload: Vec<Member>,
    },
    Nack {
        sequence_number: u64,
        from: Node,
        target: Node,
    },
}

/// An encoded-and-addressed message on its way out.
#[derive(Debug)]
pub struct OutboundMessage {
    pub target: SocketAddr,
    message: WireMessage,
}

impl OutboundMessage {
    pub(crate) fn new(target: SocketAddr, message: WireMessage) -> Self {
        Self { target, message }
    }

    pub fn message(&self) -> &WireMessage {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swim::Status;

    #[test]
    fn wire_messages_survive_the_codec() {
        let origin = Node::with_uid("127.0.0.1:9000".parse().unwrap(), 7);
        let rumor = Member::new(
            Node::with_uid("127.0.0.1:9001".parse().unwrap(), 8),
            Status::Suspect {
                incarnation: 3,
                suspected_by: [origin].into_iter().collect(),
            },
            5,
        );
        let message = WireMessage::Ping {
            sequence_number: 42,
            origin,
            payload: vec![rumor.clone()],
        };

        let bytes = bincode::encode_to_vec(&message, WIRE_CONFIG).unwrap();
        let (decoded, _): (WireMessage, _) =
            bincode::decode_from_slice(&bytes, WIRE_CONFIG).unwrap();

        match decoded {
            WireMessage::Ping {
                sequence_number,
                origin: decoded_origin,
                payload,
            } => {
                assert_eq!(sequence_number, 42);
                assert_eq!(decoded_origin, origin);
                assert_eq!(payload, vec![rumor]);
            }
            other => panic!("expected Ping, got {other:?}"),
        }
    }
}
