mod clock;
mod directive;
mod gossip;
mod health;
mod instance;
mod member;
mod rotation;
mod settings;
mod suspicion;

pub use clock::Clock;
pub use directive::*;
pub use gossip::default_needs_more_gossip;
pub use health::LocalHealthEvent;
pub use instance::{AddMemberResult, MarkResult, Swim};
pub use member::{Member, MemberStatusChange, Node, Status};
pub use settings::{GossipSettings, LifeguardSettings, SwimSettings};

/// A reply to an outgoing probe, delivered by the shell. `Timeout` is
/// synthesized locally when the timer the shell armed for the probe fires
/// before any reply arrives; transport failures are reported the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PingResponse {
    Ack {
        target: Node,
        incarnation: u64,
        payload: GossipPayload,
        sequence_number: u64,
    },
    Nack {
        target: Node,
        sequence_number: u64,
    },
    Timeout {
        target: Node,
        sequence_number: u64,
    },
}

impl PingResponse {
    pub fn sequence_number(&self) -> u64 {
        match self {
            PingResponse::Ack { sequence_number, .. }
            | PingResponse::Nack { sequence_number, .. }
            | PingResponse::Timeout { sequence_number, .. } => *sequence_number,
        }
    }
}
