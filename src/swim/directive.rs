use std::time::Duration;

use super::member::{Member, MemberStatusChange, Node, Status};

/// Gossip payload: a batch of member snapshots riding along on a protocol
/// message.
pub type GossipPayload = Vec<Member>;

/// Outcome of folding one gossiped member record into the local view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipProcessed {
    Applied { change: Option<MemberStatusChange> },
    Ignored,
}

/// What the shell must do after a periodic protocol tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickDirective {
    MembershipChanged(MemberStatusChange),
    SendPing {
        target: Node,
        payload: GossipPayload,
        timeout: Duration,
        sequence_number: u64,
    },
}

/// What the shell must do after an incoming ping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PingDirective {
    GossipProcessed(GossipProcessed),
    SendAck {
        to: Node,
        acknowledging: u64,
        incarnation: u64,
        payload: GossipPayload,
    },
}

/// What the shell must do after an incoming ping-request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PingRequestDirective {
    GossipProcessed(GossipProcessed),
    /// The request targeted this node itself; nothing to forward.
    Ignore,
    SendPing {
        target: Node,
        ping_request_origin: Node,
        payload: GossipPayload,
        timeout: Duration,
        sequence_number: u64,
    },
}

/// What the shell must do after a direct-probe reply (ack, nack, or a
/// synthesized timeout).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PingResponseDirective {
    GossipProcessed(GossipProcessed),
    /// Relay a successful probe back to the node that asked us to probe.
    SendAck {
        to: Node,
        acknowledging: u64,
        target: Node,
        incarnation: u64,
        payload: GossipPayload,
    },
    /// Tell the node that asked us to probe that our attempt timed out too.
    SendNack {
        to: Node,
        acknowledging: u64,
        target: Node,
    },
    SendPingRequests(SendPingRequests),
}

/// Fan out indirect probes for `target` through each listed intermediary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendPingRequests {
    pub target: Node,
    pub timeout: Duration,
    pub requests: Vec<PingRequestDetail>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PingRequestDetail {
    pub peer: Node,
    pub payload: GossipPayload,
    pub sequence_number: u64,
}

/// Typed outcome of an indirect-probe reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PingRequestResponseDirective {
    GossipProcessed(GossipProcessed),
    UnknownMember,
    Alive { previous: Option<Status> },
    NackReceived,
    NewlySuspect { previous: Option<Status> },
    AlreadyUnreachable,
    AlreadyDead,
    IgnoredDueToOlderStatus { current: Status },
}

/// Result of an external confirm-dead command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmDeadDirective {
    Applied { change: MemberStatusChange },
    Ignored,
}
