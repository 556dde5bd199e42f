use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;

use bincode::{Decode, Encode};

/// Addressable peer identity: a network endpoint plus an optional
/// incarnation-of-process UID.
///
/// A UID-less node is a half-known peer, e.g. a user-supplied bootstrap
/// address. Map keys compare the full identity; `matches` implements the
/// looser wire-level equality where a missing UID on either side is a
/// wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct Node {
    pub addr: SocketAddr,
    pub uid: Option<u64>,
}

impl Node {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, uid: None }
    }

    pub fn with_uid(addr: SocketAddr, uid: u64) -> Self {
        Self { addr, uid: Some(uid) }
    }

    /// Endpoint equality, and UID equality when both sides carry one.
    pub fn matches(&self, other: &Node) -> bool {
        self.addr == other.addr
            && match (self.uid, other.uid) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uid {
            Some(uid) => write!(f, "{}#{}", self.addr, uid),
            None => write!(f, "{}", self.addr),
        }
    }
}

/// Per-member protocol status.
///
/// `Dead` is terminal and carries no incarnation; nothing supersedes it.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Status {
    Alive {
        incarnation: u64,
    },
    Suspect {
        incarnation: u64,
        suspected_by: BTreeSet<Node>,
    },
    Unreachable {
        incarnation: u64,
    },
    Dead,
}

impl Status {
    pub fn incarnation(&self) -> Option<u64> {
        match self {
            Status::Alive { incarnation }
            | Status::Suspect { incarnation, .. }
            | Status::Unreachable { incarnation } => Some(*incarnation),
            Status::Dead => None,
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, Status::Alive { .. })
    }

    pub fn is_suspect(&self) -> bool {
        matches!(self, Status::Suspect { .. })
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Status::Unreachable { .. })
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Status::Dead)
    }

    /// Whether this status is at least as new as `other`.
    ///
    /// Every update path consults this and drops strictly-older information:
    /// higher incarnation wins; at equal incarnation the rank is
    /// dead > unreachable > suspect > alive; two equal-incarnation suspicions
    /// compare their suspected-by sets by inclusion.
    pub fn supersedes(&self, other: &Status) -> bool {
        use Status::*;
        match (self, other) {
            (Dead, _) => true,
            (_, Dead) => false,

            (Unreachable { incarnation: l }, Unreachable { incarnation: r })
            | (Unreachable { incarnation: l }, Suspect { incarnation: r, .. })
            | (Unreachable { incarnation: l }, Alive { incarnation: r }) => l >= r,

            (Suspect { incarnation: l, .. }, Unreachable { incarnation: r }) => l > r,
            (
                Suspect { incarnation: l, suspected_by: by_l },
                Suspect { incarnation: r, suspected_by: by_r },
            ) => l > r || (l == r && by_l.is_superset(by_r)),
            (Suspect { incarnation: l, .. }, Alive { incarnation: r }) => l >= r,

            (Alive { incarnation: l }, Unreachable { incarnation: r })
            | (Alive { incarnation: l }, Suspect { incarnation: r, .. }) => l > r,
            (Alive { incarnation: l }, Alive { incarnation: r }) => l >= r,
        }
    }
}

/// One row of the membership table.
///
/// `suspicion_started_at` is set the first time the member enters suspicion
/// and preserved across same-incarnation merges; it is `None` for every
/// non-suspect status.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Member {
    pub node: Node,
    pub status: Status,
    pub protocol_period: u64,
    pub suspicion_started_at: Option<u64>,
}

impl Member {
    pub fn new(node: Node, status: Status, protocol_period: u64) -> Self {
        Self {
            node,
            status,
            protocol_period,
            suspicion_started_at: None,
        }
    }
}

/// Published whenever a membership update is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberStatusChange {
    pub previous_status: Option<Status>,
    pub member: Member,
}

impl fmt::Display for MemberStatusChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.previous_status {
            Some(previous) => write!(f, "{}: {:?} -> {:?}", self.member.node, previous, self.member.status),
            None => write!(f, "{}: joined as {:?}", self.member.node, self.member.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn node(port: u16) -> Node {
        Node::with_uid(addr(port), port as u64)
    }

    fn alive(incarnation: u64) -> Status {
        Status::Alive { incarnation }
    }

    fn suspect(incarnation: u64, by: &[Node]) -> Status {
        Status::Suspect {
            incarnation,
            suspected_by: by.iter().copied().collect(),
        }
    }

    #[test]
    fn matches_tolerates_missing_uid_on_either_side() {
        let bare = Node::new(addr(1));
        let concrete = Node::with_uid(addr(1), 42);
        let other = Node::with_uid(addr(1), 43);

        assert!(bare.matches(&concrete));
        assert!(concrete.matches(&bare));
        assert!(!concrete.matches(&other));
        assert!(!bare.matches(&Node::new(addr(2))));
    }

    #[test]
    fn higher_incarnation_supersedes_any_rank() {
        assert!(alive(2).supersedes(&suspect(1, &[node(1)])));
        assert!(alive(2).supersedes(&Status::Unreachable { incarnation: 1 }));
        assert!(suspect(3, &[node(1)]).supersedes(&alive(2)));
    }

    #[test]
    fn equal_incarnation_ranks_by_severity() {
        let s = suspect(5, &[node(1)]);
        assert!(s.supersedes(&alive(5)));
        assert!(!alive(5).supersedes(&s));
        assert!(Status::Unreachable { incarnation: 5 }.supersedes(&s));
        assert!(!s.supersedes(&Status::Unreachable { incarnation: 5 }));
    }

    #[test]
    fn dead_is_terminal() {
        assert!(Status::Dead.supersedes(&alive(u64::MAX)));
        assert!(Status::Dead.supersedes(&Status::Dead));
        assert!(!alive(u64::MAX).supersedes(&Status::Dead));
        assert!(!Status::Unreachable { incarnation: u64::MAX }.supersedes(&Status::Dead));
    }

    #[test]
    fn equal_status_supersedes_itself() {
        // Re-delivering known information must be droppable, otherwise every
        // duplicate gossip would re-trigger dissemination.
        assert!(alive(3).supersedes(&alive(3)));
        let s = suspect(3, &[node(1), node(2)]);
        assert!(s.supersedes(&s.clone()));
    }

    #[test]
    fn suspicion_sets_compare_by_inclusion() {
        let small = suspect(4, &[node(1)]);
        let big = suspect(4, &[node(1), node(2)]);
        let disjoint = suspect(4, &[node(3)]);

        assert!(big.supersedes(&small));
        assert!(!small.supersedes(&big));
        // Neither is a superset: neither wins, the merge decides.
        assert!(!small.supersedes(&disjoint));
        assert!(!disjoint.supersedes(&small));
    }

    #[test]
    fn refutation_requires_strictly_newer_incarnation() {
        let s = suspect(5, &[node(1)]);
        assert!(!alive(5).supersedes(&s));
        assert!(alive(6).supersedes(&s));
    }
}
