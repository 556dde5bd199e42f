use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::directive::{
    ConfirmDeadDirective, GossipPayload, GossipProcessed, PingDirective, PingRequestDetail,
    PingRequestDirective, PingRequestResponseDirective, PingResponseDirective, SendPingRequests,
    TickDirective,
};
use super::gossip::GossipQueue;
use super::health::{LocalHealth, LocalHealthEvent};
use super::member::{Member, MemberStatusChange, Node, Status};
use super::rotation::PingRotation;
use super::settings::SwimSettings;
use super::suspicion::suspicion_timeout;
use super::PingResponse;

/// SWIM + Lifeguard failure-detector state machine. No I/O, no timers, no
/// tasks: a pure reducer the shell drives one event at a time, acting on the
/// directives each handler returns, in order.
///
/// ```text
///                  on_periodic_ping_tick
///                  └─ SendPing to the next rotation target
///                            │
///                            ▼
///   (new node) ─────────► Alive
///        ▲                   │  on_ping_response: Timeout, no origin
///        │                   │  └─ mark Suspect, fan out SendPingRequests
///        │                   │
///        │                   ▼
///        │                Suspect ──── gossip with strictly higher
///        │◄──────────────────┤         incarnation refutes back to Alive
///        │                   │
///        │                   │  suspicion timeout expires on a tick
///        │                   ▼
///        │       Unreachable (extension) or Dead
///        │                   │
///        └── (never) ◄───────┘  Dead is terminal; confirm_dead promotes
///                               Unreachable to Dead
/// ```
pub struct Swim {
    settings: SwimSettings,
    myself: Node,
    incarnation: u64,
    protocol_period: u64,
    sequence_number: u64,
    members: HashMap<Node, Member>,
    members_to_ping: PingRotation,
    local_health: LocalHealth,
    gossip: GossipQueue,
    rng: StdRng,
}

/// Result of installing a member record directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddMemberResult {
    Added(Member),
    NewerMemberAlreadyPresent(Member),
}

/// Result of applying a status observation to an existing (or new) member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkResult {
    Applied {
        previous: Option<Status>,
        member: Member,
    },
    IgnoredDueToOlderStatus {
        current: Status,
    },
}

impl Swim {
    pub fn new(myself: Node, settings: SwimSettings) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut swim = Self {
            local_health: LocalHealth::new(settings.lifeguard.max_local_health_multiplier),
            settings,
            myself,
            incarnation: 0,
            protocol_period: 0,
            sequence_number: 0,
            members: HashMap::new(),
            members_to_ping: PingRotation::default(),
            gossip: GossipQueue::default(),
            rng,
        };
        let me = Member::new(myself, Status::Alive { incarnation: 0 }, 0);
        swim.members.insert(myself, me.clone());
        swim.gossip.push_fresh(me);
        swim
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn my_node(&self) -> Node {
        self.myself
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    pub fn protocol_period(&self) -> u64 {
        self.protocol_period
    }

    pub fn local_health_multiplier(&self) -> u32 {
        self.local_health.multiplier()
    }

    /// Probe interval dilated by local health; the shell re-arms its tick
    /// timer from this after every event.
    pub fn dynamic_probe_interval(&self) -> Duration {
        self.settings.probe_interval * (1 + self.local_health.multiplier())
    }

    /// Direct-ping timeout dilated by local health.
    pub fn dynamic_ping_timeout(&self) -> Duration {
        self.settings.ping_timeout * (1 + self.local_health.multiplier())
    }

    fn indirect_ping_timeout(&self) -> Duration {
        self.settings
            .ping_timeout
            .mul_f64(self.settings.indirect_ping_timeout_multiplier)
    }

    /// Look up a member, tolerating a missing UID on either side.
    pub fn member(&self, node: &Node) -> Option<&Member> {
        self.members
            .get(node)
            .or_else(|| self.members.values().find(|m| m.node.matches(node)))
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn now(&self) -> u64 {
        self.settings.clock.now_nanos()
    }

    fn next_sequence_number(&mut self) -> u64 {
        self.sequence_number += 1;
        self.sequence_number
    }

    fn my_member(&self) -> Member {
        self.members[&self.myself].clone()
    }

    // -----------------------------------------------------------------------
    // Membership table
    // -----------------------------------------------------------------------

    /// Install a member record, unless a newer one is already present. A
    /// UID-less record for the same endpoint is dropped in favour of the
    /// concrete identity.
    pub fn add_member(&mut self, node: Node, status: Status) -> AddMemberResult {
        if let Some(existing) = self.member(&node) {
            if existing.status.supersedes(&status) {
                return AddMemberResult::NewerMemberAlreadyPresent(existing.clone());
            }
        }

        if node.uid.is_some() {
            let alias = self
                .members
                .keys()
                .find(|k| k.uid.is_none() && k.addr == node.addr)
                .copied();
            if let Some(alias) = alias {
                self.members.remove(&alias);
                self.members_to_ping.remove(&alias);
            }
        }

        let newly_seen = !self.members.contains_key(&node);
        let mut member = Member::new(node, status, self.protocol_period);
        if member.status.is_suspect() {
            member.suspicion_started_at = Some(self.now());
        }
        self.members.insert(node, member.clone());

        if newly_seen && node != self.myself && !member.status.is_dead() {
            self.members_to_ping.insert(node, &mut self.rng);
        }
        self.reset_gossip_payloads();
        AddMemberResult::Added(member)
    }

    /// Apply a status observation. Same-incarnation suspicions merge their
    /// suspected-by sets; an observation the current record supersedes is
    /// dropped.
    pub fn mark(&mut self, node: Node, status: Status) -> MarkResult {
        // Observations about an endpoint we only know half-identified update
        // the existing record; identity replacement is add_member's job.
        let node = if self.members.contains_key(&node) {
            node
        } else {
            self.member(&node).map(|m| m.node).unwrap_or(node)
        };
        let previous = self.members.get(&node).cloned();

        let mut effective = status;
        let mut preserved_stamp = None;
        let mut suspicion_started_at = None;

        let mut merged_suspicion: Option<Status> = None;
        if let Some(prev) = &previous {
            if let (
                Status::Suspect {
                    incarnation,
                    suspected_by,
                },
                Status::Suspect {
                    incarnation: prev_incarnation,
                    suspected_by: prev_suspected_by,
                },
            ) = (&effective, &prev.status)
            {
                if incarnation == prev_incarnation {
                    merged_suspicion = Some(Status::Suspect {
                        incarnation: *incarnation,
                        suspected_by: self.merge_suspicions(suspected_by, prev_suspected_by),
                    });
                    preserved_stamp = Some(prev.protocol_period);
                    suspicion_started_at = prev.suspicion_started_at;
                }
            }
        }
        if let Some(merged) = merged_suspicion {
            effective = merged;
        }

        if effective.is_suspect() && suspicion_started_at.is_none() {
            suspicion_started_at = Some(self.now());
        }
        if effective.is_unreachable() && !self.settings.unreachability_enabled {
            effective = Status::Dead;
        }

        if let Some(prev) = &previous {
            if prev.status.supersedes(&effective) {
                return MarkResult::IgnoredDueToOlderStatus {
                    current: prev.status.clone(),
                };
            }
        }

        let member = Member {
            node,
            suspicion_started_at: if effective.is_suspect() {
                suspicion_started_at
            } else {
                None
            },
            status: effective,
            protocol_period: preserved_stamp.unwrap_or(self.protocol_period),
        };

        if member.status.is_dead() {
            self.members_to_ping.remove(&node);
        } else if previous.is_none() && node != self.myself {
            self.members_to_ping.insert(node, &mut self.rng);
        }

        if member.status.is_suspect() && !previous.as_ref().is_some_and(|p| p.status.is_suspect()) {
            tracing::info!(
                "{} is suspect (incarnation {})",
                member.node,
                member.status.incarnation().unwrap_or(0)
            );
        }

        self.members.insert(node, member.clone());
        self.reset_gossip_payloads();
        MarkResult::Applied {
            previous: previous.map(|m| m.status),
            member,
        }
    }

    /// Union of the previous suspecters and the incoming ones, taken in
    /// sorted node order until the independent-suspicions cap is reached.
    fn merge_suspicions(
        &self,
        incoming: &BTreeSet<Node>,
        previous: &BTreeSet<Node>,
    ) -> BTreeSet<Node> {
        let cap = self.settings.lifeguard.max_independent_suspicions;
        let mut merged = previous.clone();
        for node in incoming {
            if merged.len() >= cap {
                break;
            }
            merged.insert(*node);
        }
        merged
    }

    fn next_member_to_ping(&mut self) -> Option<Node> {
        self.members_to_ping.next()
    }

    /// Up to `indirect_probe_count` reachable peers, excluding the probe
    /// target and ourselves, chosen uniformly without replacement.
    fn members_to_ping_request(&mut self, target: &Node) -> Vec<Member> {
        let myself = self.myself;
        let mut candidates: Vec<Member> = self
            .members
            .values()
            .filter(|m| m.node != *target && m.node != myself)
            .filter(|m| m.status.is_alive() || m.status.is_suspect())
            .cloned()
            .collect();
        // Sorted before sampling so a seeded RNG selects reproducibly.
        candidates.sort_by(|a, b| a.node.cmp(&b.node));
        candidates
            .choose_multiple(&mut self.rng, self.settings.indirect_probe_count)
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Gossip
    // -----------------------------------------------------------------------

    /// Re-enqueue every member as a fresh rumor. Run after each membership
    /// update so a quiescent cluster still hands new joiners the full view.
    fn reset_gossip_payloads(&mut self) {
        let members: Vec<Member> = self.members.values().cloned().collect();
        for member in members {
            self.gossip.push_fresh(member);
        }
    }

    /// Assemble the next outgoing payload, least-gossiped rumors first.
    ///
    /// A suspect target always hears its own suspicion first so it can
    /// refute. An otherwise empty payload falls back to our own record.
    fn make_gossip_payload(&mut self, target: Option<&Node>) -> GossipPayload {
        let mut payload: GossipPayload = Vec::new();
        let mut prepended: Option<Node> = None;

        if let Some(target) = target {
            if let Some(member) = self.member(target) {
                if member.status.is_suspect() {
                    payload.push(member.clone());
                    prepended = Some(member.node);
                }
            }
        }

        if self.gossip.is_empty() {
            if payload.is_empty() {
                return vec![self.my_member()];
            }
            return payload;
        }

        let mut drained = Vec::with_capacity(self.settings.gossip.max_messages_per_gossip);
        while drained.len() < self.settings.gossip.max_messages_per_gossip {
            match self.gossip.pop_least() {
                Some(entry) => drained.push(entry),
                None => break,
            }
        }

        let cluster_size = self.members.len();
        let needs_more = self.settings.gossip.needs_more_gossip;
        for mut entry in drained {
            if prepended == Some(entry.member.node) {
                continue;
            }
            payload.push(entry.member.clone());
            entry.times_gossiped += 1;
            if needs_more(entry.times_gossiped, cluster_size) {
                self.gossip.push(entry);
            }
        }
        payload
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// One protocol period: expire overdue suspicions, then probe the next
    /// rotation target. The period counter advances even when there is
    /// nothing to do.
    pub fn on_periodic_ping_tick(&mut self) -> Vec<TickDirective> {
        let mut directives: Vec<TickDirective> = self
            .check_suspicion_timeouts()
            .into_iter()
            .map(TickDirective::MembershipChanged)
            .collect();

        if let Some(target) = self.next_member_to_ping() {
            let payload = self.make_gossip_payload(Some(&target));
            let timeout = self.dynamic_ping_timeout();
            let sequence_number = self.next_sequence_number();
            directives.push(TickDirective::SendPing {
                target,
                payload,
                timeout,
                sequence_number,
            });
        }

        self.protocol_period += 1;
        directives
    }

    fn check_suspicion_timeouts(&mut self) -> Vec<MemberStatusChange> {
        let now = self.now();
        let mut expired: Vec<(Node, u64)> = Vec::new();
        for member in self.members.values() {
            if let Status::Suspect {
                incarnation,
                suspected_by,
            } = &member.status
            {
                let timeout = suspicion_timeout(suspected_by.len(), &self.settings.lifeguard);
                if let Some(started_at) = member.suspicion_started_at {
                    if now >= started_at.saturating_add(timeout.as_nanos() as u64) {
                        expired.push((member.node, *incarnation));
                    }
                }
            }
        }
        expired.sort();

        let mut changes = Vec::new();
        for (node, incarnation) in expired {
            let next = if self.settings.unreachability_enabled {
                Status::Unreachable { incarnation }
            } else {
                Status::Dead
            };
            if let MarkResult::Applied { previous, member } = self.mark(node, next) {
                changes.push(MemberStatusChange {
                    previous_status: previous,
                    member,
                });
            }
        }
        changes
    }

    /// An incoming ping: fold its gossip, then ack with ours.
    pub fn on_ping(
        &mut self,
        ping_origin: Node,
        payload: GossipPayload,
        sequence_number: u64,
    ) -> Vec<PingDirective> {
        let mut directives: Vec<PingDirective> = self
            .on_gossip_payload(payload)
            .into_iter()
            .map(PingDirective::GossipProcessed)
            .collect();

        let ack_payload = self.make_gossip_payload(Some(&ping_origin));
        directives.push(PingDirective::SendAck {
            to: ping_origin,
            acknowledging: sequence_number,
            incarnation: self.incarnation,
            payload: ack_payload,
        });
        directives
    }

    /// A peer asks us to probe `target` on its behalf.
    pub fn on_ping_request(
        &mut self,
        target: Node,
        ping_request_origin: Node,
        payload: GossipPayload,
    ) -> Vec<PingRequestDirective> {
        let mut directives: Vec<PingRequestDirective> = self
            .on_gossip_payload(payload)
            .into_iter()
            .map(PingRequestDirective::GossipProcessed)
            .collect();

        if target.matches(&self.myself) {
            directives.push(PingRequestDirective::Ignore);
            return directives;
        }

        if self.member(&target).is_none() {
            self.add_member(target, Status::Alive { incarnation: 0 });
        }

        let payload = self.make_gossip_payload(Some(&target));
        let timeout = self.indirect_ping_timeout();
        let sequence_number = self.next_sequence_number();
        directives.push(PingRequestDirective::SendPing {
            target,
            ping_request_origin,
            payload,
            timeout,
            sequence_number,
        });
        directives
    }

    /// Outcome of a direct probe we sent, either on our own schedule or on
    /// behalf of `ping_request_origin`.
    pub fn on_ping_response(
        &mut self,
        response: PingResponse,
        ping_request_origin: Option<Node>,
    ) -> Vec<PingResponseDirective> {
        match response {
            PingResponse::Ack {
                target,
                incarnation,
                payload,
                sequence_number,
            } => self.on_ping_ack(target, incarnation, payload, sequence_number, ping_request_origin),
            // A nack carries no membership information; the missed-nack
            // health path lives in on_every_ping_request_response.
            PingResponse::Nack { .. } => Vec::new(),
            PingResponse::Timeout {
                target,
                sequence_number,
            } => self.on_ping_timeout(target, sequence_number, ping_request_origin),
        }
    }

    fn on_ping_ack(
        &mut self,
        target: Node,
        incarnation: u64,
        payload: GossipPayload,
        sequence_number: u64,
        ping_request_origin: Option<Node>,
    ) -> Vec<PingResponseDirective> {
        let relay_payload = ping_request_origin.is_some().then(|| payload.clone());

        let mut directives: Vec<PingResponseDirective> = self
            .on_gossip_payload(payload)
            .into_iter()
            .map(PingResponseDirective::GossipProcessed)
            .collect();

        self.mark(target, Status::Alive { incarnation });

        match ping_request_origin {
            Some(origin) => directives.push(PingResponseDirective::SendAck {
                to: origin,
                acknowledging: sequence_number,
                target,
                incarnation,
                payload: relay_payload.unwrap_or_default(),
            }),
            None => self.local_health.adjust(LocalHealthEvent::SuccessfulProbe),
        }
        directives
    }

    fn on_ping_timeout(
        &mut self,
        target: Node,
        sequence_number: u64,
        ping_request_origin: Option<Node>,
    ) -> Vec<PingResponseDirective> {
        if let Some(origin) = ping_request_origin {
            return vec![PingResponseDirective::SendNack {
                to: origin,
                acknowledging: sequence_number,
                target,
            }];
        }

        let member = match self.member(&target) {
            Some(member) => member.clone(),
            None => return Vec::new(),
        };
        let Some(incarnation) = member.status.incarnation() else {
            // Already dead; nothing left to detect.
            return Vec::new();
        };

        self.mark(
            member.node,
            Status::Suspect {
                incarnation,
                suspected_by: BTreeSet::from([self.myself]),
            },
        );
        self.local_health.adjust(LocalHealthEvent::FailedProbe);
        self.prepare_ping_requests(member.node)
    }

    /// Fan indirect probes out through up to `indirect_probe_count` peers.
    /// With nobody to ask, the suspicion installed by the caller stands on
    /// our testimony alone.
    fn prepare_ping_requests(&mut self, target: Node) -> Vec<PingResponseDirective> {
        let candidates = self.members_to_ping_request(&target);
        if candidates.is_empty() {
            if let Some(member) = self.member(&target) {
                if let Some(incarnation) = member.status.incarnation() {
                    let node = member.node;
                    self.mark(
                        node,
                        Status::Suspect {
                            incarnation,
                            suspected_by: BTreeSet::from([self.myself]),
                        },
                    );
                }
            }
            return Vec::new();
        }

        let timeout = self.dynamic_ping_timeout();
        let requests: Vec<PingRequestDetail> = candidates
            .into_iter()
            .map(|candidate| {
                let payload = self.make_gossip_payload(Some(&target));
                let sequence_number = self.next_sequence_number();
                PingRequestDetail {
                    peer: candidate.node,
                    payload,
                    sequence_number,
                }
            })
            .collect();

        vec![PingResponseDirective::SendPingRequests(SendPingRequests {
            target,
            timeout,
            requests,
        })]
    }

    /// Outcome of one indirect probe we fanned out for `pinged`.
    pub fn on_ping_request_response(
        &mut self,
        response: PingResponse,
        pinged: Node,
    ) -> Vec<PingRequestResponseDirective> {
        let previous = match self.member(&pinged) {
            Some(member) => member.clone(),
            None => return vec![PingRequestResponseDirective::UnknownMember],
        };

        match response {
            PingResponse::Ack {
                target,
                incarnation,
                payload,
                ..
            } => {
                debug_assert!(
                    target.matches(&previous.node),
                    "ack target {target} does not match pinged member {}",
                    previous.node
                );
                let mut directives: Vec<PingRequestResponseDirective> = self
                    .on_gossip_payload(payload)
                    .into_iter()
                    .map(PingRequestResponseDirective::GossipProcessed)
                    .collect();
                match self.mark(previous.node, Status::Alive { incarnation }) {
                    MarkResult::Applied { previous, .. } => {
                        directives.push(PingRequestResponseDirective::Alive { previous })
                    }
                    MarkResult::IgnoredDueToOlderStatus { current } => directives
                        .push(PingRequestResponseDirective::IgnoredDueToOlderStatus { current }),
                }
                directives
            }
            PingResponse::Nack { .. } => vec![PingRequestResponseDirective::NackReceived],
            PingResponse::Timeout { .. } => match previous.status {
                Status::Alive { incarnation } | Status::Suspect { incarnation, .. } => {
                    match self.mark(
                        previous.node,
                        Status::Suspect {
                            incarnation,
                            suspected_by: BTreeSet::from([self.myself]),
                        },
                    ) {
                        MarkResult::Applied { previous, .. } => {
                            vec![PingRequestResponseDirective::NewlySuspect { previous }]
                        }
                        MarkResult::IgnoredDueToOlderStatus { current } => {
                            vec![PingRequestResponseDirective::IgnoredDueToOlderStatus { current }]
                        }
                    }
                }
                Status::Unreachable { .. } => {
                    vec![PingRequestResponseDirective::AlreadyUnreachable]
                }
                Status::Dead => vec![PingRequestResponseDirective::AlreadyDead],
            },
        }
    }

    /// Runs on every reply to an indirect probe, before the reply-specific
    /// handler. A probe that produced neither ack nor nack means the
    /// intermediary (or we) are degraded; count it against local health.
    pub fn on_every_ping_request_response(
        &mut self,
        response: &PingResponse,
        _pinged: &Node,
    ) -> Vec<PingRequestResponseDirective> {
        if matches!(response, PingResponse::Timeout { .. }) {
            self.local_health
                .adjust(LocalHealthEvent::ProbeWithMissedNack);
        }
        Vec::new()
    }

    /// External order to consider a peer dead, e.g. after an operator
    /// decision or a higher-level reachability consensus.
    pub fn confirm_dead(&mut self, node: Node) -> ConfirmDeadDirective {
        let Some(member) = self.member(&node).cloned() else {
            return ConfirmDeadDirective::Ignored;
        };
        if member.status.is_dead() {
            return ConfirmDeadDirective::Ignored;
        }
        match self.mark(member.node, Status::Dead) {
            MarkResult::Applied { previous, member } => ConfirmDeadDirective::Applied {
                change: MemberStatusChange {
                    previous_status: previous,
                    member,
                },
            },
            MarkResult::IgnoredDueToOlderStatus { .. } => ConfirmDeadDirective::Ignored,
        }
    }

    // -----------------------------------------------------------------------
    // Gossip fold-in
    // -----------------------------------------------------------------------

    /// Fold a received payload into the local view, one record at a time.
    pub fn on_gossip_payload(&mut self, payload: GossipPayload) -> Vec<GossipProcessed> {
        payload
            .into_iter()
            .map(|member| self.on_gossip(member))
            .collect()
    }

    fn on_gossip(&mut self, member: Member) -> GossipProcessed {
        if member.node.matches(&self.myself) {
            self.on_self_gossip(member.status)
        } else {
            self.on_peer_gossip(member)
        }
    }

    fn on_self_gossip(&mut self, status: Status) -> GossipProcessed {
        match status {
            Status::Alive { .. } => GossipProcessed::Ignored,
            Status::Suspect { incarnation, .. } => self.refute_if_current(incarnation),
            Status::Unreachable { incarnation } => {
                if self.settings.unreachability_enabled {
                    self.refute_if_current(incarnation)
                } else {
                    GossipProcessed::Ignored
                }
            }
            Status::Dead => match self.mark(self.myself, Status::Dead) {
                MarkResult::Applied { previous, member } => GossipProcessed::Applied {
                    change: Some(MemberStatusChange {
                        previous_status: previous,
                        member,
                    }),
                },
                MarkResult::IgnoredDueToOlderStatus { .. } => GossipProcessed::Ignored,
            },
        }
    }

    /// Somebody thinks we are failing. If their information is current,
    /// out-live it by incrementing our incarnation and gossiping the
    /// refutation.
    fn refute_if_current(&mut self, incarnation: u64) -> GossipProcessed {
        use std::cmp::Ordering;
        match incarnation.cmp(&self.incarnation) {
            Ordering::Equal => {
                self.incarnation += 1;
                tracing::info!(
                    "refuting suspicion about myself, incarnation now {}",
                    self.incarnation
                );
                let me = Member::new(
                    self.myself,
                    Status::Alive {
                        incarnation: self.incarnation,
                    },
                    self.protocol_period,
                );
                self.members.insert(self.myself, me.clone());
                self.gossip.push_fresh(me);
                self.local_health
                    .adjust(LocalHealthEvent::RefutingSuspectMessageAboutSelf);
                GossipProcessed::Applied { change: None }
            }
            Ordering::Greater => {
                // Nobody else can own our incarnation; harmless but worth a note.
                tracing::warn!(
                    "received suspicion about myself with future incarnation {} (own: {})",
                    incarnation,
                    self.incarnation
                );
                GossipProcessed::Ignored
            }
            Ordering::Less => GossipProcessed::Ignored,
        }
    }

    fn on_peer_gossip(&mut self, member: Member) -> GossipProcessed {
        if !self.members.contains_key(&member.node) {
            // A concrete identity is required to install a new peer.
            if member.node.uid.is_none() {
                return GossipProcessed::Ignored;
            }
            return match self.add_member(member.node, member.status) {
                AddMemberResult::Added(added) => GossipProcessed::Applied {
                    change: Some(MemberStatusChange {
                        previous_status: None,
                        member: added,
                    }),
                },
                AddMemberResult::NewerMemberAlreadyPresent(_) => GossipProcessed::Ignored,
            };
        }

        match self.mark(member.node, member.status) {
            MarkResult::Applied { previous, member } => GossipProcessed::Applied {
                change: Some(MemberStatusChange {
                    previous_status: previous,
                    member,
                }),
            },
            MarkResult::IgnoredDueToOlderStatus { .. } => GossipProcessed::Ignored,
        }
    }
}
