//! Proposal state machine
use super::approval::{ApprovalStatus, Decision};
use super::delegation::DelegationResolver;
use super::dispatch::WorkflowEvent;
use super::error::WorkflowError;
use super::topology::Topology;
use super::tree::ApprovalTree;
use super::types::{NodeId, TimeStamp, UserId};
use chrono::Utc;
use std::fmt;
use tracing::info;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Cancelled,
}

/// What happens to decisions already made when the approvers change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreservationPolicy {
    /// New approvals bound to someone who already decided keep that decision.
    #[default]
    PreserveMatching,
    /// Every approval starts over.
    Discard,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    #[n(0)]
    pub id: String, // bech32, `proposal_1...`
    #[n(1)]
    pub requester: UserId,
    #[n(2)]
    status: ProposalStatus,
    #[n(3)]
    tree: ApprovalTree,
    #[n(4)]
    observers: Vec<UserId>,
    #[n(5)]
    pub client_slug: Option<String>,
    #[n(6)]
    topology_digest: String,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub updated_at: TimeStamp<Utc>,
}

impl ProposalStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        })
    }
}

impl Proposal {
    pub fn new(
        id: String,
        requester: UserId,
        topology: &Topology,
        client_slug: Option<String>,
    ) -> Result<Self, WorkflowError> {
        let tree = ApprovalTree::build(topology)?;
        let now = TimeStamp::new();

        Ok(Self {
            id,
            requester,
            status: ProposalStatus::Pending,
            tree,
            observers: vec![],
            client_slug,
            topology_digest: topology.digest()?,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }
    pub fn tree(&self) -> &ApprovalTree {
        &self.tree
    }
    pub fn observers(&self) -> &[UserId] {
        &self.observers
    }
    pub fn approvers(&self) -> Vec<&UserId> {
        self.tree.approvers()
    }

    /// Nothing is actionable once the proposal has reached an end.
    pub fn actionable_leaves(&self) -> Vec<NodeId> {
        match self.status {
            ProposalStatus::Pending => self.tree.actionable_leaves(),
            _ => vec![],
        }
    }

    pub fn decide(
        &mut self,
        node: NodeId,
        actor: &UserId,
        decision: Decision,
        resolver: &dyn DelegationResolver,
    ) -> Result<Vec<WorkflowEvent>, WorkflowError> {
        if self.status != ProposalStatus::Pending {
            return Err(WorkflowError::transition(
                decision.verb(),
                format_args!("the proposal is {}", self.status),
            ));
        }

        let outcome = self.tree.decide(node, actor, decision, resolver)?;
        self.touch();

        let mut events = vec![WorkflowEvent::LeafDecided {
            node,
            actor: actor.clone(),
        }];
        if outcome.root_before != outcome.root_after {
            events.extend(self.follow_tree(Some(node)));
        }
        Ok(events)
    }

    /// `pending -> cancelled`. Whether `actor` may cancel is up to the caller.
    pub fn cancel(&mut self, actor: &UserId) -> Result<Vec<WorkflowEvent>, WorkflowError> {
        if self.status != ProposalStatus::Pending {
            return Err(WorkflowError::transition(
                "cancel",
                format_args!("the proposal is {}", self.status),
            ));
        }

        self.status = ProposalStatus::Cancelled;
        self.touch();
        info!(proposal_id = %self.id, actor = %actor, "proposal cancelled");

        Ok(vec![WorkflowEvent::ProposalCancelled {
            actor: actor.clone(),
        }])
    }

    /// Swaps in a tree built from `topology`. An unchanged topology does nothing.
    /// The old tree stays in place if the new topology is invalid.
    pub fn rebuild(
        &mut self,
        topology: &Topology,
        policy: PreservationPolicy,
    ) -> Result<Vec<WorkflowEvent>, WorkflowError> {
        if self.status != ProposalStatus::Pending {
            return Err(WorkflowError::transition(
                "change approvers",
                format_args!("the proposal is {}", self.status),
            ));
        }

        let digest = topology.digest()?;
        if digest == self.topology_digest {
            return Ok(vec![]);
        }

        let tree = match policy {
            PreservationPolicy::PreserveMatching => {
                ApprovalTree::build_inheriting(topology, &self.tree)?
            }
            PreservationPolicy::Discard => ApprovalTree::build(topology)?,
        };

        let kept = tree.approvers();
        let mut removed: Vec<UserId> = vec![];
        for user in self.tree.approvers() {
            if !kept.contains(&user) && !removed.contains(user) {
                removed.push(user.clone());
            }
        }

        self.tree = tree;
        self.topology_digest = digest;
        self.touch();
        info!(proposal_id = %self.id, removed = removed.len(), "approval tree rebuilt");

        let mut events = vec![];
        if !removed.is_empty() {
            events.push(WorkflowEvent::ApproversRemoved(removed));
        }
        events.extend(self.follow_tree(None));
        Ok(events)
    }

    /// Returns false if `observer` was already watching.
    pub fn add_observer(&mut self, observer: UserId) -> bool {
        if self.observers.contains(&observer) {
            return false;
        }
        self.observers.push(observer);
        self.touch();
        true
    }

    pub fn is_observer(&self, user: &UserId) -> bool {
        self.observers.contains(user)
    }

    // moves a pending proposal to wherever its root ended up. Fires once per edge
    // since only pending proposals move.
    fn follow_tree(&mut self, decided: Option<NodeId>) -> Vec<WorkflowEvent> {
        if self.status != ProposalStatus::Pending {
            return vec![];
        }

        match self.tree.status() {
            ApprovalStatus::Approved => {
                self.status = ProposalStatus::Approved;
                info!(proposal_id = %self.id, "proposal approved");
                vec![WorkflowEvent::ProposalApproved]
            }
            ApprovalStatus::Rejected => {
                self.status = ProposalStatus::Rejected;
                let node = decided
                    .or_else(|| self.latest_rejection())
                    .unwrap_or(ApprovalTree::ROOT);
                info!(proposal_id = %self.id, node = %node, "proposal rejected");
                vec![WorkflowEvent::ProposalRejected { node }]
            }
            ApprovalStatus::Pending | ApprovalStatus::Actionable => vec![],
        }
    }

    fn latest_rejection(&self) -> Option<NodeId> {
        self.tree
            .leaves()
            .filter(|(_, approval)| approval.status() == ApprovalStatus::Rejected)
            .max_by_key(|(_, approval)| approval.decided_at().map(TimeStamp::to_datetime_utc))
            .map(|(id, _)| id)
    }

    fn touch(&mut self) {
        self.updated_at = TimeStamp::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::NoDelegation;

    fn proposal(topology: &Topology) -> Proposal {
        Proposal::new(
            "proposal_test".into(),
            "requester@example.gov".into(),
            topology,
            Some("ncr".into()),
        )
        .unwrap()
    }

    fn approve(p: &mut Proposal, node: u32, user: &str) -> Vec<WorkflowEvent> {
        p.decide(NodeId(node), &user.into(), Decision::Approve, &NoDelegation)
            .unwrap()
    }

    #[test]
    fn approval_fires_once_at_the_edge() {
        let mut p = proposal(&Topology::parallel(vec![
            Topology::individual("a@example.gov"),
            Topology::individual("b@example.gov"),
        ]));

        let events = approve(&mut p, 1, "a@example.gov");
        assert_eq!(events.len(), 1);
        assert_eq!(p.status(), ProposalStatus::Pending);

        let events = approve(&mut p, 2, "b@example.gov");
        assert_eq!(
            events,
            vec![
                WorkflowEvent::LeafDecided {
                    node: NodeId(2),
                    actor: "b@example.gov".into()
                },
                WorkflowEvent::ProposalApproved
            ]
        );
        assert_eq!(p.status(), ProposalStatus::Approved);
        assert!(p.actionable_leaves().is_empty());
    }

    #[test]
    fn rejection_names_the_rejecting_approval() {
        let mut p = proposal(&Topology::linear(["a@example.gov", "b@example.gov"]));

        let events = p
            .decide(NodeId(1), &"a@example.gov".into(), Decision::Reject, &NoDelegation)
            .unwrap();

        assert_eq!(events[1], WorkflowEvent::ProposalRejected { node: NodeId(1) });
        assert_eq!(p.status(), ProposalStatus::Rejected);
    }

    #[test]
    fn quorums_stay_pending_after_rejections() {
        let mut p = proposal(
            &Topology::parallel(vec![
                Topology::individual("a@example.gov"),
                Topology::individual("b@example.gov"),
                Topology::individual("c@example.gov"),
            ])
            .with_min_children_needed(2),
        );

        for (node, user) in [(1, "a@example.gov"), (2, "b@example.gov")] {
            let events = p
                .decide(NodeId(node), &user.into(), Decision::Reject, &NoDelegation)
                .unwrap();
            assert_eq!(events.len(), 1);
        }

        assert_eq!(p.tree().status(), ApprovalStatus::Actionable);
        assert_eq!(p.status(), ProposalStatus::Pending);
        assert_eq!(p.actionable_leaves(), vec![NodeId(3)]);
        approve(&mut p, 3, "c@example.gov");
        assert_eq!(p.status(), ProposalStatus::Pending);
    }

    #[test]
    fn settled_groups_refuse_late_decisions() {
        let mut p = proposal(&Topology::serial(vec![
            Topology::parallel(vec![
                Topology::individual("a@example.gov"),
                Topology::individual("b@example.gov"),
            ])
            .with_min_children_needed(1),
            Topology::individual("final@example.gov"),
        ]));
        approve(&mut p, 2, "a@example.gov");
        let before = p.clone();

        let err = p
            .decide(NodeId(3), &"b@example.gov".into(), Decision::Approve, &NoDelegation)
            .unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert_eq!(p, before);
    }

    #[test]
    fn cancelled_proposals_take_no_decisions() {
        let mut p = proposal(&Topology::linear(["a@example.gov"]));

        p.cancel(&"requester@example.gov".into()).unwrap();
        let err = p
            .decide(NodeId(1), &"a@example.gov".into(), Decision::Approve, &NoDelegation)
            .unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert!(matches!(
            p.cancel(&"requester@example.gov".into()),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn unchanged_topologies_are_left_alone() {
        let topology = Topology::linear(["a@example.gov", "b@example.gov"]);
        let mut p = proposal(&topology);
        let before = p.clone();

        let events = p.rebuild(&topology, PreservationPolicy::PreserveMatching).unwrap();

        assert!(events.is_empty());
        assert_eq!(p, before);
    }

    #[test]
    fn spelling_out_unanimity_keeps_decisions_even_when_discarding() {
        let mut p = proposal(&Topology::linear(["a@example.gov", "b@example.gov"]));
        approve(&mut p, 1, "a@example.gov");
        let before = p.clone();

        let events = p
            .rebuild(
                &Topology::linear(["a@example.gov", "b@example.gov"]).with_min_children_needed(2),
                PreservationPolicy::Discard,
            )
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(p, before);
    }

    #[test]
    fn rebuilding_reports_removed_approvers() {
        let mut p = proposal(&Topology::linear([
            "official@example.gov",
            "tier1@example.gov",
            "tier2@example.gov",
        ]));
        approve(&mut p, 1, "official@example.gov");

        let events = p
            .rebuild(
                &Topology::linear(["official@example.gov", "tier2@example.gov"]),
                PreservationPolicy::PreserveMatching,
            )
            .unwrap();

        assert_eq!(
            events,
            vec![WorkflowEvent::ApproversRemoved(vec!["tier1@example.gov".into()])]
        );
        assert_eq!(p.actionable_leaves(), vec![NodeId(2)]);
    }

    #[test]
    fn discarding_starts_everyone_over() {
        let mut p = proposal(&Topology::linear(["official@example.gov", "tier1@example.gov"]));
        approve(&mut p, 1, "official@example.gov");

        p.rebuild(
            &Topology::linear(["official@example.gov", "tier2@example.gov"]),
            PreservationPolicy::Discard,
        )
        .unwrap();

        assert_eq!(p.actionable_leaves(), vec![NodeId(1)]);
    }

    #[test]
    fn rebuilt_trees_can_finish_the_proposal() {
        let mut p = proposal(&Topology::linear(["official@example.gov", "tier1@example.gov"]));
        approve(&mut p, 1, "official@example.gov");

        let events = p
            .rebuild(
                &Topology::individual("official@example.gov"),
                PreservationPolicy::PreserveMatching,
            )
            .unwrap();

        assert_eq!(events.last(), Some(&WorkflowEvent::ProposalApproved));
        assert_eq!(p.status(), ProposalStatus::Approved);
    }

    #[test]
    fn invalid_rebuilds_keep_the_old_tree() {
        let mut p = proposal(&Topology::linear(["a@example.gov"]));
        let before = p.clone();

        let err = p
            .rebuild(&Topology::parallel(vec![]), PreservationPolicy::PreserveMatching)
            .unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidConfiguration(_)));
        assert_eq!(p, before);
    }

    #[test]
    fn observers_are_added_once() {
        let mut p = proposal(&Topology::individual("a@example.gov"));

        assert!(p.add_observer("watcher@example.gov".into()));
        assert!(!p.add_observer("Watcher@example.gov".into()));
        assert_eq!(p.observers().len(), 1);
    }
}
