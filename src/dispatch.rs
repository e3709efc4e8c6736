//! Transition events and the notification seam
use super::approval::Approval;
use super::proposal::Proposal;
use super::types::{NodeId, UserId};
use tracing::{info, warn};

/// Something that happened to a proposal, collected while it was being changed
/// and handed to a [`Dispatcher`] once the change is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    LeafDecided { node: NodeId, actor: UserId },
    ProposalApproved,
    ProposalRejected { node: NodeId },
    ApproversRemoved(Vec<UserId>),
    ProposalCancelled { actor: UserId },
}

/// Receives committed transitions. Implementations send mail, the engine only
/// guarantees each call happens once per transition and sees the committed state.
pub trait Dispatcher {
    fn on_leaf_decided(&self, proposal: &Proposal, node: NodeId, approval: &Approval);
    fn on_proposal_approved(&self, proposal: &Proposal);
    fn on_proposal_rejected(&self, proposal: &Proposal, node: NodeId, approval: &Approval);
    fn on_approver_removed(&self, proposal: &Proposal, removed: &[UserId]);
    fn on_proposal_cancelled(&self, _proposal: &Proposal) {}
}

/// A dispatcher that only writes log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl Dispatcher for LogDispatcher {
    fn on_leaf_decided(&self, proposal: &Proposal, node: NodeId, approval: &Approval) {
        info!(proposal_id = %proposal.id, node = %node, user = %approval.user(), status = %approval.status(), "approval decided");
    }
    fn on_proposal_approved(&self, proposal: &Proposal) {
        info!(proposal_id = %proposal.id, "proposal approved");
    }
    fn on_proposal_rejected(&self, proposal: &Proposal, node: NodeId, approval: &Approval) {
        info!(proposal_id = %proposal.id, node = %node, user = %approval.user(), "proposal rejected");
    }
    fn on_approver_removed(&self, proposal: &Proposal, removed: &[UserId]) {
        info!(proposal_id = %proposal.id, removed = ?removed, "approvers removed");
    }
    fn on_proposal_cancelled(&self, proposal: &Proposal) {
        info!(proposal_id = %proposal.id, "proposal cancelled");
    }
}

/// Hands committed events to `dispatcher`, in the order they happened.
pub fn dispatch(dispatcher: &dyn Dispatcher, proposal: &Proposal, events: &[WorkflowEvent]) {
    for event in events {
        match event {
            WorkflowEvent::LeafDecided { node, .. } => match proposal.tree().approval(*node) {
                Some(approval) => dispatcher.on_leaf_decided(proposal, *node, approval),
                None => warn!(proposal_id = %proposal.id, node = %node, "decided approval vanished"),
            },
            WorkflowEvent::ProposalApproved => dispatcher.on_proposal_approved(proposal),
            WorkflowEvent::ProposalRejected { node } => match proposal.tree().approval(*node) {
                Some(approval) => dispatcher.on_proposal_rejected(proposal, *node, approval),
                None => warn!(proposal_id = %proposal.id, node = %node, "rejecting approval vanished"),
            },
            WorkflowEvent::ApproversRemoved(removed) => {
                dispatcher.on_approver_removed(proposal, removed)
            }
            WorkflowEvent::ProposalCancelled { .. } => dispatcher.on_proposal_cancelled(proposal),
        }
    }
}
