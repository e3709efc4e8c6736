//! Individual approvals, the leaves of an approval tree
use super::delegation::DelegationResolver;
use super::error::WorkflowError;
use super::types::{NodeId, TimeStamp, UserId};
use chrono::Utc;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Actionable,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    #[n(0)]
    user: UserId,
    #[n(1)]
    status: ApprovalStatus,
    #[n(2)]
    decided_at: Option<TimeStamp<Utc>>, // stamped once, on approve or reject
}

impl ApprovalStatus {
    pub fn is_decided(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Actionable => "actionable",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

impl Decision {
    fn outcome(self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Reject => ApprovalStatus::Rejected,
        }
    }
    pub fn verb(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl Approval {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            status: ApprovalStatus::Pending,
            decided_at: None,
        }
    }
    pub fn user(&self) -> &UserId {
        &self.user
    }
    pub fn status(&self) -> ApprovalStatus {
        self.status
    }
    pub fn decided_at(&self) -> Option<&TimeStamp<Utc>> {
        self.decided_at.as_ref()
    }

    /// Whether `actor`, or the principal it is a delegate for, is bound to this approval.
    pub fn is_authorized(&self, actor: &UserId, resolver: &dyn DelegationResolver) -> bool {
        *actor == self.user || resolver.resolve_actor(actor) == self.user
    }

    /// `pending -> actionable`. Returns whether anything changed.
    pub(crate) fn activate(&mut self) -> bool {
        if self.status != ApprovalStatus::Pending {
            return false;
        }
        self.status = ApprovalStatus::Actionable;
        true
    }

    pub(crate) fn decide(
        &mut self,
        node: NodeId,
        actor: &UserId,
        decision: Decision,
        resolver: &dyn DelegationResolver,
    ) -> Result<(), WorkflowError> {
        if !self.is_authorized(actor, resolver) {
            return Err(WorkflowError::unauthorized(
                actor,
                format!("{} approval {node}", decision.verb()),
            ));
        }
        if self.status != ApprovalStatus::Actionable {
            return Err(WorkflowError::transition(
                decision.verb(),
                format_args!("approval {node} is {}", self.status),
            ));
        }

        self.status = decision.outcome();
        self.decided_at = Some(TimeStamp::new());
        Ok(())
    }

    /// Carries a decision over from a leaf of a tree that has since been rebuilt.
    pub(crate) fn inherit(&mut self, previous: &Approval) {
        if previous.status.is_decided() {
            self.status = previous.status;
            self.decided_at = previous.decided_at.clone();
        }
    }
}
