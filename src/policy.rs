//! Who may do what to a proposal.
//!
//! Capabilities are worked out once per request from the actor and the
//! proposal, then checked against a fixed table. Deciding an approval is not in
//! the table: the approval leaf checks that itself.
use super::approval::ApprovalStatus;
use super::delegation::DelegationResolver;
use super::error::WorkflowError;
use super::proposal::Proposal;
use super::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Requester,
    Approver,
    Observer,
    Admin,
    ClientAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Cancel,
    Restructure,
    AddObserver,
}

impl Action {
    fn describe(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Cancel => "cancel",
            Self::Restructure => "change the approvers of",
            Self::AddObserver => "add observers to",
        }
    }
}

const PERMISSIONS: &[(Capability, &[Action])] = &[
    (
        Capability::Requester,
        &[Action::View, Action::Cancel, Action::Restructure, Action::AddObserver],
    ),
    (
        Capability::Approver,
        &[Action::View, Action::Restructure, Action::AddObserver],
    ),
    (Capability::Observer, &[Action::View]),
    (
        Capability::Admin,
        &[Action::View, Action::Cancel, Action::Restructure, Action::AddObserver],
    ),
    (Capability::ClientAdmin, &[Action::View]),
];

/// Application wide roles, usually read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub admins: Vec<UserId>,
    pub client_admins: Vec<(UserId, String)>, // (user, client slug)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    pub fn resolve(
        actor: &UserId,
        proposal: &Proposal,
        resolver: &dyn DelegationResolver,
        roster: &Roster,
    ) -> Self {
        let mut held = vec![];

        if proposal.requester == *actor {
            held.push(Capability::Requester);
        }
        // approvers only count once the workflow has reached them
        let reached = proposal.tree().leaves().any(|(_, approval)| {
            approval.status() != ApprovalStatus::Pending && approval.is_authorized(actor, resolver)
        });
        if reached {
            held.push(Capability::Approver);
        }
        if proposal.is_observer(actor) {
            held.push(Capability::Observer);
        }
        if roster.admins.contains(actor) {
            held.push(Capability::Admin);
        }
        let client_admin = roster.client_admins.iter().any(|(user, slug)| {
            user == actor && proposal.client_slug.as_deref() == Some(slug.as_str())
        });
        if client_admin {
            held.push(Capability::ClientAdmin);
        }

        Self(held)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn allows(&self, action: Action) -> bool {
        PERMISSIONS
            .iter()
            .filter(|(capability, _)| self.has(*capability))
            .any(|(_, actions)| actions.contains(&action))
    }

    pub fn require(
        &self,
        actor: &UserId,
        action: Action,
        proposal: &Proposal,
    ) -> Result<(), WorkflowError> {
        if self.allows(action) {
            return Ok(());
        }
        Err(WorkflowError::unauthorized(
            actor,
            format!("{} proposal {}", action.describe(), proposal.id),
        ))
    }
}
