//! Approval workflow engine for procurement requests.
//!
//! A [`Proposal`] owns one [`ApprovalTree`] built from a [`Topology`]. Leaves are
//! individual approvals, inner nodes combine their children serially or in
//! parallel under a quorum. Decisions enter at a leaf and propagate upwards; the
//! proposal follows its root and reports transitions to a [`Dispatcher`].

pub mod approval;
pub mod config;
pub mod delegation;
pub mod dispatch;
pub mod error;
pub mod policy;
pub mod proposal;
pub mod service;
pub mod store;
pub mod templates;
pub mod topology;
pub mod tree;
pub mod types;
pub mod utils;

pub use approval::{Approval, ApprovalStatus, Decision};
pub use config::EngineConfig;
pub use delegation::{DelegationResolver, DelegationTable, NoDelegation};
pub use dispatch::{Dispatcher, LogDispatcher, WorkflowEvent};
pub use error::{ConfigError, WorkflowError};
pub use policy::{Action, Capabilities, Capability, Roster};
pub use proposal::{PreservationPolicy, Proposal, ProposalStatus};
pub use service::WorkflowService;
pub use templates::{ExpenseType, Mailboxes, Template};
pub use topology::{Flow, Topology};
pub use tree::ApprovalTree;
pub use types::{NodeId, TimeStamp, UserId};
