//! Service layer API for proposal workflow operations
use super::approval::Decision;
use super::config::EngineConfig;
use super::delegation::DelegationResolver;
use super::dispatch::{Dispatcher, WorkflowEvent, dispatch};
use super::error::WorkflowError;
use super::policy::{Action, Capabilities};
use super::proposal::{Proposal, ProposalStatus};
use super::store::ProposalStore;
use super::templates::Template;
use super::topology::Topology;
use super::types::{NodeId, UserId};
use super::utils;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub struct WorkflowService {
    store: ProposalStore,
    config: EngineConfig,
    dispatcher: Arc<dyn Dispatcher + Send + Sync>,
    resolver: Arc<dyn DelegationResolver + Send + Sync>,
}

impl WorkflowService {
    pub fn new(
        instance: Arc<sled::Db>,
        config: EngineConfig,
        dispatcher: Arc<dyn Dispatcher + Send + Sync>,
        resolver: Arc<dyn DelegationResolver + Send + Sync>,
    ) -> Self {
        Self {
            store: ProposalStore::new(instance),
            config,
            dispatcher,
            resolver,
        }
    }

    /// Opens the database named in the config.
    pub fn open(
        config: EngineConfig,
        dispatcher: Arc<dyn Dispatcher + Send + Sync>,
        resolver: Arc<dyn DelegationResolver + Send + Sync>,
    ) -> anyhow::Result<Self> {
        let db = sled::open(&config.db_path)
            .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
        Ok(Self::new(Arc::new(db), config, dispatcher, resolver))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a new proposal; its first approvals become actionable right away.
    pub fn submit(
        &self,
        requester: UserId,
        topology: &Topology,
        observers: Vec<UserId>,
        client_slug: Option<String>,
    ) -> anyhow::Result<Proposal> {
        let id = utils::new_uuid_to_bech32("proposal_")?;
        let mut proposal = Proposal::new(id, requester, topology, client_slug)
            .context("Proposal failed on submit: ")?;
        for observer in observers {
            proposal.add_observer(observer);
        }

        self.store.insert(&proposal)?;
        info!(proposal_id = %proposal.id, requester = %proposal.requester, approvers = proposal.approvers().len(), "proposal submitted");

        Ok(proposal)
    }

    pub fn submit_template(
        &self,
        requester: UserId,
        template: Template,
        client_slug: Option<String>,
    ) -> anyhow::Result<Proposal> {
        self.submit(requester, &template.topology, template.observers, client_slug)
    }

    pub fn approve(
        &self,
        proposal_id: &str,
        actor: &UserId,
        leaf: NodeId,
    ) -> anyhow::Result<Proposal> {
        self.decide(proposal_id, actor, leaf, Decision::Approve)
    }

    pub fn reject(
        &self,
        proposal_id: &str,
        actor: &UserId,
        leaf: NodeId,
    ) -> anyhow::Result<Proposal> {
        self.decide(proposal_id, actor, leaf, Decision::Reject)
    }

    fn decide(
        &self,
        proposal_id: &str,
        actor: &UserId,
        leaf: NodeId,
        decision: Decision,
    ) -> anyhow::Result<Proposal> {
        let resolver = self.resolver.as_ref();
        let (proposal, events) = self
            .store
            .update(proposal_id, self.config.commit_retries, |proposal| {
                let events = proposal.decide(leaf, actor, decision, resolver)?;
                // delegates that step in keep getting news about it
                let bound = proposal.tree().approval(leaf).map(|a| a.user());
                if bound.is_some_and(|user| user != actor) {
                    proposal.add_observer(actor.clone());
                }
                Ok(events)
            })
            .with_context(|| format!("Failed to {} {proposal_id}", decision.verb()))?;

        dispatch(self.dispatcher.as_ref(), &proposal, &events);
        Ok(proposal)
    }

    /// Requester initiated, only while pending.
    pub fn cancel(&self, proposal_id: &str, actor: &UserId) -> anyhow::Result<Proposal> {
        let (proposal, events) = self
            .guarded_update(proposal_id, actor, Action::Cancel, |proposal| {
                proposal.cancel(actor)
            })
            .with_context(|| format!("Failed to cancel {proposal_id}"))?;

        dispatch(self.dispatcher.as_ref(), &proposal, &events);
        Ok(proposal)
    }

    /// Replaces the approval tree, e.g. after the approver or expense type changed.
    pub fn rebuild_tree(
        &self,
        proposal_id: &str,
        actor: &UserId,
        topology: &Topology,
    ) -> anyhow::Result<Proposal> {
        let policy = self.config.preservation;
        let (proposal, events) = self
            .guarded_update(proposal_id, actor, Action::Restructure, |proposal| {
                proposal.rebuild(topology, policy)
            })
            .with_context(|| format!("Failed to change the approvers of {proposal_id}"))?;

        dispatch(self.dispatcher.as_ref(), &proposal, &events);
        Ok(proposal)
    }

    pub fn add_observer(
        &self,
        proposal_id: &str,
        actor: &UserId,
        observer: UserId,
    ) -> anyhow::Result<Proposal> {
        let (proposal, _) = self
            .guarded_update(proposal_id, actor, Action::AddObserver, |proposal| {
                proposal.add_observer(observer.clone());
                Ok(vec![])
            })
            .with_context(|| format!("Failed to add an observer to {proposal_id}"))?;

        Ok(proposal)
    }

    fn guarded_update<F>(
        &self,
        proposal_id: &str,
        actor: &UserId,
        action: Action,
        mut change: F,
    ) -> Result<(Proposal, Vec<WorkflowEvent>), WorkflowError>
    where
        F: FnMut(&mut Proposal) -> Result<Vec<WorkflowEvent>, WorkflowError>,
    {
        self.store
            .update(proposal_id, self.config.commit_retries, |proposal| {
                self.capabilities(actor, proposal)
                    .require(actor, action, proposal)?;
                change(proposal)
            })
    }

    pub fn capabilities(&self, actor: &UserId, proposal: &Proposal) -> Capabilities {
        Capabilities::resolve(actor, proposal, self.resolver.as_ref(), &self.config.roster)
    }

    pub fn load(&self, proposal_id: &str) -> anyhow::Result<Proposal> {
        Ok(self.store.load(proposal_id)?)
    }

    pub fn status_of(&self, proposal_id: &str) -> anyhow::Result<ProposalStatus> {
        Ok(self.store.load(proposal_id)?.status())
    }

    /// Who can act right now, for rendering.
    pub fn actionable_leaves(&self, proposal_id: &str) -> anyhow::Result<Vec<(NodeId, UserId)>> {
        let proposal = self.store.load(proposal_id)?;
        Ok(proposal
            .actionable_leaves()
            .into_iter()
            .filter_map(|id| {
                proposal
                    .tree()
                    .approval(id)
                    .map(|approval| (id, approval.user().clone()))
            })
            .collect())
    }

    /// Proposals `actor` is allowed to see.
    pub fn visible_to(&self, actor: &UserId) -> anyhow::Result<Vec<Proposal>> {
        Ok(self
            .store
            .all()?
            .into_iter()
            .filter(|proposal| self.capabilities(actor, proposal).allows(Action::View))
            .collect())
    }
}
