//! Whole-proposal persistence on sled
use super::dispatch::WorkflowEvent;
use super::error::WorkflowError;
use super::proposal::Proposal;
use sled::IVec;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ProposalStore {
    instance: Arc<sled::Db>,
}

impl ProposalStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    /// Loads a proposal together with the exact bytes it was decoded from.
    fn load_raw(&self, proposal_id: &str) -> Result<(Proposal, IVec), WorkflowError> {
        let bytes = self
            .instance
            .get(proposal_id.as_bytes())?
            .ok_or_else(|| WorkflowError::NotFound(format!("proposal {proposal_id}")))?;
        let proposal: Proposal = minicbor::decode(&bytes)?;

        if !proposal.tree().is_well_formed() {
            return Err(WorkflowError::Encoding(format!(
                "proposal {proposal_id} holds a malformed approval tree"
            )));
        }
        Ok((proposal, bytes))
    }

    pub fn load(&self, proposal_id: &str) -> Result<Proposal, WorkflowError> {
        self.load_raw(proposal_id).map(|(proposal, _)| proposal)
    }

    /// Stores a new proposal. Fails if the id is already taken.
    pub fn insert(&self, proposal: &Proposal) -> Result<(), WorkflowError> {
        let cbor = minicbor::to_vec(proposal)?;
        self.instance
            .compare_and_swap(proposal.id.as_bytes(), None::<&[u8]>, Some(cbor))?
            .map_err(|_| {
                WorkflowError::InvalidConfiguration(format!(
                    "proposal {} already exists",
                    proposal.id
                ))
            })?;
        self.instance.flush()?;
        Ok(())
    }

    /// Load, apply `change`, and write back only if nobody else wrote in between.
    /// A lost race reloads and re-applies `change` on the fresh state, so
    /// writers of one proposal are serialized while other proposals are untouched.
    pub fn update<F>(
        &self,
        proposal_id: &str,
        retries: u32,
        mut change: F,
    ) -> Result<(Proposal, Vec<WorkflowEvent>), WorkflowError>
    where
        F: FnMut(&mut Proposal) -> Result<Vec<WorkflowEvent>, WorkflowError>,
    {
        for attempt in 0..=retries {
            let (mut proposal, previous) = self.load_raw(proposal_id)?;
            let events = change(&mut proposal)?;

            let cbor = minicbor::to_vec(&proposal)?;
            if cbor.as_slice() == previous.as_ref() {
                debug!(proposal_id, "nothing changed, skipping write");
                return Ok((proposal, events));
            }

            match self
                .instance
                .compare_and_swap(proposal_id.as_bytes(), Some(previous), Some(cbor))?
            {
                Ok(()) => {
                    self.instance.flush()?;
                    return Ok((proposal, events));
                }
                Err(_) => warn!(proposal_id, attempt, "proposal changed while updating, retrying"),
            }
        }

        Err(WorkflowError::Contention(proposal_id.to_string()))
    }

    /// Every stored proposal. Entries that fail to decode are skipped.
    pub fn all(&self) -> Result<Vec<Proposal>, WorkflowError> {
        let mut proposals = vec![];
        for entry in self.instance.iter() {
            let (key, bytes) = entry?;
            match minicbor::decode::<Proposal>(&bytes) {
                Ok(proposal) => proposals.push(proposal),
                Err(err) => warn!(key = ?key, error = %err, "skipping undecodable proposal"),
            }
        }
        Ok(proposals)
    }
}
