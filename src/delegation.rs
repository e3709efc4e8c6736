//! Delegation lookups consumed by the approval leaves
use super::types::UserId;
use std::collections::HashMap;

/// Maps an acting identity to the identity it is authorized to act as.
pub trait DelegationResolver {
    fn resolve_actor(&self, actor: &UserId) -> UserId;
}

/// Nobody acts for anybody else.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelegation;

impl DelegationResolver for NoDelegation {
    fn resolve_actor(&self, actor: &UserId) -> UserId {
        actor.clone()
    }
}

/// In-memory delegate -> principal table.
#[derive(Debug, Default, Clone)]
pub struct DelegationTable {
    principals: HashMap<UserId, UserId>,
}

impl DelegationTable {
    pub fn new() -> Self {
        Self::default()
    }
    /// `delegate` may act on behalf of `principal`. A delegate serves one principal,
    /// adding it again replaces the previous principal.
    pub fn add_delegate(&mut self, principal: UserId, delegate: UserId) -> Option<UserId> {
        self.principals.insert(delegate, principal)
    }
    pub fn remove_delegate(&mut self, delegate: &UserId) -> Option<UserId> {
        self.principals.remove(delegate)
    }
}

impl DelegationResolver for DelegationTable {
    fn resolve_actor(&self, actor: &UserId) -> UserId {
        self.principals
            .get(actor)
            .cloned()
            .unwrap_or_else(|| actor.clone())
    }
}
