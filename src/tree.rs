//! Approval trees.
//!
//! A tree is an arena of nodes owned by its proposal. The root always lives at
//! [`ApprovalTree::ROOT`] and nodes are stored in pre-order, so arena order is
//! also the order approvers appear in. Parent links are plain indices and are
//! only ever used to walk upwards after a decision.
//!
//! Leaves hold their own status. A combinator holds none: its status is
//! recomputed from its children every time it is asked for.
use super::approval::{Approval, ApprovalStatus, Decision};
use super::delegation::DelegationResolver;
use super::error::WorkflowError;
use super::topology::{Flow, Topology};
use super::types::{NodeId, UserId};
use tracing::debug;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Combinator {
    #[n(0)]
    flow: Flow,
    #[n(1)]
    children: Vec<NodeId>,
    #[n(2)]
    min_children_needed: u32,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    #[n(0)]
    Leaf(#[n(0)] Approval),
    #[n(1)]
    Combinator(#[n(0)] Combinator),
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Node {
    #[n(0)]
    parent: Option<NodeId>,
    #[n(1)]
    kind: NodeKind,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalTree {
    #[n(0)]
    nodes: Vec<Node>,
}

/// What a single leaf decision did to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub node: NodeId,
    pub decision: Decision,
    pub root_before: ApprovalStatus,
    pub root_after: ApprovalStatus,
}

impl Combinator {
    pub fn flow(&self) -> Flow {
        self.flow
    }
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
    pub fn min_children_needed(&self) -> u32 {
        self.min_children_needed
    }

    /// Aggregates child statuses under this combinator's policy.
    pub fn evaluate<I>(&self, statuses: I) -> ApprovalStatus
    where
        I: IntoIterator<Item = ApprovalStatus>,
    {
        let (mut approved, mut rejected, mut actionable) = (0u32, false, false);
        for status in statuses {
            match status {
                ApprovalStatus::Approved => approved += 1,
                ApprovalStatus::Rejected => rejected = true,
                ApprovalStatus::Actionable => actionable = true,
                ApprovalStatus::Pending => {}
            }
        }
        let unanimous = self.min_children_needed as usize == self.children.len();

        // only groups that need everyone fail fast, a quorum just stops short
        if unanimous && rejected {
            ApprovalStatus::Rejected
        } else if approved >= self.min_children_needed {
            ApprovalStatus::Approved
        } else if actionable {
            ApprovalStatus::Actionable
        } else {
            ApprovalStatus::Pending
        }
    }
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
    pub fn approval(&self) -> Option<&Approval> {
        match &self.kind {
            NodeKind::Leaf(approval) => Some(approval),
            NodeKind::Combinator(_) => None,
        }
    }
}

impl ApprovalTree {
    pub const ROOT: NodeId = NodeId(0);

    /// Builds and activates a fresh tree. Nothing is returned unless the whole
    /// topology is valid.
    pub fn build(topology: &Topology) -> Result<Self, WorkflowError> {
        let mut tree = Self::construct(topology)?;
        tree.activate(Self::ROOT);
        Ok(tree)
    }

    /// Builds a replacement for `previous`. Each new leaf takes over the decision
    /// of the first not yet claimed decided leaf bound to the same identity.
    pub fn build_inheriting(
        topology: &Topology,
        previous: &ApprovalTree,
    ) -> Result<Self, WorkflowError> {
        let mut tree = Self::construct(topology)?;
        let mut claimed = vec![false; previous.nodes.len()];

        for node in tree.nodes.iter_mut() {
            let NodeKind::Leaf(approval) = &mut node.kind else {
                continue;
            };
            let found = previous.leaves().find(|(id, old)| {
                !claimed[id.index()] && old.status().is_decided() && old.user() == approval.user()
            });
            if let Some((id, old)) = found {
                claimed[id.index()] = true;
                approval.inherit(old);
            }
        }

        tree.activate(Self::ROOT);
        Ok(tree)
    }

    fn construct(topology: &Topology) -> Result<Self, WorkflowError> {
        topology.validate()?;
        let mut tree = Self { nodes: vec![] };
        tree.push(topology, None);
        Ok(tree)
    }

    fn push(&mut self, topology: &Topology, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        match topology {
            Topology::Individual(user) => self.nodes.push(Node {
                parent,
                kind: NodeKind::Leaf(Approval::new(user.clone())),
            }),
            Topology::Group {
                flow,
                children,
                min_children_needed,
            } => {
                self.nodes.push(Node {
                    parent,
                    kind: NodeKind::Combinator(Combinator {
                        flow: *flow,
                        children: Vec::with_capacity(children.len()),
                        min_children_needed: min_children_needed
                            .unwrap_or(children.len() as u32),
                    }),
                });
                let ids: Vec<NodeId> = children
                    .iter()
                    .map(|child| self.push(child, Some(id)))
                    .collect();
                if let NodeKind::Combinator(combinator) = &mut self.nodes[id.index()].kind {
                    combinator.children = ids;
                }
            }
        }
        id
    }

    /// Checks the links of a tree that came from outside, e.g. storage.
    pub fn is_well_formed(&self) -> bool {
        if self.nodes.is_empty() || self.nodes[0].parent.is_some() {
            return false;
        }
        self.nodes.iter().enumerate().all(|(index, node)| match &node.kind {
            NodeKind::Leaf(_) => true,
            NodeKind::Combinator(combinator) => {
                let n = combinator.children.len() as u32;
                n > 0
                    && (1..=n).contains(&combinator.min_children_needed)
                    && combinator.children.iter().all(|child| {
                        child.index() > index
                            && self
                                .nodes
                                .get(child.index())
                                .is_some_and(|c| c.parent == Some(NodeId(index as u32)))
                    })
            }
        })
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn approval(&self, id: NodeId) -> Option<&Approval> {
        self.node(id).and_then(Node::approval)
    }

    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, &Approval)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.approval().map(|a| (NodeId(index as u32), a)))
    }

    /// Bound identities in tree order.
    pub fn approvers(&self) -> Vec<&UserId> {
        self.leaves().map(|(_, approval)| approval.user()).collect()
    }

    pub fn status(&self) -> ApprovalStatus {
        self.computed(Self::ROOT)
    }

    pub fn status_of(&self, id: NodeId) -> Result<ApprovalStatus, WorkflowError> {
        match self.nodes.get(id.index()) {
            Some(_) => Ok(self.computed(id)),
            None => Err(WorkflowError::NotFound(format!("node {id}"))),
        }
    }

    // `id` must come from this tree
    fn computed(&self, id: NodeId) -> ApprovalStatus {
        match &self.nodes[id.index()].kind {
            NodeKind::Leaf(approval) => approval.status(),
            NodeKind::Combinator(combinator) => combinator
                .evaluate(combinator.children.iter().map(|child| self.computed(*child))),
        }
    }

    /// The closest group above `id` that has already been decided.
    fn settled_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.nodes.get(id.index())?.parent;
        while let Some(parent) = current {
            if self.computed(parent).is_decided() {
                return Some(parent);
            }
            current = self.nodes[parent.index()].parent;
        }
        None
    }

    /// Leaves that can be decided right now and whose decision still matters:
    /// leaves under an already decided group are left out.
    pub fn actionable_leaves(&self) -> Vec<NodeId> {
        let mut out = vec![];
        self.collect_actionable(Self::ROOT, &mut out);
        out
    }

    fn collect_actionable(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match &self.nodes[id.index()].kind {
            NodeKind::Leaf(approval) => {
                if approval.status() == ApprovalStatus::Actionable {
                    out.push(id);
                }
            }
            NodeKind::Combinator(combinator) => {
                if self.computed(id).is_decided() {
                    return;
                }
                for child in &combinator.children {
                    self.collect_actionable(*child, out);
                }
            }
        }
    }

    /// Makes `id` actionable. Parallel groups activate every child, serial groups
    /// only their first child that hasn't approved yet. Decided groups are left alone.
    pub(crate) fn activate(&mut self, id: NodeId) {
        let children = match &mut self.nodes[id.index()].kind {
            NodeKind::Leaf(approval) => {
                if approval.activate() {
                    debug!(node = %id, user = %approval.user(), "approval became actionable");
                }
                return;
            }
            NodeKind::Combinator(combinator) => (combinator.flow, combinator.children.clone()),
        };
        if self.computed(id).is_decided() {
            return;
        }

        match children {
            (Flow::Parallel, children) => {
                for child in children {
                    self.activate(child);
                }
            }
            (Flow::Serial, children) => {
                let next = children
                    .into_iter()
                    .find(|child| self.computed(*child) != ApprovalStatus::Approved);
                if let Some(next) = next {
                    self.activate(next);
                }
            }
        }
    }

    /// Applies a decision to a leaf and lets it ripple up to the root.
    pub fn decide(
        &mut self,
        id: NodeId,
        actor: &UserId,
        decision: Decision,
        resolver: &dyn DelegationResolver,
    ) -> Result<DecisionOutcome, WorkflowError> {
        let root_before = self.status();
        if self.approval(id).is_none() {
            return Err(WorkflowError::NotFound(format!("approval {id}")));
        }
        // leaves under a decided group no longer count
        if let Some(group) = self.settled_ancestor(id) {
            return Err(WorkflowError::transition(
                decision.verb(),
                format_args!("group {group} above approval {id} is already decided"),
            ));
        }
        if let NodeKind::Leaf(approval) = &mut self.nodes[id.index()].kind {
            approval.decide(id, actor, decision, resolver)?;
        }

        // every undecided ancestor gets a chance to move its serial chain along
        let mut current = id;
        while let Some(parent) = self.nodes[current.index()].parent {
            if !self.computed(parent).is_decided() {
                self.activate(parent);
            }
            debug!(node = %parent, status = %self.computed(parent), "recomputed group");
            current = parent;
        }

        Ok(DecisionOutcome {
            node: id,
            decision,
            root_before,
            root_after: self.status(),
        })
    }
}
