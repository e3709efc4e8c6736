//! Declarative description of who has to approve, and in which arrangement
use super::error::WorkflowError;
use super::types::UserId;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Children are activated one after another, in order.
    #[n(0)]
    Serial,
    /// Children are all activated at once.
    #[n(1)]
    Parallel,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    #[n(0)]
    Individual(#[n(0)] UserId),
    #[n(1)]
    Group {
        #[n(0)]
        flow: Flow,
        #[n(1)]
        children: Vec<Topology>,
        #[n(2)]
        min_children_needed: Option<u32>, // None means all of them
    },
}

impl Topology {
    pub fn individual(user: impl Into<UserId>) -> Self {
        Self::Individual(user.into())
    }
    pub fn serial(children: Vec<Topology>) -> Self {
        Self::Group {
            flow: Flow::Serial,
            children,
            min_children_needed: None,
        }
    }
    pub fn parallel(children: Vec<Topology>) -> Self {
        Self::Group {
            flow: Flow::Parallel,
            children,
            min_children_needed: None,
        }
    }
    /// A serial chain of individual approvers.
    pub fn linear<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        Self::serial(users.into_iter().map(Self::individual).collect())
    }
    /// Sets the quorum of a group. Has no effect on an individual approval.
    pub fn with_min_children_needed(mut self, k: u32) -> Self {
        if let Self::Group {
            min_children_needed,
            ..
        } = &mut self
        {
            *min_children_needed = Some(k);
        }
        self
    }

    /// Rejects empty groups and quorums outside `1..=children`, at any depth.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        match self {
            Self::Individual(_) => Ok(()),
            Self::Group {
                children,
                min_children_needed,
                ..
            } => {
                if children.is_empty() {
                    return Err(WorkflowError::InvalidConfiguration(
                        "an approval group needs at least one child".into(),
                    ));
                }
                if let Some(k) = min_children_needed {
                    if *k == 0 || *k as usize > children.len() {
                        return Err(WorkflowError::InvalidConfiguration(format!(
                            "min_children_needed must be within 1..={}, got {k}",
                            children.len()
                        )));
                    }
                }
                children.iter().try_for_each(Topology::validate)
            }
        }
    }

    /// Bound identities in tree order. An identity appears once per approval it holds.
    pub fn approvers(&self) -> Vec<&UserId> {
        let mut out = vec![];
        self.collect_approvers(&mut out);
        out
    }

    fn collect_approvers<'a>(&'a self, out: &mut Vec<&'a UserId>) {
        match self {
            Self::Individual(user) => out.push(user),
            Self::Group { children, .. } => {
                for child in children {
                    child.collect_approvers(out);
                }
            }
        }
    }

    /// sha256 over the cbor encoding, used to spot unchanged topologies.
    /// A quorum spelled out as every child hashes the same as the default.
    pub fn digest(&self) -> Result<String, WorkflowError> {
        let cbor = minicbor::to_vec(self.canonical())?;
        Ok(sha256::digest(&cbor))
    }

    fn canonical(&self) -> Topology {
        match self {
            Self::Individual(user) => Self::Individual(user.clone()),
            Self::Group {
                flow,
                children,
                min_children_needed,
            } => Self::Group {
                flow: *flow,
                children: children.iter().map(Topology::canonical).collect(),
                min_children_needed: min_children_needed
                    .filter(|k| *k as usize != children.len()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_groups_are_invalid() {
        let err = Topology::parallel(vec![]).validate().unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidConfiguration(_)));
    }

    #[test]
    fn quorum_must_fit_the_group() {
        let group = || Topology::linear(["a@x.gov", "b@x.gov"]);

        assert!(group().with_min_children_needed(0).validate().is_err());
        assert!(group().with_min_children_needed(3).validate().is_err());
        assert!(group().with_min_children_needed(1).validate().is_ok());
        assert!(group().with_min_children_needed(2).validate().is_ok());
    }

    #[test]
    fn nested_groups_are_validated() {
        let topology = Topology::serial(vec![
            Topology::individual("a@x.gov"),
            Topology::parallel(vec![]),
        ]);
        assert!(topology.validate().is_err());
    }

    #[test]
    fn approvers_are_listed_in_tree_order() {
        let topology = Topology::serial(vec![
            Topology::individual("a@x.gov"),
            Topology::parallel(vec![
                Topology::individual("b@x.gov"),
                Topology::individual("c@x.gov"),
            ]),
        ]);
        let approvers: Vec<_> = topology.approvers().into_iter().map(UserId::as_str).collect();

        assert_eq!(approvers, ["a@x.gov", "b@x.gov", "c@x.gov"]);
    }

    #[test]
    fn digest_tracks_structure() {
        let a = Topology::linear(["a@x.gov", "b@x.gov"]);
        let b = Topology::linear(["a@x.gov", "b@x.gov"]);
        let c = Topology::linear(["b@x.gov", "a@x.gov"]);

        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_ne!(a.digest().unwrap(), c.digest().unwrap());
        assert_ne!(
            a.digest().unwrap(),
            a.clone().with_min_children_needed(1).digest().unwrap()
        );
    }

    #[test]
    fn spelled_out_unanimity_is_the_same_topology() {
        let implicit = Topology::serial(vec![
            Topology::individual("a@x.gov"),
            Topology::parallel(vec![
                Topology::individual("b@x.gov"),
                Topology::individual("c@x.gov"),
            ]),
        ]);
        let explicit = Topology::serial(vec![
            Topology::individual("a@x.gov"),
            Topology::parallel(vec![
                Topology::individual("b@x.gov"),
                Topology::individual("c@x.gov"),
            ])
            .with_min_children_needed(2),
        ])
        .with_min_children_needed(2);

        assert_eq!(implicit.digest().unwrap(), explicit.digest().unwrap());
    }
}
