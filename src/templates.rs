//! Approval chains used by the clients of the procurement system
use super::error::WorkflowError;
use super::topology::Topology;
use super::types::UserId;
use std::str::FromStr;

pub const DEFAULT_BUDGET_MAILBOX: &str = "communicart.budget.approver@gmail.com";
pub const DEFAULT_OFM_MAILBOX: &str = "communicart.ofm.approver@gmail.com";

/// Organisation code of the White House Service Center, which has no tier 1 review.
pub const WHSC_CODE: &str = "P1122021";
/// Office of Leasing organisation codes, reviewed by their own BA80 mailbox.
pub const OOL_CODES: [&str; 3] = ["P1171001", "P1172001", "P1173001"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseType {
    BA60,
    BA61,
    BA80,
}

impl FromStr for ExpenseType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BA60" => Ok(Self::BA60),
            "BA61" => Ok(Self::BA61),
            "BA80" => Ok(Self::BA80),
            other => Err(WorkflowError::InvalidConfiguration(format!(
                "unknown expense type {other:?}"
            ))),
        }
    }
}

/// Everything needed to open a proposal for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub topology: Topology,
    pub observers: Vec<UserId>,
}

/// Role mailboxes that sit in the approval chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailboxes {
    pub ba61_tier1_budget: UserId,
    pub ba61_tier2_budget: UserId,
    pub ba80_budget: UserId,
    pub ool_ba80_budget: UserId,
    pub gsa18f_approver: Option<UserId>,
    pub gsa18f_purchaser: Option<UserId>,
}

impl Default for Mailboxes {
    fn default() -> Self {
        Self {
            ba61_tier1_budget: DEFAULT_BUDGET_MAILBOX.into(),
            ba61_tier2_budget: DEFAULT_OFM_MAILBOX.into(),
            ba80_budget: DEFAULT_BUDGET_MAILBOX.into(),
            ool_ba80_budget: DEFAULT_BUDGET_MAILBOX.into(),
            gsa18f_approver: None,
            gsa18f_purchaser: None,
        }
    }
}

impl Mailboxes {
    /// The approving official first, then the budget offices for the expense type.
    pub fn ncr_work_order(
        &self,
        approving_official: UserId,
        expense_type: ExpenseType,
        org_code: Option<&str>,
    ) -> Template {
        let mut chain = vec![approving_official];
        match expense_type {
            ExpenseType::BA60 | ExpenseType::BA61 => {
                if org_code != Some(WHSC_CODE) {
                    chain.push(self.ba61_tier1_budget.clone());
                }
                chain.push(self.ba61_tier2_budget.clone());
            }
            ExpenseType::BA80 => {
                let ool = org_code.is_some_and(|code| OOL_CODES.contains(&code));
                chain.push(if ool {
                    self.ool_ba80_budget.clone()
                } else {
                    self.ba80_budget.clone()
                });
            }
        }

        Template {
            topology: Topology::linear(chain),
            observers: vec![],
        }
    }

    /// A single approver, with the purchaser watching.
    pub fn gsa18f_procurement(&self) -> Result<Template, WorkflowError> {
        let approver = self.gsa18f_approver.clone().ok_or_else(|| {
            WorkflowError::InvalidConfiguration("GSA18F_APPROVER_EMAIL is not set".into())
        })?;
        let purchaser = self.gsa18f_purchaser.clone().ok_or_else(|| {
            WorkflowError::InvalidConfiguration("GSA18F_PURCHASER_EMAIL is not set".into())
        })?;

        Ok(Template {
            topology: Topology::individual(approver),
            observers: vec![purchaser],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(template: &Template) -> Vec<&str> {
        template
            .topology
            .approvers()
            .into_iter()
            .map(UserId::as_str)
            .collect()
    }

    #[test]
    fn ba61_goes_through_both_tiers() {
        let mailboxes = Mailboxes::default();
        let template =
            mailboxes.ncr_work_order("official@example.gov".into(), ExpenseType::BA61, None);

        assert_eq!(
            chain(&template),
            ["official@example.gov", DEFAULT_BUDGET_MAILBOX, DEFAULT_OFM_MAILBOX]
        );
    }

    #[test]
    fn whsc_skips_tier_one() {
        let mailboxes = Mailboxes::default();
        let template = mailboxes.ncr_work_order(
            "official@example.gov".into(),
            ExpenseType::BA60,
            Some(WHSC_CODE),
        );

        assert_eq!(chain(&template), ["official@example.gov", DEFAULT_OFM_MAILBOX]);
    }

    #[test]
    fn ba80_uses_its_own_mailbox() {
        let mailboxes = Mailboxes {
            ba80_budget: "ba80@example.gov".into(),
            ool_ba80_budget: "ool@example.gov".into(),
            ..Mailboxes::default()
        };

        let plain = mailboxes.ncr_work_order("o@example.gov".into(), ExpenseType::BA80, None);
        let ool =
            mailboxes.ncr_work_order("o@example.gov".into(), ExpenseType::BA80, Some(OOL_CODES[1]));

        assert_eq!(chain(&plain), ["o@example.gov", "ba80@example.gov"]);
        assert_eq!(chain(&ool), ["o@example.gov", "ool@example.gov"]);
    }

    #[test]
    fn expense_types_parse() {
        assert_eq!("ba80".parse::<ExpenseType>().unwrap(), ExpenseType::BA80);
        assert!("BA99".parse::<ExpenseType>().is_err());
    }

    #[test]
    fn gsa18f_needs_its_mailboxes() {
        assert!(Mailboxes::default().gsa18f_procurement().is_err());

        let mailboxes = Mailboxes {
            gsa18f_approver: Some("approver@gsa.gov".into()),
            gsa18f_purchaser: Some("purchaser@gsa.gov".into()),
            ..Mailboxes::default()
        };
        let template = mailboxes.gsa18f_procurement().unwrap();

        assert_eq!(chain(&template), ["approver@gsa.gov"]);
        assert_eq!(template.observers, vec![UserId::new("purchaser@gsa.gov")]);
    }
}
