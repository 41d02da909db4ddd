use std::collections::BTreeSet;

use jitgate_domain::{AccessResponse, Decision};

/// Votes of distinct approvers, self-approvals excluded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct ResponseTally {
    approvers: BTreeSet<String>,
    deniers: BTreeSet<String>,
}

impl ResponseTally {
    /// Counts responses for a request filed by `subject`.
    pub(crate) fn collect(subject: &str, responses: &[AccessResponse]) -> Self {
        let mut tally = Self::default();
        for response in responses {
            let approver = response.spec.approver.as_str();
            if approver == subject {
                continue;
            }

            match response.spec.response {
                Decision::Approved => tally.approvers.insert(approver.to_owned()),
                Decision::Denied => tally.deniers.insert(approver.to_owned()),
            };
        }
        tally
    }

    /// Number of distinct approving identities.
    pub(crate) fn approval_count(&self) -> u32 {
        u32::try_from(self.approvers.len()).unwrap_or(u32::MAX)
    }

    /// True when anyone denied.
    pub(crate) fn is_denied(&self) -> bool {
        !self.deniers.is_empty()
    }

    /// Distinct approvers in name order.
    pub(crate) fn approvers(&self) -> Vec<String> {
        self.approvers.iter().cloned().collect()
    }
}
