use common::AggregateId;

use super::{Loan, LoanStatus, LoanView};
use crate::handler::CommandHandler;
use crate::Result;

impl CommandHandler<Loan> {
    /// Moves a loan to a new status.
    ///
    /// The Updated event carries only the status.
    #[tracing::instrument(skip(self))]
    pub async fn patch_status(&self, id: AggregateId, status: &str) -> Result<Loan> {
        let target: LoanStatus = status.parse()?;

        self.modify(id, |loan| {
            let status = loan.status.transition_to(target)?;
            let updated = Loan {
                status,
                ..loan.clone()
            };
            let fields = LoanView {
                status: Some(status),
                ..Default::default()
            };
            Ok((updated, fields))
        })
        .await
    }
}
