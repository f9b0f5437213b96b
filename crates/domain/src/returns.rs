//! Book returns, one per loan.

use chrono::NaiveDate;
use common::{AggregateId, AggregateKind};
use serde::{Deserialize, Serialize};
use write_store::{Record, UniqueKey};

use crate::aggregate::{Aggregate, ReadView, Reference, overlay};
use crate::{DomainError, Result, validate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Return {
    pub id: AggregateId,
    pub loan_id: AggregateId,
    pub returned_on: NaiveDate,
    /// Days past the loan's due date.
    pub late_days: u32,
    /// Fine in whole currency units.
    pub fine_amount: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReturnDraft {
    pub loan_id: Option<String>,
    pub returned_on: Option<String>,
    pub late_days: Option<i64>,
    pub fine_amount: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AggregateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<AggregateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returned_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_amount: Option<i64>,
}

impl ReadView for ReturnView {
    fn merge(&mut self, patch: Self) {
        overlay!(self, patch; id, loan_id, returned_on, late_days, fine_amount);
    }
}

impl Record for Return {
    const KIND: AggregateKind = AggregateKind::Return;

    fn id(&self) -> AggregateId {
        self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new("loan_id", self.loan_id.to_string())]
    }
}

impl Aggregate for Return {
    type Draft = ReturnDraft;
    type View = ReturnView;

    fn create(id: AggregateId, draft: ReturnDraft) -> Result<Self> {
        let loan_id = validate::id("loan_id", draft.loan_id)?;
        let returned_on = validate::date("returned_on", draft.returned_on)?;
        let late_days = validate::non_negative("late_days", draft.late_days.unwrap_or(0))?;
        let late_days = u32::try_from(late_days)
            .map_err(|_| DomainError::InvalidInput("late_days is too large".to_string()))?;
        let fine_amount = validate::non_negative("fine_amount", draft.fine_amount.unwrap_or(0))?;

        Ok(Return {
            id,
            loan_id,
            returned_on,
            late_days,
            fine_amount,
        })
    }

    fn update(&self, draft: ReturnDraft) -> Result<Self> {
        Return::create(self.id, draft)
    }

    fn to_view(&self) -> ReturnView {
        ReturnView {
            id: Some(self.id),
            loan_id: Some(self.loan_id),
            returned_on: Some(self.returned_on),
            late_days: Some(self.late_days),
            fine_amount: Some(self.fine_amount),
        }
    }

    fn references(view: &ReturnView) -> Vec<Reference> {
        view.loan_id
            .map(|loan_id| Reference::new("loan", AggregateKind::Loan, loan_id))
            .into_iter()
            .collect()
    }
}
