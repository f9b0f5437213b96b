use chrono::NaiveDate;
use common::{AggregateId, AggregateKind};
use serde::{Deserialize, Serialize};
use write_store::{Record, UniqueKey};

use super::LoanStatus;
use crate::aggregate::{Aggregate, ReadView, Reference, overlay};
use crate::{DomainError, Result, validate};

/// Unique key held by a loan while it is active.
pub(crate) const ACTIVE_LOAN_KEY: &str = "active_loan";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: AggregateId,
    pub member_id: AggregateId,
    pub book_id: AggregateId,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: LoanStatus,
}

/// Create/update request for a loan. Ids and dates arrive as text and are
/// validated into their types.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoanDraft {
    pub member_id: Option<String>,
    pub book_id: Option<String>,
    pub loan_date: Option<String>,
    pub due_date: Option<String>,
    /// Ignored on create; on update it goes through the status machine.
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoanView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AggregateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<AggregateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<AggregateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LoanStatus>,
}

impl ReadView for LoanView {
    fn merge(&mut self, patch: Self) {
        overlay!(self, patch; id, member_id, book_id, loan_date, due_date, status);
    }
}

impl Loan {
    fn active_key(member_id: AggregateId, book_id: AggregateId) -> String {
        format!("{member_id}:{book_id}")
    }

    fn build(id: AggregateId, draft: LoanDraft, status: LoanStatus) -> Result<Self> {
        let member_id = validate::id("member_id", draft.member_id)?;
        let book_id = validate::id("book_id", draft.book_id)?;
        let loan_date = validate::date("loan_date", draft.loan_date)?;
        let due_date = validate::date("due_date", draft.due_date)?;

        if due_date < loan_date {
            return Err(DomainError::InvalidInput(format!(
                "due_date {due_date} precedes loan_date {loan_date}"
            )));
        }

        Ok(Loan {
            id,
            member_id,
            book_id,
            loan_date,
            due_date,
            status,
        })
    }
}

impl Record for Loan {
    const KIND: AggregateKind = AggregateKind::Loan;

    fn id(&self) -> AggregateId {
        self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        match self.status {
            LoanStatus::Active => vec![UniqueKey::new(
                ACTIVE_LOAN_KEY,
                Loan::active_key(self.member_id, self.book_id),
            )],
            LoanStatus::Returned => Vec::new(),
        }
    }
}

impl Aggregate for Loan {
    type Draft = LoanDraft;
    type View = LoanView;

    /// New loans are always active, whatever the draft says.
    fn create(id: AggregateId, draft: LoanDraft) -> Result<Self> {
        Loan::build(id, draft, LoanStatus::Active)
    }

    fn update(&self, mut draft: LoanDraft) -> Result<Self> {
        let status = match draft.status.take() {
            Some(raw) => {
                let requested: LoanStatus = raw.parse()?;
                if requested == self.status {
                    requested
                } else {
                    self.status.transition_to(requested)?
                }
            }
            None => self.status,
        };
        Loan::build(self.id, draft, status)
    }

    fn to_view(&self) -> LoanView {
        LoanView {
            id: Some(self.id),
            member_id: Some(self.member_id),
            book_id: Some(self.book_id),
            loan_date: Some(self.loan_date),
            due_date: Some(self.due_date),
            status: Some(self.status),
        }
    }

    fn references(view: &LoanView) -> Vec<Reference> {
        let mut refs = Vec::new();
        if let Some(member_id) = view.member_id {
            refs.push(Reference::new("member", AggregateKind::Member, member_id));
        }
        if let Some(book_id) = view.book_id {
            refs.push(Reference::new("book", AggregateKind::Book, book_id));
        }
        refs
    }

    fn conflict(key: &str, value: &str) -> DomainError {
        if key == ACTIVE_LOAN_KEY {
            DomainError::BusinessRuleViolation(format!(
                "an active loan already exists for member:book {value}"
            ))
        } else {
            DomainError::DuplicateKey {
                key: key.to_string(),
                value: value.to_string(),
            }
        }
    }
}
