//! Loans of a book to a member.

mod aggregate;
mod service;
mod status;

pub use aggregate::{Loan, LoanDraft, LoanView};
pub use status::LoanStatus;
