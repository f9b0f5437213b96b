//! Domain layer of the library services.
//!
//! This crate provides:
//! - `Aggregate` and `ReadView` traits shared by every bounded context
//! - `DomainEvent`, the tagged created/updated/deleted event
//! - `CommandHandler`, one generic validate-store-publish pipeline
//! - The member, book, loan and return aggregates

pub mod aggregate;
pub mod book;
pub mod error;
pub mod event;
pub mod handler;
pub mod loan;
pub mod member;
pub mod returns;
pub mod validate;

pub use aggregate::{Aggregate, ReadView, Reference};
pub use book::{Book, BookDraft, BookView};
pub use error::{DomainError, Result};
pub use event::DomainEvent;
pub use handler::CommandHandler;
pub use loan::{Loan, LoanDraft, LoanStatus, LoanView};
pub use member::{Member, MemberDraft, MemberView};
pub use returns::{Return, ReturnDraft, ReturnView};
