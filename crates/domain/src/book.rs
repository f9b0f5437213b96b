//! Books in the catalogue.

use common::{AggregateId, AggregateKind};
use serde::{Deserialize, Serialize};
use write_store::{Record, UniqueKey};

use crate::aggregate::{Aggregate, ReadView, overlay};
use crate::{DomainError, Result, validate};

const MIN_PUBLICATION_YEAR: i32 = 1900;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: AggregateId,
    pub book_code: String,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub publication_year: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookDraft {
    pub book_code: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AggregateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
}

impl ReadView for BookView {
    fn merge(&mut self, patch: Self) {
        overlay!(self, patch; id, book_code, title, author, publisher, publication_year);
    }
}

impl Record for Book {
    const KIND: AggregateKind = AggregateKind::Book;

    fn id(&self) -> AggregateId {
        self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new("book_code", &self.book_code)]
    }
}

impl Book {
    fn build(id: AggregateId, draft: BookDraft, publisher: String) -> Result<Self> {
        let book_code = validate::text("book_code", draft.book_code, 3, 20)?;
        let title = validate::text("title", draft.title, 1, 200)?;
        let author = validate::text("author", draft.author, 1, 100)?;
        validate::max_len("publisher", &publisher, 100)?;

        let publication_year = validate::required("publication_year", draft.publication_year)?;
        if publication_year < MIN_PUBLICATION_YEAR {
            return Err(DomainError::InvalidInput(format!(
                "publication_year must be {MIN_PUBLICATION_YEAR} or later"
            )));
        }

        Ok(Book {
            id,
            book_code,
            title,
            author,
            publisher,
            publication_year,
        })
    }
}

impl Aggregate for Book {
    type Draft = BookDraft;
    type View = BookView;

    fn create(id: AggregateId, mut draft: BookDraft) -> Result<Self> {
        let publisher = draft.publisher.take().unwrap_or_default();
        Book::build(id, draft, publisher)
    }

    /// An absent publisher keeps the current one.
    fn update(&self, mut draft: BookDraft) -> Result<Self> {
        let publisher = draft
            .publisher
            .take()
            .unwrap_or_else(|| self.publisher.clone());
        Book::build(self.id, draft, publisher)
    }

    fn to_view(&self) -> BookView {
        BookView {
            id: Some(self.id),
            book_code: Some(self.book_code.clone()),
            title: Some(self.title.clone()),
            author: Some(self.author.clone()),
            publisher: Some(self.publisher.clone()),
            publication_year: Some(self.publication_year),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> BookDraft {
        BookDraft {
            book_code: Some("BK-001".into()),
            title: Some("Laskar Pelangi".into()),
            author: Some("Andrea Hirata".into()),
            publisher: Some("Bentang".into()),
            publication_year: Some(2005),
        }
    }

    #[test]
    fn publisher_defaults_to_empty() {
        let mut d = draft();
        d.publisher = None;
        let book = Book::create(AggregateId::new(), d).unwrap();
        assert_eq!(book.publisher, "");
    }

    #[test]
    fn update_without_publisher_keeps_it() {
        let book = Book::create(AggregateId::new(), draft()).unwrap();
        let mut d = draft();
        d.publisher = None;
        d.title = Some("Sang Pemimpi".into());

        let updated = book.update(d).unwrap();
        assert_eq!(updated.publisher, "Bentang");
        assert_eq!(updated.title, "Sang Pemimpi");
    }

    #[test]
    fn year_before_1900_is_rejected() {
        let mut d = draft();
        d.publication_year = Some(1899);
        assert!(matches!(
            Book::create(AggregateId::new(), d),
            Err(DomainError::InvalidInput(_))
        ));

        let mut d = draft();
        d.publication_year = None;
        assert!(Book::create(AggregateId::new(), d).is_err());
    }

    #[test]
    fn code_length_is_checked() {
        let mut d = draft();
        d.book_code = Some("B1".into());
        assert!(Book::create(AggregateId::new(), d).is_err());
    }
}
