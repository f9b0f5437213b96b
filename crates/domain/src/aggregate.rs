//! Core aggregate and read view traits.

use std::fmt::Debug;

use common::{AggregateId, AggregateKind};
use serde::{Serialize, de::DeserializeOwned};
use write_store::Record;

use crate::{DomainError, Result};

/// The document form of an aggregate kept in the read store.
///
/// Every field is optional: a view built from a partial update only carries
/// the fields that update touched.
pub trait ReadView:
    Default + Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Overlays every field present in `patch`, leaving the rest untouched.
    fn merge(&mut self, patch: Self);
}

/// Copies each listed field from `$patch` into `$target` when it is `Some`.
macro_rules! overlay {
    ($target:expr, $patch:expr; $($field:ident),+ $(,)?) => {
        $(
            if $patch.$field.is_some() {
                $target.$field = $patch.$field;
            }
        )+
    };
}
pub(crate) use overlay;

/// A peer record a view points at, resolved when building composite views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Key under which the peer record appears in the composite view.
    pub name: &'static str,
    pub kind: AggregateKind,
    pub id: String,
}

impl Reference {
    pub fn new(name: &'static str, kind: AggregateKind, id: impl ToString) -> Self {
        Self {
            name,
            kind,
            id: id.to_string(),
        }
    }
}

/// A library aggregate: a write record plus the rules for changing it.
pub trait Aggregate: Record + Debug {
    /// Request payload for create and full update.
    type Draft: DeserializeOwned + Debug + Send + Sync + 'static;

    /// Read-side document.
    type View: ReadView;

    /// Validates a draft into a new record.
    fn create(id: AggregateId, draft: Self::Draft) -> Result<Self>;

    /// Validates a draft against the current record and returns the
    /// replacement.
    fn update(&self, draft: Self::Draft) -> Result<Self>;

    /// Full snapshot of the record as a view.
    fn to_view(&self) -> Self::View;

    /// Peer records this view refers to.
    fn references(_view: &Self::View) -> Vec<Reference> {
        Vec::new()
    }

    /// Maps a taken unique key to the error callers see.
    fn conflict(key: &str, value: &str) -> DomainError {
        DomainError::DuplicateKey {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
