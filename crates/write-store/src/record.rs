use serde::{Serialize, de::DeserializeOwned};

use crate::{AggregateId, AggregateKind};

/// A business-unique value a record claims while it exists.
///
/// Only one live record of an aggregate kind may hold a given
/// `(name, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
    pub name: &'static str,
    pub value: String,
}

impl UniqueKey {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// A row the write store can persist.
///
/// Records are stored as JSON bodies keyed by [`Record::id`]; the store never
/// looks inside them except through [`Record::unique_keys`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The aggregate this record type belongs to.
    const KIND: AggregateKind;

    fn id(&self) -> AggregateId;

    /// Keys that must be unique among live records of this kind.
    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }
}
