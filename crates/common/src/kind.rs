//! The aggregate catalogue and the naming derived from it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One bounded-context entity family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Member,
    Book,
    Loan,
    Return,
}

impl AggregateKind {
    /// Every aggregate, in dependency order (referenced kinds first).
    pub const ALL: [AggregateKind; 4] = [
        AggregateKind::Member,
        AggregateKind::Book,
        AggregateKind::Loan,
        AggregateKind::Return,
    ];

    /// Singular name, also the first word of every routing key.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Member => "member",
            AggregateKind::Book => "book",
            AggregateKind::Loan => "loan",
            AggregateKind::Return => "return",
        }
    }

    /// Plural name used for write tables, read collections and HTTP paths.
    pub fn collection(&self) -> &'static str {
        match self {
            AggregateKind::Member => "members",
            AggregateKind::Book => "books",
            AggregateKind::Loan => "loans",
            AggregateKind::Return => "returns",
        }
    }

    /// Logical name under which the owning service registers itself.
    pub fn service_name(&self) -> &'static str {
        match self {
            AggregateKind::Member => "member-service",
            AggregateKind::Book => "book-service",
            AggregateKind::Loan => "loan-service",
            AggregateKind::Return => "return-service",
        }
    }

    /// Routing key for an event of the given kind, e.g. `loan.updated`.
    pub fn routing_key(&self, event: EventKind) -> String {
        format!("{}.{}", self.as_str(), event.as_str())
    }

    /// The binding patterns a read-model subscription for this aggregate uses.
    pub fn routing_patterns(&self) -> Vec<String> {
        EventKind::ALL
            .iter()
            .map(|event| self.routing_key(*event))
            .collect()
    }
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known aggregate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown aggregate: {0}")]
pub struct UnknownAggregate(pub String);

impl FromStr for AggregateKind {
    type Err = UnknownAggregate;

    /// Accepts the singular name, the collection name or the service name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        AggregateKind::ALL
            .into_iter()
            .find(|kind| {
                needle == kind.as_str()
                    || needle == kind.collection()
                    || needle == kind.service_name()
            })
            .ok_or(UnknownAggregate(s.to_string()))
    }
}

/// The three transitions a record can go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Updated, EventKind::Deleted];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
