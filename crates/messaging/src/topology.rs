use common::AggregateKind;

/// Default prefix for exchange names.
pub const DEFAULT_EXCHANGE_PREFIX: &str = "library";

/// Naming of exchanges and queues.
///
/// Every aggregate owns one topic exchange, `<prefix>.<aggregate>`. A
/// service that keeps a read model of an aggregate binds one durable queue,
/// `<service>.<aggregate>.read-model`, so that each service receives its own
/// copy of every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    exchange_prefix: String,
}

impl Topology {
    pub fn new(exchange_prefix: impl Into<String>) -> Self {
        Self {
            exchange_prefix: exchange_prefix.into(),
        }
    }

    pub fn exchange_for(&self, kind: AggregateKind) -> String {
        format!("{}.{}", self.exchange_prefix, kind.as_str())
    }

    pub fn queue_for(&self, consumer: &str, kind: AggregateKind) -> String {
        format!("{consumer}.{}.read-model", kind.as_str())
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new(DEFAULT_EXCHANGE_PREFIX)
    }
}
