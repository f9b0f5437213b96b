//! Applies an aggregate's domain events to its read collection.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AggregateKind, EventEnvelope};
use domain::{Aggregate, DomainEvent, ReadView};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::repository::ReadRepository;

/// Keeps the read view of one aggregate in step with its events.
///
/// Delivery is at-least-once and unordered, so every event is applied so
/// that repeating it, or receiving it before an earlier one, converges on
/// the same document:
/// - Created: insert the snapshot; if a document already exists its present
///   fields are kept and only missing ones are filled from the snapshot
/// - Updated: merge the carried fields over the document, creating it from
///   those fields alone if it is missing
/// - Deleted: remove the document; a missing document is logged and ignored
pub struct ReadProjector<A: Aggregate> {
    repository: ReadRepository<A::View>,
    position: Arc<RwLock<ProjectionPosition>>,
    _phantom: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Clone for ReadProjector<A> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            position: Arc::clone(&self.position),
            _phantom: PhantomData,
        }
    }
}

impl<A: Aggregate> ReadProjector<A> {
    pub fn new(repository: ReadRepository<A::View>) -> Self {
        Self {
            repository,
            position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            _phantom: PhantomData,
        }
    }

    pub fn repository(&self) -> &ReadRepository<A::View> {
        &self.repository
    }

    /// Applies one decoded event.
    pub async fn apply(&self, event: DomainEvent<A::View>) -> Result<()> {
        match event {
            DomainEvent::Created { id, fields } => {
                let key = id.to_string();
                let document = match self.repository.get(&key).await? {
                    Some(existing) => {
                        tracing::debug!(%id, "created event for existing document");
                        let mut merged = fields;
                        merged.merge(existing);
                        merged
                    }
                    None => fields,
                };
                self.repository.upsert(&key, &document).await
            }
            DomainEvent::Updated { id, fields } => {
                let key = id.to_string();
                let document = match self.repository.get(&key).await? {
                    Some(mut existing) => {
                        existing.merge(fields);
                        existing
                    }
                    None => {
                        tracing::warn!(%id, "updated event for missing document, creating it");
                        let mut created = A::View::default();
                        created.merge(fields);
                        created
                    }
                };
                self.repository.upsert(&key, &document).await
            }
            DomainEvent::Deleted { id } => {
                if !self.repository.delete(&id.to_string()).await? {
                    tracing::warn!(%id, "deleted event for missing document");
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<A: Aggregate> Projection for ReadProjector<A> {
    fn name(&self) -> &'static str {
        self.repository.collection()
    }

    fn follows(&self) -> AggregateKind {
        A::KIND
    }

    #[tracing::instrument(
        skip(self, event),
        fields(routing_key = %event.routing_key(), id = %event.aggregate_id)
    )]
    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != A::KIND {
            return Ok(());
        }

        let decoded = DomainEvent::<A::View>::from_envelope(event)?;
        self.apply(decoded).await?;

        let mut pos = self.position.write().await;
        *pos = pos.after(event.event_id);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        self.repository.clear().await?;
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDocumentStore;
    use common::{AggregateId, AggregateKind};
    use domain::{Loan, LoanStatus, LoanView, Member, MemberView};

    fn projector<A: Aggregate>(kind: AggregateKind) -> ReadProjector<A> {
        let store = Arc::new(InMemoryDocumentStore::new());
        ReadProjector::new(ReadRepository::new(store, kind))
    }

    fn member_view(id: AggregateId, number: &str, email: &str) -> MemberView {
        MemberView {
            id: Some(id),
            member_number: Some(number.into()),
            name: Some("Dewi".into()),
            address: Some("Jl. Kenanga 3".into()),
            email: Some(email.into()),
        }
    }

    #[tokio::test]
    async fn created_twice_yields_one_document() {
        let projector = projector::<Member>(AggregateKind::Member);
        let id = AggregateId::new();
        let event = DomainEvent::Created {
            id,
            fields: member_view(id, "A001", "a@test.com"),
        };

        projector.apply(event.clone()).await.unwrap();
        projector.apply(event).await.unwrap();

        let page = projector
            .repository()
            .list(common::PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0], member_view(id, "A001", "a@test.com"));
    }

    #[tokio::test]
    async fn update_merges_over_existing_fields() {
        let projector = projector::<Member>(AggregateKind::Member);
        let id = AggregateId::new();
        projector
            .apply(DomainEvent::Created {
                id,
                fields: member_view(id, "A001", "a@test.com"),
            })
            .await
            .unwrap();

        projector
            .apply(DomainEvent::Updated {
                id,
                fields: MemberView {
                    email: Some("new@test.com".into()),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let doc = projector.repository().get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(doc.email.as_deref(), Some("new@test.com"));
        assert_eq!(doc.member_number.as_deref(), Some("A001"));
    }

    #[tokio::test]
    async fn update_before_create_converges_on_the_union() {
        let projector = projector::<Loan>(AggregateKind::Loan);
        let id = AggregateId::new();
        let member_id = AggregateId::new();

        projector
            .apply(DomainEvent::Updated {
                id,
                fields: LoanView {
                    status: Some(LoanStatus::Returned),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        projector
            .apply(DomainEvent::Created {
                id,
                fields: LoanView {
                    id: Some(id),
                    member_id: Some(member_id),
                    status: Some(LoanStatus::Active),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let doc = projector.repository().get(&id.to_string()).await.unwrap().unwrap();
        assert_eq!(doc.status, Some(LoanStatus::Returned));
        assert_eq!(doc.member_id, Some(member_id));
        assert_eq!(doc.id, Some(id));
    }

    #[tokio::test]
    async fn delete_of_missing_document_is_a_no_op() {
        let projector = projector::<Member>(AggregateKind::Member);
        projector
            .apply(DomainEvent::Deleted {
                id: AggregateId::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn handle_ignores_other_aggregates_and_tracks_position() {
        let projector = projector::<Member>(AggregateKind::Member);
        let id = AggregateId::new();

        let foreign = DomainEvent::<LoanView>::Deleted { id }
            .to_envelope(AggregateKind::Loan)
            .unwrap();
        projector.handle(&foreign).await.unwrap();
        assert_eq!(projector.position().await, ProjectionPosition::zero());

        let own = DomainEvent::Created {
            id,
            fields: member_view(id, "A001", "a@test.com"),
        }
        .to_envelope(AggregateKind::Member)
        .unwrap();
        projector.handle(&own).await.unwrap();
        assert_eq!(projector.position().await.applied, 1);
        assert_eq!(projector.position().await.last_event, Some(own.event_id));

        projector.reset().await.unwrap();
        assert!(projector.repository().get(&id.to_string()).await.unwrap().is_none());
        assert_eq!(projector.position().await, ProjectionPosition::zero());
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error() {
        let projector = projector::<Member>(AggregateKind::Member);
        let envelope = EventEnvelope::builder()
            .aggregate_type(AggregateKind::Member)
            .aggregate_id(AggregateId::new())
            .event_kind(common::EventKind::Created)
            .payload_raw(serde_json::json!({"kind": "renamed"}))
            .build()
            .unwrap();

        assert!(projector.handle(&envelope).await.is_err());
    }
}
