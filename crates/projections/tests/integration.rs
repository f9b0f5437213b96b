//! Integration tests: CommandHandler → broker → ProjectionWorker → read store.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use common::{AggregateId, AggregateKind, PageRequest};
use domain::{
    Aggregate, CommandHandler, DomainEvent, Loan, LoanDraft, LoanStatus, LoanView, Member,
    MemberDraft,
};
use messaging::{Broker, EventPublisher, InMemoryBroker, OutboxRelay, RelayConfig, Topology};
use projections::{
    DocumentStore, InMemoryDocumentStore, Projection, ProjectionWorker, ReadProjector,
    ReadRepository,
};
use tokio::sync::watch;
use write_store::InMemoryWriteStore;

struct Context<A: Aggregate> {
    handler: CommandHandler<A>,
    store: Arc<InMemoryWriteStore>,
    publisher: EventPublisher,
    reads: ReadRepository<A::View>,
    _shutdown: watch::Sender<bool>,
}

/// Wires one bounded context: write store, publisher, subscription, worker.
async fn context<A: Aggregate>(broker: &InMemoryBroker) -> Context<A> {
    let topology = Topology::default();
    let publisher = EventPublisher::new(Arc::new(broker.clone()), topology.clone());
    let store = Arc::new(InMemoryWriteStore::new());
    let handler = CommandHandler::new(store.clone(), publisher.clone());

    let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let reads = ReadRepository::<A::View>::new(documents, A::KIND);

    let subscription = broker
        .subscribe(
            &topology.queue_for("test-service", A::KIND),
            &topology.exchange_for(A::KIND),
            &A::KIND.routing_patterns(),
        )
        .await
        .unwrap();

    let mut worker = ProjectionWorker::new();
    worker.register(Arc::new(ReadProjector::<A>::new(reads.clone())));
    let (shutdown, rx) = watch::channel(false);
    worker.spawn(subscription, rx);

    Context {
        handler,
        store,
        publisher,
        reads,
        _shutdown: shutdown,
    }
}

/// Polls the read store until `check` holds for the document at `id`.
async fn eventually<V, F>(reads: &ReadRepository<V>, id: AggregateId, check: F) -> Option<V>
where
    V: domain::ReadView,
    F: Fn(&Option<V>) -> bool,
{
    for _ in 0..200 {
        let doc = reads.get(&id.to_string()).await.unwrap();
        if check(&doc) {
            return doc;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("read model for {id} never converged");
}

fn member_draft(number: &str, email: &str) -> MemberDraft {
    MemberDraft {
        member_number: Some(number.into()),
        name: Some("Rina Wati".into()),
        address: Some("Jl. Melati 7".into()),
        email: Some(email.into()),
    }
}

#[tokio::test]
async fn created_member_reaches_the_read_store() {
    let broker = InMemoryBroker::new();
    let members = context::<Member>(&broker).await;

    let member = members
        .handler
        .create(member_draft("A001", "a@test.com"))
        .await
        .unwrap();
    assert!(
        members
            .handler
            .create(member_draft("A001", "x@test.com"))
            .await
            .is_err()
    );

    let doc = eventually(&members.reads, member.id, Option::is_some)
        .await
        .unwrap();
    assert_eq!(doc.member_number.as_deref(), Some("A001"));
    assert_eq!(doc.email.as_deref(), Some("a@test.com"));
    assert_eq!(doc.id, Some(member.id));
}

#[tokio::test]
async fn update_and_delete_propagate() {
    let broker = InMemoryBroker::new();
    let members = context::<Member>(&broker).await;

    let member = members
        .handler
        .create(member_draft("A001", "a@test.com"))
        .await
        .unwrap();
    members
        .handler
        .update(member.id, member_draft("A001", "b@test.com"))
        .await
        .unwrap();

    eventually(&members.reads, member.id, |doc| {
        doc.as_ref().and_then(|d| d.email.as_deref()) == Some("b@test.com")
    })
    .await;

    members.handler.delete(member.id).await.unwrap();
    eventually(&members.reads, member.id, Option::is_none).await;
    assert!(members.handler.get(member.id).await.is_err());
}

#[tokio::test]
async fn relayed_create_does_not_resurrect_a_deleted_member() {
    let broker = InMemoryBroker::new();
    let members = context::<Member>(&broker).await;

    broker.set_fail_on_publish(true);
    let member = members
        .handler
        .create(member_draft("A001", "a@test.com"))
        .await
        .unwrap();
    broker.set_fail_on_publish(false);
    members.handler.delete(member.id).await.unwrap();

    let relay = OutboxRelay::new(
        members.store.clone(),
        members.publisher.clone(),
        RelayConfig {
            batch_size: 10,
            grace: Duration::ZERO,
            interval: Duration::from_millis(10),
        },
    );
    let report = relay.relay_once().await.unwrap();
    assert_eq!(report.published, 2);

    // Deliveries on one queue are applied in order, so once a later member
    // is visible both relayed events have been projected.
    let later = members
        .handler
        .create(member_draft("A002", "c@test.com"))
        .await
        .unwrap();
    eventually(&members.reads, later.id, Option::is_some).await;

    assert!(members.reads.get(&member.id.to_string()).await.unwrap().is_none());
    assert!(members.handler.get(member.id).await.is_err());
}

#[tokio::test]
async fn loan_status_patch_only_touches_status() {
    let broker = InMemoryBroker::new();
    let loans = context::<Loan>(&broker).await;
    let member_id = AggregateId::new();

    let loan = loans
        .handler
        .create(LoanDraft {
            member_id: Some(member_id.to_string()),
            book_id: Some(AggregateId::new().to_string()),
            loan_date: Some("2024-06-01".into()),
            due_date: Some("2024-06-14".into()),
            status: None,
        })
        .await
        .unwrap();
    loans.handler.patch_status(loan.id, "RETURNED").await.unwrap();

    let doc = eventually(&loans.reads, loan.id, |doc| {
        doc.as_ref().and_then(|d| d.status) == Some(LoanStatus::Returned)
    })
    .await
    .unwrap();
    assert_eq!(doc.member_id, Some(member_id));
    assert_eq!(doc.due_date, Some(loan.due_date));
}

#[tokio::test]
async fn duplicate_and_reordered_deliveries_converge() {
    let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let reads = ReadRepository::<LoanView>::new(documents, AggregateKind::Loan);
    let projector = ReadProjector::<Loan>::new(reads.clone());
    let id = AggregateId::new();

    let created = DomainEvent::Created {
        id,
        fields: LoanView {
            id: Some(id),
            loan_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            status: Some(LoanStatus::Active),
            ..Default::default()
        },
    }
    .to_envelope(AggregateKind::Loan)
    .unwrap();
    let patched = DomainEvent::Updated {
        id,
        fields: LoanView {
            status: Some(LoanStatus::Returned),
            ..Default::default()
        },
    }
    .to_envelope(AggregateKind::Loan)
    .unwrap();

    projector.handle(&patched).await.unwrap();
    projector.handle(&created).await.unwrap();
    projector.handle(&created).await.unwrap();

    let page = reads.list(PageRequest::default()).await.unwrap();
    assert_eq!(page.total, 1);
    let doc = &page.items[0];
    assert_eq!(doc.status, Some(LoanStatus::Returned));
    assert_eq!(doc.loan_date, NaiveDate::from_ymd_opt(2024, 6, 1));
}

#[tokio::test]
async fn each_context_sees_only_its_own_events() {
    let broker = InMemoryBroker::new();
    let members = context::<Member>(&broker).await;
    let loans = context::<Loan>(&broker).await;

    let member = members
        .handler
        .create(member_draft("A001", "a@test.com"))
        .await
        .unwrap();
    eventually(&members.reads, member.id, Option::is_some).await;

    let stray: Option<LoanView> = loans.reads.get(&member.id.to_string()).await.unwrap();
    assert!(stray.is_none());
}
