//! CRUD endpoints shared by every bounded context.
//!
//! Commands go to the write side and answer with the committed record.
//! Reads are served from the read store and so lag behind commands until
//! the projection catches up. `/api/admin/{collection}` lists the write
//! store directly, for checking what the read side has not seen yet.

use axum::Json;
use axum::Router;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use common::{AggregateId, Page, PageRequest};
use domain::{Aggregate, CommandHandler, DomainError};
use query::{CompositeView, QueryAggregator};

use crate::error::ApiError;

/// Command and query side of one hosted aggregate.
pub struct ResourceContext<A: Aggregate> {
    pub commands: CommandHandler<A>,
    pub queries: QueryAggregator<A>,
}

impl<A: Aggregate> Clone for ResourceContext<A> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            queries: self.queries.clone(),
        }
    }
}

/// Routes for `/api/{collection}` backed by `context`.
pub fn router<A: Aggregate>(context: ResourceContext<A>) -> Router {
    let collection = A::KIND.collection();
    Router::new()
        .route(&format!("/api/{collection}"), get(list::<A>).post(create::<A>))
        .route(
            &format!("/api/{collection}/{{id}}"),
            get(get_one::<A>).put(update::<A>).delete(delete::<A>),
        )
        .route(&format!("/api/{collection}/{{id}}/detail"), get(detail::<A>))
        .route(&format!("/api/admin/{collection}"), get(admin_list::<A>))
        .with_state(context)
}

/// Parses a path id for a command; an id that is not a UUID names no record.
pub(crate) fn command_id<A: Aggregate>(id: &str) -> Result<AggregateId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::Domain(DomainError::not_found(A::KIND, id)))
}

/// POST /api/{collection}
#[tracing::instrument(skip_all, fields(aggregate = %A::KIND))]
pub async fn create<A: Aggregate>(
    State(ctx): State<ResourceContext<A>>,
    payload: Result<Json<A::Draft>, JsonRejection>,
) -> Result<(StatusCode, Json<A::View>), ApiError> {
    let Json(draft) = payload?;
    let record = ctx.commands.create(draft).await?;
    Ok((StatusCode::CREATED, Json(record.to_view())))
}

/// GET /api/{collection}?page=&size=
#[tracing::instrument(skip_all, fields(aggregate = %A::KIND))]
pub async fn list<A: Aggregate>(
    State(ctx): State<ResourceContext<A>>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Json<Page<A::View>>, ApiError> {
    let Query(page) = page?;
    Ok(Json(ctx.queries.list(page.normalized()).await?))
}

/// GET /api/admin/{collection}?page=&size=
#[tracing::instrument(skip_all, fields(aggregate = %A::KIND))]
pub async fn admin_list<A: Aggregate>(
    State(ctx): State<ResourceContext<A>>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Json<Page<A::View>>, ApiError> {
    let Query(page) = page?;
    let records = ctx.commands.list(page.normalized()).await?;
    Ok(Json(records.map(|record| record.to_view())))
}

/// GET /api/{collection}/{id}
#[tracing::instrument(skip(ctx), fields(aggregate = %A::KIND))]
pub async fn get_one<A: Aggregate>(
    State(ctx): State<ResourceContext<A>>,
    Path(id): Path<String>,
) -> Result<Json<A::View>, ApiError> {
    Ok(Json(ctx.queries.get_by_id(&id).await?))
}

/// GET /api/{collection}/{id}/detail
#[tracing::instrument(skip(ctx), fields(aggregate = %A::KIND))]
pub async fn detail<A: Aggregate>(
    State(ctx): State<ResourceContext<A>>,
    Path(id): Path<String>,
) -> Result<Json<CompositeView<A::View>>, ApiError> {
    Ok(Json(ctx.queries.get_composite(&id).await?))
}

/// PUT /api/{collection}/{id}
#[tracing::instrument(skip(ctx, payload), fields(aggregate = %A::KIND))]
pub async fn update<A: Aggregate>(
    State(ctx): State<ResourceContext<A>>,
    Path(id): Path<String>,
    payload: Result<Json<A::Draft>, JsonRejection>,
) -> Result<Json<A::View>, ApiError> {
    let id = command_id::<A>(&id)?;
    let Json(draft) = payload?;
    let record = ctx.commands.update(id, draft).await?;
    Ok(Json(record.to_view()))
}

/// DELETE /api/{collection}/{id}
#[tracing::instrument(skip(ctx), fields(aggregate = %A::KIND))]
pub async fn delete<A: Aggregate>(
    State(ctx): State<ResourceContext<A>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = command_id::<A>(&id)?;
    ctx.commands.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
