//! Loan-only endpoints.

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::patch;
use domain::{Loan, LoanView};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::resources::{self, ResourceContext, command_id};

#[derive(Debug, Deserialize)]
pub struct StatusPatch {
    pub status: String,
}

/// The shared CRUD routes plus `PATCH /api/loans/{id}/status`.
pub fn router(context: ResourceContext<Loan>) -> Router {
    let status = Router::new()
        .route("/api/loans/{id}/status", patch(patch_status))
        .with_state(context.clone());
    resources::router(context).merge(status)
}

/// PATCH /api/loans/{id}/status
#[tracing::instrument(skip(ctx, payload))]
pub async fn patch_status(
    State(ctx): State<ResourceContext<Loan>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusPatch>, JsonRejection>,
) -> Result<Json<LoanView>, ApiError> {
    let id = command_id::<Loan>(&id)?;
    let Json(body) = payload?;
    let loan = ctx.commands.patch_status(id, &body.status).await?;
    Ok(Json(domain::Aggregate::to_view(&loan)))
}
