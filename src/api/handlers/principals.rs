//! Principal management endpoints.
//!
//! Listing requires admin or moderator and creation/deletion require admin; the role
//! stage enforces that before these handlers run. Reads and updates run the Access
//! Policy against the freshly loaded caller.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::instrument;

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::models::AuthenticatedPrincipal;
use crate::auth::policy::{self, Actor, Visibility};
use crate::auth::principal::{
    CreatePrincipalRequest, ListPrincipalsQuery, Principal, PrincipalListResponse,
    PrincipalResponse, UpdatePrincipalRequest,
};
use crate::domain::PrincipalId;
use crate::storage::ListParams;

async fn load_caller(
    state: &ApiState,
    context: &AuthenticatedPrincipal,
) -> Result<Principal, ApiError> {
    Ok(state.store.get(context.id).await?)
}

fn total_pages(total: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 0;
    }
    (total + page_size - 1) / page_size
}

#[utoipa::path(
    get,
    path = "/api/v1/principals",
    params(ListPrincipalsQuery),
    responses(
        (status = 200, description = "Principals visible to the caller", body = PrincipalListResponse),
        (status = 403, description = "Caller may not list principals")
    ),
    security(("bearerAuth" = [])),
    tag = "principals"
)]
#[instrument(skip(state, query), fields(principal_id = %context.id))]
pub async fn list_principals_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthenticatedPrincipal>,
    Query(query): Query<ListPrincipalsQuery>,
) -> Result<Json<PrincipalListResponse>, ApiError> {
    let caller = load_caller(&state, &context).await?;
    let actor = Actor::from_principal(&caller);

    let params = match policy::list_visibility(&actor)? {
        Visibility::All => ListParams::from_query(&query),
        Visibility::Only(ids) => ListParams::from_query(&query).restricted_to(ids),
    };

    let (principals, total) = state.store.list(&params).await?;

    Ok(Json(PrincipalListResponse {
        principals: principals.into_iter().map(PrincipalResponse::from).collect(),
        total,
        page: params.page,
        page_size: params.page_size,
        total_pages: total_pages(total, params.page_size),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/principals/{id}",
    params(("id" = i64, Path, description = "Principal id")),
    responses(
        (status = 200, description = "Principal", body = PrincipalResponse),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Principal not found")
    ),
    security(("bearerAuth" = [])),
    tag = "principals"
)]
#[instrument(skip(state), fields(principal_id = %context.id, target_id = %id))]
pub async fn get_principal_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthenticatedPrincipal>,
    Path(id): Path<PrincipalId>,
) -> Result<Json<PrincipalResponse>, ApiError> {
    let caller = load_caller(&state, &context).await?;
    if !policy::can_view(&Actor::from_principal(&caller), id) {
        return Err(ApiError::forbidden("You do not have access to this user"));
    }

    let principal = state.store.get(id).await?;
    Ok(Json(principal.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/principals",
    request_body = CreatePrincipalRequest,
    responses(
        (status = 201, description = "Principal created", body = PrincipalResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Username already taken")
    ),
    security(("bearerAuth" = [])),
    tag = "principals"
)]
#[instrument(skip(state, payload), fields(principal_id = %context.id))]
pub async fn create_principal_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthenticatedPrincipal>,
    payload: Result<Json<CreatePrincipalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PrincipalResponse>), ApiError> {
    let Json(payload) = payload?;
    let caller = load_caller(&state, &context).await?;
    policy::require_admin(&Actor::from_principal(&caller), "create users")?;

    let principal = state.store.create(payload, Some(context.id)).await?;
    Ok((StatusCode::CREATED, Json(principal.into())))
}

/// Update a principal.
///
/// The request is first reduced to the fields the caller may set on this target; a
/// field the caller may never set rejects the whole request.
#[utoipa::path(
    patch,
    path = "/api/v1/principals/{id}",
    params(("id" = i64, Path, description = "Principal id")),
    request_body = UpdatePrincipalRequest,
    responses(
        (status = 200, description = "Principal updated", body = PrincipalResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Field or target not permitted"),
        (status = 404, description = "Principal not found"),
        (status = 409, description = "Username already taken")
    ),
    security(("bearerAuth" = [])),
    tag = "principals"
)]
#[instrument(skip(state, payload), fields(principal_id = %context.id, target_id = %id))]
pub async fn update_principal_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthenticatedPrincipal>,
    Path(id): Path<PrincipalId>,
    payload: Result<Json<UpdatePrincipalRequest>, JsonRejection>,
) -> Result<Json<PrincipalResponse>, ApiError> {
    let Json(payload) = payload?;
    let caller = load_caller(&state, &context).await?;

    let permitted = policy::authorize_update(&Actor::from_principal(&caller), id, payload)?;
    let updated = state.store.apply_mutation(id, permitted, context.id).await?;

    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/principals/{id}",
    params(("id" = i64, Path, description = "Principal id")),
    responses(
        (status = 204, description = "Principal deleted"),
        (status = 403, description = "Admin role required, or deleting self"),
        (status = 404, description = "Principal not found")
    ),
    security(("bearerAuth" = [])),
    tag = "principals"
)]
#[instrument(skip(state), fields(principal_id = %context.id, target_id = %id))]
pub async fn delete_principal_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthenticatedPrincipal>,
    Path(id): Path<PrincipalId>,
) -> Result<StatusCode, ApiError> {
    let caller = load_caller(&state, &context).await?;
    policy::require_admin(&Actor::from_principal(&caller), "delete users")?;

    state.store.delete(id, context.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
