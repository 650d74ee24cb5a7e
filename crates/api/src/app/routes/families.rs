use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use kinship_infra::CallContext;

use crate::app::dto;
use crate::app::errors::AppError;
use crate::app::services::{FamilyService, PersonInput};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_family).get(list_families))
        .route("/:id", get(get_family))
        .route("/:id/parents", post(add_parent))
        .route("/:id/parents/:parent_id/deceased", post(mark_parent_deceased))
        .route("/:id/children", post(add_child))
        .route("/:id/children/:child_id", delete(remove_child))
        .route("/:id/divorce", post(divorce))
}

pub async fn create_family(
    Extension(service): Extension<Arc<FamilyService>>,
    payload: Result<Json<dto::CreateFamilyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = payload?;
    let parents: Vec<PersonInput> = body.parents.into_iter().map(Into::into).collect();
    let children: Vec<PersonInput> = body.children.into_iter().map(Into::into).collect();

    let family = service
        .create_family(&CallContext::new(), body.status, &parents, &children)
        .await?;
    Ok((StatusCode::CREATED, Json(dto::family_to_json(&family))))
}

pub async fn list_families(
    Extension(service): Extension<Arc<FamilyService>>,
) -> Result<impl IntoResponse, AppError> {
    let families = service.list_families(&CallContext::new()).await?;
    Ok(Json(dto::families_to_json(&families)))
}

pub async fn get_family(
    Extension(service): Extension<Arc<FamilyService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let family = service.get_family(&CallContext::new(), &id).await?;
    Ok(Json(dto::family_to_json(&family)))
}

pub async fn find_by_parent(
    Extension(service): Extension<Arc<FamilyService>>,
    Path(parent_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let families = service
        .find_families_by_parent(&CallContext::new(), &parent_id)
        .await?;
    Ok(Json(dto::families_to_json(&families)))
}

pub async fn find_by_child(
    Extension(service): Extension<Arc<FamilyService>>,
    Path(child_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let family = service.find_family_by_child(&CallContext::new(), &child_id).await?;
    Ok(Json(dto::family_to_json(&family)))
}

pub async fn add_parent(
    Extension(service): Extension<Arc<FamilyService>>,
    Path(id): Path<String>,
    payload: Result<Json<dto::PersonRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = payload?;
    let family = service
        .add_parent(&CallContext::new(), &id, &body.into())
        .await?;
    Ok(Json(dto::family_to_json(&family)))
}

pub async fn add_child(
    Extension(service): Extension<Arc<FamilyService>>,
    Path(id): Path<String>,
    payload: Result<Json<dto::PersonRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = payload?;
    let family = service
        .add_child(&CallContext::new(), &id, &body.into())
        .await?;
    Ok(Json(dto::family_to_json(&family)))
}

pub async fn remove_child(
    Extension(service): Extension<Arc<FamilyService>>,
    Path((id, child_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let family = service
        .remove_child(&CallContext::new(), &id, &child_id)
        .await?;
    Ok(Json(dto::family_to_json(&family)))
}

pub async fn mark_parent_deceased(
    Extension(service): Extension<Arc<FamilyService>>,
    Path((id, parent_id)): Path<(String, String)>,
    payload: Result<Json<dto::MarkDeceasedRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = payload?;
    let family = service
        .mark_parent_deceased(&CallContext::new(), &id, &parent_id, body.death_date)
        .await?;
    Ok(Json(dto::family_to_json(&family)))
}

pub async fn divorce(
    Extension(service): Extension<Arc<FamilyService>>,
    Path(id): Path<String>,
    payload: Result<Json<dto::DivorceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(body) = payload?;
    let outcome = service
        .divorce(&CallContext::new(), &id, &body.custodial_parent_id)
        .await?;
    Ok(Json(dto::divorce_to_json(&outcome)))
}
