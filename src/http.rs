//! HTTP surface
//!
//! Seller and admin routes over the request lifecycle and listing catalog.
//! Callers identify themselves with `x-user-id`; the client address comes
//! from `x-forwarded-for`.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::application::commands::{
    AddOffer, ApproveCatalogRequest, ListingDraft, RejectCatalogRequest, SaveListing, SubmitCatalogRequest,
};
use crate::application::ports::{CallerContext, CatalogStore, EventPublisher, Page};
use crate::domain::aggregates::{CatalogRequest, Category, CategoryScope, RequestStatus};
use crate::domain::slug::SlugAllocator;
use crate::{CatalogError, CommandResult, FailureKind, ListingCatalog, RequestLifecycle};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

pub struct AppState<S> {
    pub lifecycle: RequestLifecycle<S>,
    pub listings: ListingCatalog<S>,
    pub store: Arc<S>,
    /// Cancelled on shutdown; in-flight commands stop before their next write.
    pub shutdown: CancellationToken,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            listings: self.listings.clone(),
            store: Arc::clone(&self.store),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: CatalogStore> AppState<S> {
    pub fn new(store: Arc<S>, slugs: SlugAllocator, events: Arc<dyn EventPublisher>, shutdown: CancellationToken) -> Self {
        Self {
            lifecycle: RequestLifecycle::new(Arc::clone(&store), slugs.clone(), Arc::clone(&events)),
            listings: ListingCatalog::new(Arc::clone(&store), slugs, events),
            store,
            shutdown,
        }
    }
}

pub fn router<S: CatalogStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-catalog"})) }))
        .route("/api/v1/catalog-requests", get(list_requests::<S>).post(submit_request::<S>))
        .route("/api/v1/catalog-requests/:id", get(get_request::<S>).put(revise_request::<S>))
        .route("/api/v1/catalog-requests/:id/approve", post(approve_request::<S>))
        .route("/api/v1/catalog-requests/:id/reject", post(reject_request::<S>))
        .route("/api/v1/listings", post(create_listing::<S>))
        .route("/api/v1/listings/:id", get(get_listing::<S>).put(update_listing::<S>))
        .route("/api/v1/listings/:id/offers", get(list_offers::<S>).post(add_offer::<S>))
        .route("/api/v1/categories", get(list_categories::<S>).post(create_category::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Caller and errors
// =============================================================================

/// Identity and origin of the caller.
pub struct Caller(pub CallerContext);

impl Caller {
    fn user_id(&self) -> Result<Uuid, ApiError> {
        self.0.user_id.ok_or(ApiError::Unauthorized)
    }
}

#[axum::async_trait]
impl<St: Send + Sync> FromRequestParts<St> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let user_id = match parts.headers.get(USER_ID_HEADER) {
            None => None,
            Some(value) => Some(
                value
                    .to_str()
                    .ok()
                    .and_then(|v| Uuid::parse_str(v.trim()).ok())
                    .ok_or_else(|| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER} header")))?,
            ),
        };
        let ip_address = parts
            .headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Caller(CallerContext { user_id, ip_address }))
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    Catalog(CatalogError),
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, failure) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, format!("{USER_ID_HEADER} header is required"), None),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message, Some(FailureKind::Validation)),
            Self::Catalog(CatalogError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service is shutting down".to_string(), None)
            }
            Self::Catalog(err) => match err.failure_kind() {
                Some(kind) => (failure_status(kind), err.to_string(), Some(kind)),
                None => {
                    tracing::error!(error = %err, "catalog command failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
                }
            },
        };
        (status, Json(CommandResult::<()> { success: false, message: Some(message), failure, data: None }))
            .into_response()
    }
}

fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Validation => StatusCode::BAD_REQUEST,
        FailureKind::Conflict => StatusCode::CONFLICT,
        FailureKind::NotFound => StatusCode::NOT_FOUND,
    }
}

/// The envelope with a status matching its outcome.
fn respond<T: Serialize>(result: CommandResult<T>, success: StatusCode) -> Response {
    let status = result.failure.map_or(success, failure_status);
    (status, Json(result)).into_response()
}

type ApiResult = Result<Response, ApiError>;

// =============================================================================
// Catalog requests
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub per_page: u32,
}

async fn submit_request<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    caller: Caller,
    Json(payload): Json<SubmitCatalogRequest>,
) -> ApiResult {
    let seller_id = caller.user_id()?;
    let result = s.lifecycle.submit(seller_id, payload, &caller.0, &s.shutdown).await?;
    Ok(respond(result, StatusCode::CREATED))
}

async fn revise_request<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    Path(id): Path<Uuid>,
    caller: Caller,
    Json(draft): Json<ListingDraft>,
) -> ApiResult {
    let seller_id = caller.user_id()?;
    let result = s.lifecycle.revise(id, seller_id, draft, &caller.0, &s.shutdown).await?;
    Ok(respond(result, StatusCode::OK))
}

async fn list_requests<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<CatalogRequest>>, ApiError> {
    let status = p
        .status
        .as_deref()
        .map(str::parse::<RequestStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let page = Page::new(p.page, p.per_page);
    let data = s.lifecycle.list(status, page).await?;
    Ok(Json(PaginatedResponse { data, page: page.page, per_page: page.per_page }))
}

async fn get_request<S: CatalogStore + 'static>(State(s): State<AppState<S>>, Path(id): Path<Uuid>) -> ApiResult {
    Ok(respond(s.lifecycle.find(id).await?, StatusCode::OK))
}

async fn approve_request<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    Path(id): Path<Uuid>,
    caller: Caller,
    decision: Option<Json<ApproveCatalogRequest>>,
) -> ApiResult {
    let reviewer_id = caller.user_id()?;
    let decision = decision.map(|Json(d)| d).unwrap_or_default();
    let result = s.lifecycle.approve(id, reviewer_id, decision, &caller.0, &s.shutdown).await?;
    Ok(respond(result, StatusCode::OK))
}

async fn reject_request<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    Path(id): Path<Uuid>,
    caller: Caller,
    payload: Option<Json<RejectCatalogRequest>>,
) -> ApiResult {
    let reviewer_id = caller.user_id()?;
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let result = s.lifecycle.reject(id, reviewer_id, payload, &caller.0, &s.shutdown).await?;
    Ok(respond(result, StatusCode::OK))
}

// =============================================================================
// Listings and offers
// =============================================================================

async fn create_listing<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    caller: Caller,
    Json(payload): Json<SaveListing>,
) -> ApiResult {
    let result = s.listings.create(payload, &caller.0, &s.shutdown).await?;
    Ok(respond(result, StatusCode::CREATED))
}

async fn get_listing<S: CatalogStore + 'static>(State(s): State<AppState<S>>, Path(id): Path<Uuid>) -> ApiResult {
    Ok(respond(s.listings.listing(id).await?, StatusCode::OK))
}

async fn update_listing<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    Path(id): Path<Uuid>,
    caller: Caller,
    Json(payload): Json<SaveListing>,
) -> ApiResult {
    let result = s.listings.update(id, payload, &caller.0, &s.shutdown).await?;
    Ok(respond(result, StatusCode::OK))
}

async fn list_offers<S: CatalogStore + 'static>(State(s): State<AppState<S>>, Path(id): Path<Uuid>) -> ApiResult {
    Ok(respond(s.listings.offers(id).await?, StatusCode::OK))
}

#[derive(Debug, Deserialize)]
pub struct OfferTerms {
    pub price: i64,
    pub inventory: i32,
    #[serde(default)]
    pub publish: bool,
}

async fn add_offer<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    Path(id): Path<Uuid>,
    caller: Caller,
    Json(terms): Json<OfferTerms>,
) -> ApiResult {
    let seller_id = caller.user_id()?;
    let payload = AddOffer { product_id: id, price: terms.price, inventory: terms.inventory, publish: terms.publish };
    let result = s.listings.add_offer(seller_id, payload, &caller.0, &s.shutdown).await?;
    Ok(respond(result, StatusCode::CREATED))
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub scope: CategoryScope,
}

async fn list_categories<S: CatalogStore + 'static>(State(s): State<AppState<S>>) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = s.store.categories().await.map_err(CatalogError::from)?;
    Ok(Json(categories))
}

async fn create_category<S: CatalogStore + 'static>(
    State(s): State<AppState<S>>,
    Json(r): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let name = r.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Category name is required".into()));
    }
    let category = Category::new(name, r.scope);
    s.store.add_category(&category).await.map_err(CatalogError::from)?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{CategoryStore, NullPublisher};
    use crate::infrastructure::memory::InMemoryCatalogStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> (Router, Category, CancellationToken) {
        let store = Arc::new(InMemoryCatalogStore::default());
        let category = Category::new("Courses", CategoryScope::General);
        store.add_category(&category).await.unwrap();
        let shutdown = CancellationToken::new();
        let state = AppState::new(store, SlugAllocator::default(), Arc::new(NullPublisher), shutdown.clone());
        (router(state), category, shutdown)
    }

    async fn call(app: &Router, method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri).header(FORWARDED_FOR_HEADER, "203.0.113.9, 10.0.0.1");
        if let Some(user) = user {
            request = request.header(USER_ID_HEADER, user.to_string());
        }
        let body = match body {
            Some(body) => {
                request = request.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    fn product(category: &Category) -> Value {
        json!({ "name": "Leather Bag", "description": "Hand stitched", "price": 250000, "inventory": 3, "category_id": category.id })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = app().await;
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_submit_and_approve_flow() {
        let (app, category, _) = app().await;
        let (seller, admin) = (Uuid::now_v7(), Uuid::now_v7());

        let (status, body) = call(&app, "POST", "/api/v1/catalog-requests", None, Some(product(&category))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, body) = call(&app, "POST", "/api/v1/catalog-requests", Some(seller), Some(product(&category))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["seo_slug"], "leather-bag");
        assert_eq!(body["data"]["created"]["ip_address"], "203.0.113.9");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let approve = format!("/api/v1/catalog-requests/{id}/approve");
        let (status, body) = call(&app, "POST", &approve, Some(admin), Some(json!({ "publish": true }))).await;
        assert_eq!(status, StatusCode::OK);
        let listing_id = body["data"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "POST", &approve, Some(admin), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["failure"], "conflict");

        let (status, body) = call(&app, "GET", &format!("/api/v1/listings/{listing_id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_published"], true);
        assert!(body["data"]["seo_slug"].as_str().unwrap().ends_with("~leather-bag"));

        let (_, body) = call(&app, "GET", "/api/v1/catalog-requests?status=approved", None, None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reject_records_reviewer() {
        let (app, category, _) = app().await;
        let (seller, admin) = (Uuid::now_v7(), Uuid::now_v7());
        let (_, body) = call(&app, "POST", "/api/v1/catalog-requests", Some(seller), Some(product(&category))).await;
        let id = body["data"]["id"].as_str().unwrap().to_string();
        let reject = format!("/api/v1/catalog-requests/{id}/reject");

        let (status, _) = call(&app, "POST", &reject, None, Some(json!({ "reason": "Blurry photos" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (_, body) = call(&app, "GET", &format!("/api/v1/catalog-requests/{id}"), None, None).await;
        assert_eq!(body["data"]["status"], "pending");

        let (status, _) = call(&app, "POST", &reject, Some(admin), Some(json!({ "reason": "Blurry photos" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, "GET", &format!("/api/v1/catalog-requests/{id}"), None, None).await;
        assert_eq!(body["data"]["status"], "rejected");
        assert_eq!(body["data"]["reviewer_id"], admin.to_string());
    }

    #[tokio::test]
    async fn test_failure_statuses() {
        let (app, category, _) = app().await;
        let seller = Uuid::now_v7();

        let mut invalid = product(&category);
        invalid["is_custom_order"] = json!(true);
        let (status, body) = call(&app, "POST", "/api/v1/catalog-requests", Some(seller), Some(invalid)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Custom orders cannot have a price");

        let (status, _) = call(&app, "GET", &format!("/api/v1/catalog-requests/{}", Uuid::now_v7()), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "GET", "/api/v1/catalog-requests?status=archived", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_writes() {
        let (app, category, shutdown) = app().await;
        shutdown.cancel();
        let (status, _) = call(&app, "POST", "/api/v1/catalog-requests", Some(Uuid::now_v7()), Some(product(&category))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_direct_listing_and_offer() {
        let (app, category, _) = app().await;
        let seller = Uuid::now_v7();
        let (status, body) = call(&app, "POST", "/api/v1/listings", None, Some(product(&category))).await;
        assert_eq!(status, StatusCode::CREATED);
        let offers = format!("/api/v1/listings/{}/offers", body["data"]["id"].as_str().unwrap());

        let terms = json!({ "price": 240000, "inventory": 1 });
        let (status, _) = call(&app, "POST", &offers, Some(seller), Some(terms.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = call(&app, "POST", &offers, Some(seller), Some(terms)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = call(&app, "GET", &offers, None, None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_categories() {
        let (app, _, _) = app().await;
        let (status, _) = call(&app, "POST", "/api/v1/categories", None, Some(json!({ "name": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "POST", "/api/v1/categories", None, Some(json!({ "name": "Articles", "scope": "blog" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["scope"], "blog");

        let (_, body) = call(&app, "GET", "/api/v1/categories", None, None).await;
        let names: Vec<_> = body.as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["Articles", "Courses"]);
    }
}
