//! HTTP handlers and route table

use crate::errors::ApiError;
use crate::state::AppContext;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use distribution_core::{ContentType, Error as CoreError};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

/// Version index
pub async fn get_api_versions(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "v1": format!("{}/v1", ctx.public_base_url),
    }))
}

/// Endpoint index for v1
pub async fn get_v1_endpoints(ctx: web::Data<AppContext>) -> HttpResponse {
    let base = format!("{}/v1", ctx.public_base_url);
    HttpResponse::Ok().json(json!({
        "transaction": format!("{}/transaction", base),
        "docs": format!("{}/docs", base),
    }))
}

/// Usage documentation for v1
pub async fn describe_v1_usage(ctx: web::Data<AppContext>) -> HttpResponse {
    let base = format!("{}/v1", ctx.public_base_url);

    let mut doc = serde_json::Map::new();
    doc.insert(
        format!("{}/transaction", base),
        json!({
            "GET": "Fetch a paginated list of transactions processed by the system",
            "POST": "Create a new transaction based on the body passed in. \
                     Supported transaction types include application/x12, \
                     application/json, application/edifact",
            "PUT": "Not supported on this endpoint",
            "PATCH": "Not supported on this endpoint",
            "DELETE": "Not supported on this endpoint",
        }),
    );
    doc.insert(
        format!("{}/transaction/{{transaction_id}}", base),
        json!({
            "GET": "Fetch details of the specified transaction",
            "POST": "Not supported on this endpoint",
            "PUT": "Not supported on this endpoint",
            "PATCH": "Not supported on this endpoint",
            "DELETE": "Not supported on this endpoint",
        }),
    );

    HttpResponse::Ok().json(serde_json::Value::Object(doc))
}

/// Health check endpoint
pub async fn health_check(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": ctx.service_name,
        "version": ctx.service_version,
    }))
}

/// Prometheus exposition endpoint
pub async fn metrics_exposition(ctx: web::Data<AppContext>) -> HttpResponse {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&ctx.metrics.registry().gather(), &mut buffer) {
        return HttpResponse::InternalServerError().json(json!({
            "error": format!("Metrics encoding failed: {}", e),
        }));
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

/// Accept a document for distribution
pub async fn submit_transaction(
    ctx: web::Data<AppContext>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let declared = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let content_type = ContentType::from_mime(declared)
        .ok_or_else(|| ApiError::UnsupportedContentType(declared.to_string()))?;

    let transaction_id = ctx.store.submit(&body, content_type)?;
    let document = ctx.projector.project(transaction_id)?;

    Ok(HttpResponse::Accepted()
        .insert_header((header::LOCATION, ctx.projector.status_url(transaction_id)))
        .json(document))
}

/// Poll the status of one transaction
pub async fn get_transaction(
    ctx: web::Data<AppContext>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let raw = path.into_inner();
    let transaction_id = Uuid::parse_str(&raw)
        .map_err(|_| ApiError::Core(CoreError::TransactionNotFound(raw)))?;

    let document = ctx.projector.project(transaction_id)?;
    Ok(HttpResponse::Ok().json(document))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

/// List processed transactions
pub async fn list_transactions(
    ctx: web::Data<AppContext>,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let records = ctx.store.list(params.offset, limit)?;

    let transactions: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            json!({
                "transaction_id": record.transaction_id,
                "content_type": record.content_type.mime(),
                "created_at": record.created_at,
                "status_url": ctx.projector.status_url(record.transaction_id),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "transactions": transactions,
        "offset": params.offset,
        "limit": limit,
    })))
}

/// Explicit 405 for methods the transaction endpoints do not support
pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({
        "error": "Method not supported on this endpoint",
    }))
}

/// JSON 404 for unknown paths
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "error": "Resource not found",
    }))
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(get_api_versions)))
        .service(web::resource("/v1").route(web::get().to(get_v1_endpoints)))
        .service(web::resource("/v1/docs").route(web::get().to(describe_v1_usage)))
        .service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/metrics").route(web::get().to(metrics_exposition)))
        .service(
            web::resource("/v1/transaction")
                .route(web::get().to(list_transactions))
                .route(web::post().to(submit_transaction))
                .route(web::route().to(method_not_allowed)),
        )
        .service(
            web::resource("/v1/transaction/{transaction_id}")
                .route(web::get().to(get_transaction))
                .route(web::route().to(method_not_allowed)),
        );
}
