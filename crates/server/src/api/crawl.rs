//! `/crawl.json`: run one bounded crawl per request.
//!
//! GET takes the seed from the query string and ignores unknown parameters.
//! POST takes a JSON body whose `request` object is validated strictly.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use crawlrt_core::{
    aggregator::DroppedItem, engine::JobArgs, CrawlParams, CrawlReport, Item, Validation,
};

use super::error::ApiError;
use crate::state::AppState;

/// Successful crawl response.
#[derive(Debug, Serialize)]
pub struct CrawlSuccess {
    pub status: &'static str,
    pub items: Vec<Item>,
    pub items_dropped: Vec<DroppedItem>,
    pub stats: BTreeMap<String, Value>,
    pub job_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl From<CrawlReport> for CrawlSuccess {
    fn from(report: CrawlReport) -> Self {
        Self {
            status: "ok",
            items: report.items,
            items_dropped: report.items_dropped,
            stats: report.stats,
            job_name: report.job_name,
            errors: report.errors.filter(|errors| !errors.is_empty()),
        }
    }
}

/// GET /crawl.json
pub async fn crawl_get(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Result<Json<CrawlSuccess>, ApiError> {
    let Query(query) = query?;
    let params = params_from_query(&query)?;
    run(&state, params).await
}

/// POST /crawl.json
pub async fn crawl_post(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<CrawlSuccess>, ApiError> {
    let Json(body) = body?;
    debug!("Crawl request body: {}", body);
    let params = params_from_body(body)?;
    run(&state, params).await
}

async fn run(state: &AppState, params: CrawlParams) -> Result<Json<CrawlSuccess>, ApiError> {
    let report = state.manager().crawl(params).await?.into_result()?;
    Ok(Json(report.into()))
}

fn params_from_query(query: &HashMap<String, String>) -> Result<CrawlParams, ApiError> {
    let url = query
        .get("url")
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::missing("url"))?;
    let job_name = query
        .get("spider_name")
        .or_else(|| query.get("job_name"))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::missing("spider_name"))?;

    let mut params = CrawlParams::for_url(job_name.as_str(), url);
    for key in ["callback", "errback"] {
        if let Some(value) = query.get(key).filter(|v| !v.is_empty()) {
            params = params.with_request_param(key, value.as_str());
        }
    }
    if let Some(raw) = query.get("max_requests") {
        params = params.with_max_requests(raw.as_str());
    }
    if let Some(raw) = query.get("spider_start") {
        params = params.with_spider_start(parse_flag("spider_start", &Value::from(raw.as_str()))?);
    }
    if let Some(raw) = query.get("crawl_args") {
        let args: Value = serde_json::from_str(raw)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON in 'crawl_args': {}", e)))?;
        params = params.with_job_args(job_args(args)?);
    }
    Ok(params.with_validation(Validation::Relaxed))
}

fn params_from_body(body: Value) -> Result<CrawlParams, ApiError> {
    let Value::Object(mut body) = body else {
        return Err(ApiError::bad_request(
            "Invalid JSON in POST body. Expected a JSON object",
        ));
    };

    let request = match body.remove("request") {
        Some(Value::Object(request)) if !request.is_empty() => request,
        Some(Value::Object(_)) | Some(Value::Null) | None => {
            return Err(ApiError::missing("request"))
        }
        Some(_) => return Err(ApiError::bad_request("'request' must be a JSON object")),
    };
    let has_url = request
        .get("url")
        .is_some_and(|url| !url.is_null() && url.as_str() != Some(""));
    if !has_url {
        return Err(ApiError::bad_request(
            "Missing required key 'url' in 'request' object",
        ));
    }

    let job_name = match body.get("spider_name").or_else(|| body.get("job_name")) {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(ApiError::missing("spider_name"))
        }
        Some(_) => return Err(ApiError::bad_request("'spider_name' must be a string")),
    };

    let mut params = CrawlParams::new(job_name, request).with_validation(Validation::Strict);
    if let Some(raw) = body.remove("max_requests").filter(|v| !v.is_null()) {
        params = params.with_max_requests(raw);
    }
    if let Some(raw) = body.get("spider_start") {
        params = params.with_spider_start(parse_flag("spider_start", raw)?);
    }
    if let Some(args) = body.remove("crawl_args").filter(|v| !v.is_null()) {
        params = params.with_job_args(job_args(args)?);
    }
    Ok(params)
}

fn job_args(value: Value) -> Result<JobArgs, ApiError> {
    match value {
        Value::Object(args) => Ok(args),
        _ => Err(ApiError::bad_request("'crawl_args' must be a JSON object")),
    }
}

fn parse_flag(name: &str, value: &Value) -> Result<bool, ApiError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(ApiError::bad_request(format!(
                "Invalid value for '{}': {}",
                name, s
            ))),
        },
        other => Err(ApiError::bad_request(format!(
            "Invalid value for '{}': {}",
            name, other
        ))),
    }
}
