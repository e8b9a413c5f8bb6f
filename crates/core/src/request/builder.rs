//! Seed request construction from caller-supplied parameters.

use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::info;
use url::Url;

use super::types::{CrawlRequest, DEFAULT_CALLBACK};
use super::RequestError;

/// Parameters a seed request may carry.
pub const ALLOWED_FIELDS: &[&str] = &[
    "url",
    "method",
    "headers",
    "body",
    "meta",
    "callback",
    "errback",
    "priority",
    "dont_filter",
    "cookies",
    "encoding",
    "flags",
];

/// How unknown parameters are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// Unknown parameters are an error.
    Strict,
    /// Unknown parameters are dropped.
    #[default]
    Relaxed,
}

/// The request to inject, plus the handler names to bind to it once the
/// job instance exists.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRequest {
    pub request: CrawlRequest,
    pub callback: String,
    pub errback: Option<String>,
}

/// Build the seed request for `job_name` from `params`.
///
/// The result always has `dont_filter` set so de-duplication never
/// suppresses it.
pub fn build_seed_request(
    job_name: &str,
    params: &Map<String, Value>,
    validation: Validation,
) -> Result<SeedRequest, RequestError> {
    if validation == Validation::Strict {
        if let Some(unknown) = params
            .keys()
            .find(|key| !ALLOWED_FIELDS.contains(&key.as_str()))
        {
            return Err(RequestError::UnexpectedField(unknown.clone()));
        }
    }

    let raw_url = match params.get("url") {
        Some(Value::String(url)) if !url.trim().is_empty() => url.trim(),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(RequestError::MissingUrl)
        }
        Some(_) => return Err(RequestError::invalid("url", "expected a string")),
    };
    let url = parse_url(raw_url)?;

    let mut request = CrawlRequest::get(url).with_dont_filter(true);

    if let Some(method) = params.get("method") {
        request.method = parse_method(method)?;
    }
    if let Some(headers) = params.get("headers") {
        request.headers = string_map("headers", headers)?;
    }
    if let Some(cookies) = params.get("cookies") {
        request.cookies = string_map("cookies", cookies)?;
    }
    match params.get("body") {
        None | Some(Value::Null) => {}
        Some(Value::String(body)) => request.body = Some(body.clone()),
        Some(other) => request.body = Some(other.to_string()),
    }
    match params.get("meta") {
        None | Some(Value::Null) => {}
        Some(Value::Object(meta)) => request.meta = meta.clone(),
        Some(_) => return Err(RequestError::invalid("meta", "expected an object")),
    }
    if let Some(priority) = params.get("priority") {
        request.priority = parse_priority(priority)?;
    }
    match params.get("encoding") {
        None | Some(Value::Null) => {}
        Some(Value::String(encoding)) => request.encoding = encoding.clone(),
        Some(_) => return Err(RequestError::invalid("encoding", "expected a string")),
    }
    match params.get("flags") {
        None | Some(Value::Null) => {}
        Some(Value::Array(flags)) => {
            request.flags = flags
                .iter()
                .map(|flag| match flag {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(RequestError::invalid("flags", "expected a list of strings")),
                })
                .collect::<Result<_, _>>()?;
        }
        Some(_) => return Err(RequestError::invalid("flags", "expected a list of strings")),
    }

    let callback = handler_name("callback", params.get("callback"))?
        .unwrap_or_else(|| DEFAULT_CALLBACK.to_string());
    let errback = handler_name("errback", params.get("errback"))?;

    let args = Value::Object(
        params
            .iter()
            .filter(|(key, _)| key.as_str() != "url")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    );
    info!(
        job = %job_name,
        url = %request.url,
        args = %args,
        "Created request for job"
    );

    Ok(SeedRequest {
        request,
        callback,
        errback,
    })
}

fn parse_url(raw: &str) -> Result<Url, RequestError> {
    let url = Url::parse(raw).map_err(|e| RequestError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RequestError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(RequestError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

fn parse_method(value: &Value) -> Result<Method, RequestError> {
    let Value::String(name) = value else {
        return Err(RequestError::invalid("method", "expected a string"));
    };
    Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| RequestError::invalid("method", format!("'{}' is not an HTTP method", name)))
}

fn parse_priority(value: &Value) -> Result<i32, RequestError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|p| i32::try_from(p).ok())
        .ok_or_else(|| RequestError::invalid("priority", "expected an integer"))
}

fn string_map(field: &str, value: &Value) -> Result<BTreeMap<String, String>, RequestError> {
    let Value::Object(map) = value else {
        return Err(RequestError::invalid(field, "expected an object"));
    };
    map.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(_) | Value::Bool(_) => value.to_string(),
                _ => {
                    return Err(RequestError::invalid(
                        field,
                        format!("value of '{}' must be a string", key),
                    ))
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}

fn handler_name(field: &str, value: Option<&Value>) -> Result<Option<String>, RequestError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) if name.trim().is_empty() => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.trim().to_string())),
        Some(_) => Err(RequestError::invalid(field, "expected a method name")),
    }
}
