//! Request parsing and response data transfer objects for the REST API.
//!
//! `POST /index` bodies are parsed from a raw [`serde_json::Value`] rather
//! than a derived struct so that numeric ids, scalar metadata values and
//! `null` coordinates get the lenient handling wiki clients rely on, with a
//! field-specific 400 for anything else.

use serde::Serialize;
use serde_json::{Map, Value};
use wikindex_core::error::ValidationError;
use wikindex_core::{Document, GeoPoint, SearchQuery, SpatialFilter, StoreError, TextQuery};

/// Response body for `POST /index` and `DELETE /index/:id`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn new(status: &'static str) -> Self {
        Self { status }
    }
}

/// Response body for `POST /admin/compact`.
#[derive(Debug, Serialize)]
pub struct CompactResponse {
    pub status: &'static str,
    pub documents: usize,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `"ok"`, or `"degraded"` after a storage error until the next successful operation.
    pub store: &'static str,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Builds a [`Document`] from a `POST /index` body and validates it.
pub fn parse_document(body: &Value) -> Result<Document, ValidationError> {
    let obj = body
        .as_object()
        .ok_or_else(|| ValidationError::invalid("body", "must be a JSON object"))?;

    let id = match obj.get("id") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("id")),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        Some(_) => return Err(ValidationError::invalid("id", "must be a string or an integer")),
    };

    let mut doc = Document::new(id);
    doc.title = optional_string(obj, "title")?;
    doc.body = optional_string(obj, "body")?;

    match (optional_coordinate(obj, "lat")?, optional_coordinate(obj, "lon")?) {
        (Some(lat), Some(lon)) => doc.location = Some(GeoPoint::new(lat, lon)?),
        (None, None) => {}
        _ => {
            return Err(ValidationError::IncompleteLocation(
                "'lat' and 'lon' must be supplied together",
            ))
        }
    }

    match obj.get("metadata") {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (key, value) in map {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(ValidationError::invalid(
                            format!("metadata.{}", key),
                            "values must be strings, numbers or booleans",
                        ))
                    }
                };
                doc.metadata.insert(key.clone(), value);
            }
        }
        Some(_) => return Err(ValidationError::invalid("metadata", "must be an object")),
    }

    match obj.get("tags") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let tag = item
                    .as_str()
                    .ok_or_else(|| ValidationError::invalid("tags", "must be an array of strings"))?;
                doc.tags.insert(tag.trim().to_string());
            }
        }
        Some(_) => return Err(ValidationError::invalid("tags", "must be an array of strings")),
    }

    doc.validate()?;
    Ok(doc)
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> Result<String, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::invalid(field, "must be a string")),
    }
}

fn optional_coordinate(obj: &Map<String, Value>, field: &str) -> Result<Option<f64>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ValidationError::invalid(field, "must be a number")),
        Some(Value::String(s)) => parse_number(field, s).map(Some),
        Some(_) => Err(ValidationError::invalid(field, "must be a number")),
    }
}

fn parse_number(field: &str, raw: &str) -> Result<f64, ValidationError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ValidationError::invalid(field, format!("'{}' is not a number", raw)))
}

fn parse_count(field: &str, raw: &str) -> Result<usize, ValidationError> {
    raw.trim().parse::<usize>().map_err(|_| {
        ValidationError::invalid(field, format!("'{}' is not a non-negative integer", raw))
    })
}

/// Builds a [`SearchQuery`] from `GET /search` query-string pairs.
///
/// Recognised: `q`, `lat`/`lon`/`radius` (all three or none), `metadata.KEY`
/// (repeatable across keys), `tags` (comma-separated, repeatable), `limit`,
/// `offset`. Anything else is ignored. For single-valued parameters the
/// first occurrence wins.
pub fn parse_search_params(pairs: &[(String, String)]) -> Result<SearchQuery, StoreError> {
    let first = |name: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    let mut query = SearchQuery::new();

    if let Some(q) = first("q").filter(|q| !q.trim().is_empty()) {
        query.text = Some(TextQuery::parse(q)?);
    }

    match (first("lat"), first("lon"), first("radius")) {
        (None, None, None) => {}
        (Some(lat), Some(lon), Some(radius)) => {
            query.spatial = Some(SpatialFilter::new(
                parse_number("lat", lat)?,
                parse_number("lon", lon)?,
                parse_number("radius", radius)?,
            )?);
        }
        _ => {
            return Err(ValidationError::IncompleteLocation(
                "'lat', 'lon' and 'radius' must be supplied together",
            )
            .into())
        }
    }

    for (key, value) in pairs {
        if let Some(meta_key) = key.strip_prefix("metadata.") {
            if meta_key.is_empty() {
                return Err(ValidationError::invalid(key.as_str(), "metadata key must not be empty").into());
            }
            query.metadata.push((meta_key.to_string(), value.clone()));
        } else if key == "tags" {
            query.tags.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            );
        }
    }

    if let Some(limit) = first("limit") {
        query.limit = Some(parse_count("limit", limit)?);
    }
    if let Some(offset) = first("offset") {
        query.offset = parse_count("offset", offset)?;
    }
    query.validate()?;
    Ok(query)
}

/// Metric label for a search, named after how its results are ordered.
pub fn search_type(query: &SearchQuery) -> &'static str {
    if query.text.is_some() {
        "text"
    } else if query.spatial.is_some() {
        "spatial"
    } else if query.has_filters() {
        "filter"
    } else {
        "all"
    }
}
