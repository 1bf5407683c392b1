use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::ServiceConfig;

use super::error::{FeatureServiceError, Result};

/// Environment variable selecting the platform TLS library instead of the pure-Rust one.
pub const USE_NATIVE_TLS_ENV: &str = "PARCELS_USE_NATIVE_TLS";

/// Page size used when the layer metadata does not state a `maxRecordCount`.
const DEFAULT_MAX_RECORD_COUNT: usize = 1000;

pub type JsonObject = serde_json::Map<String, Value>;

/// A complete query response: the service's response document with all fetched features in its
/// `features` array.
#[derive(Debug)]
pub struct QueryResult {
    pub document: JsonObject,
    pub feature_count: usize,
}

#[derive(Deserialize, Debug)]
struct ObjectIdsResponse {
    #[serde(rename = "objectIds", default)]
    object_ids: Option<Vec<i64>>,
}

#[derive(Deserialize, Debug)]
struct ServiceErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<String>,
}

/// Blocking client for the query endpoint of a single feature-service layer.
pub struct FeatureServiceClient {
    client: Client,
    layer_url: String,
    config: ServiceConfig,
}

impl FeatureServiceClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        let builder = if use_native_tls(std::env::var(USE_NATIVE_TLS_ENV).ok().as_deref()) {
            log::debug!("Using the native TLS backend");
            builder.use_native_tls()
        } else {
            builder.use_rustls_tls()
        };
        let builder = match config.timeout_secs {
            Some(timeout_secs) => builder.timeout(Duration::from_secs(timeout_secs)),
            None => builder,
        };
        Ok(Self {
            client: builder.build()?,
            layer_url: config.data_source.trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }

    /// Query all features matching `predicate`.
    ///
    /// With `exceed_limit` the matching object ids are requested first and the features are then
    /// fetched page by page, so the service's per-request record limit does not truncate the
    /// result. The number of features received must equal the number of ids.
    pub fn query(&self, predicate: &str) -> Result<QueryResult> {
        if !self.config.exceed_limit {
            let mut document = self.post_query(&self.where_params(predicate))?;
            if exceeded_transfer_limit(&document) {
                log::warn!(
                    "Result for '{}' was truncated by the service's record limit",
                    predicate
                );
            }
            let feature_count = features_mut(&mut document)?.len();
            return Ok(QueryResult {
                document,
                feature_count,
            });
        }

        let object_ids = self.query_object_ids(predicate)?;
        if object_ids.is_empty() {
            let mut document = self.post_query(&self.where_params(predicate))?;
            let feature_count = features_mut(&mut document)?.len();
            return Ok(QueryResult {
                document,
                feature_count,
            });
        }

        let page_size = match self.config.page_size {
            Some(page_size) => page_size,
            None => self.max_record_count()?,
        }
        .max(1);
        log::debug!(
            "Fetching {} features in pages of {}",
            object_ids.len(),
            page_size
        );

        let mut document: Option<JsonObject> = None;
        let mut features = Vec::with_capacity(object_ids.len());
        for chunk in object_ids.chunks(page_size) {
            let mut page = self.post_query(&self.object_id_params(chunk))?;
            features.append(features_mut(&mut page)?);
            if document.is_none() {
                document = Some(page);
            }
        }
        if features.len() != object_ids.len() {
            return Err(FeatureServiceError::IncompleteRecordSet {
                expected: object_ids.len(),
                received: features.len(),
            });
        }

        let mut document = document.ok_or_else(|| FeatureServiceError::MalformedResponse {
            message: "no pages were fetched".to_string(),
        })?;
        clear_transfer_limit_flag(&mut document);
        let feature_count = features.len();
        *features_mut(&mut document)? = features;
        Ok(QueryResult {
            document,
            feature_count,
        })
    }

    /// Object ids of all features matching `predicate`, in the order the service lists them.
    pub fn query_object_ids(&self, predicate: &str) -> Result<Vec<i64>> {
        let params = vec![
            ("where", predicate.to_string()),
            ("returnIdsOnly", "true".to_string()),
            ("f", "json".to_string()),
        ];
        let document = self.post_query(&params)?;
        let response: ObjectIdsResponse = serde_json::from_value(Value::Object(document))
            .map_err(|err| FeatureServiceError::MalformedResponse {
                message: format!("could not read object ids, {}", err),
            })?;
        Ok(response.object_ids.unwrap_or_default())
    }

    /// The layer's `maxRecordCount`, read from the layer metadata.
    pub fn max_record_count(&self) -> Result<usize> {
        log::debug!("GET {}", self.layer_url);
        let response = self
            .client
            .get(&self.layer_url)
            .query(&[("f", "json")])
            .send()?
            .error_for_status()?;
        let metadata = check_for_service_error(response.json()?)?;
        Ok(metadata
            .get("maxRecordCount")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .unwrap_or(DEFAULT_MAX_RECORD_COUNT))
    }

    fn where_params(&self, predicate: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![("where", predicate.to_string())];
        params.extend(self.output_params());
        params
    }

    fn object_id_params(&self, object_ids: &[i64]) -> Vec<(&'static str, String)> {
        let object_ids: Vec<String> = object_ids.iter().map(|id| id.to_string()).collect();
        let mut params = vec![("objectIds", object_ids.join(","))];
        params.extend(self.output_params());
        params
    }

    fn output_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("outFields", "*".to_string()),
            ("returnGeometry", "true".to_string()),
        ];
        if let Some(out_sr) = self.config.out_sr {
            params.push(("outSR", out_sr.to_string()));
        }
        params.push(("f", self.config.response_format.name().to_string()));
        params
    }

    fn post_query(&self, params: &[(&'static str, String)]) -> Result<JsonObject> {
        let url = format!("{}/query", self.layer_url);
        log::debug!("POST {} {:?}", url, params);
        let response = self
            .client
            .post(&url)
            .form(params)
            .send()?
            .error_for_status()?;
        check_for_service_error(response.json()?)
    }
}

/// Whether to use the native TLS backend, given the value of [`USE_NATIVE_TLS_ENV`].
pub fn use_native_tls(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let value = value.trim();
            value.eq_ignore_ascii_case("true") || value == "1"
        }
        None => false,
    }
}

/// ArcGIS reports most failures, e.g. an invalid `where` clause, as a 200 response with an
/// `error` member.
fn check_for_service_error(body: Value) -> Result<JsonObject> {
    let mut document = match body {
        Value::Object(document) => document,
        other => {
            return Err(FeatureServiceError::MalformedResponse {
                message: format!("expected a JSON object, got {}", other),
            })
        }
    };
    match document.get_mut("error") {
        Some(error) => {
            let error: ServiceErrorBody = serde_json::from_value(error.take()).map_err(|err| {
                FeatureServiceError::MalformedResponse {
                    message: format!("could not read error response, {}", err),
                }
            })?;
            Err(FeatureServiceError::Service {
                code: error.code,
                message: error.message,
                details: error.details,
            })
        }
        None => Ok(document),
    }
}

fn features_mut(document: &mut JsonObject) -> Result<&mut Vec<Value>> {
    match document.get_mut("features") {
        Some(Value::Array(features)) => Ok(features),
        _ => Err(FeatureServiceError::MalformedResponse {
            message: "response has no features array".to_string(),
        }),
    }
}

fn exceeded_transfer_limit(document: &JsonObject) -> bool {
    let flag = document.get("exceededTransferLimit").or_else(|| {
        document
            .get("properties")
            .and_then(|properties| properties.get("exceededTransferLimit"))
    });
    flag.and_then(Value::as_bool).unwrap_or(false)
}

/// The merged document holds every page, so the first page's truncation flag no longer applies.
/// Keys are updated in place to keep the document's key order.
fn clear_transfer_limit_flag(document: &mut JsonObject) {
    if let Some(flag) = document.get_mut("exceededTransferLimit") {
        *flag = Value::Bool(false);
    }
    if let Some(Value::Object(properties)) = document.get_mut("properties") {
        if let Some(flag) = properties.get_mut("exceededTransferLimit") {
            *flag = Value::Bool(false);
        }
    }
}
