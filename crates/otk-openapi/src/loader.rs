//! Spec loading and base URL resolution.

use crate::error::{OpenApiError, Result};
use openapiv3::OpenAPI;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

/// Whether `source` names a remote document.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Load an OpenAPI document from a local path or an http(s) URL.
///
/// JSON is assumed when the path ends in `.json` or the content starts with
/// `{`; YAML otherwise.
#[instrument]
pub async fn load_spec(source: &str) -> Result<OpenAPI> {
    let content = if is_remote(source) {
        fetch(source).await?
    } else {
        debug!("Reading OpenAPI spec from file: {}", source);
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| OpenApiError::spec_load(source, e))?
    };

    let document = parse_spec(&content, source)?;
    info!(
        "Loaded OpenAPI spec '{}' ({} paths)",
        document.info.title,
        document.paths.paths.len()
    );
    Ok(document)
}

async fn fetch(url: &str) -> Result<String> {
    debug!("Fetching OpenAPI spec from URL: {}", url);
    let response = reqwest::get(url)
        .await
        .map_err(|e| OpenApiError::spec_load(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(OpenApiError::SpecLoad {
            location: url.to_string(),
            status: Some(status.as_u16()),
            reason: format!("HTTP {status}"),
        });
    }

    response
        .text()
        .await
        .map_err(|e| OpenApiError::spec_load(url, e))
}

#[derive(Deserialize)]
struct DeclaredVersion {
    #[serde(default)]
    openapi: Option<String>,
}

impl DeclaredVersion {
    fn is_3_1(&self) -> bool {
        self.openapi.as_deref().is_some_and(|v| v.starts_with("3.1"))
    }
}

/// Parse spec text. `location` is used for format detection and errors.
///
/// OpenAPI 3.1 schema keywords without a 3.0 form are rewritten first: a
/// `type` array keeps its first non-null entry (setting `nullable` when
/// `null` is listed), and numeric `exclusiveMinimum`/`exclusiveMaximum`
/// become the 3.0 bound plus flag.
pub fn parse_spec(content: &str, location: &str) -> Result<OpenAPI> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    let invalid = |format: &str, e: &dyn std::fmt::Display| {
        OpenApiError::spec_load(location, format!("invalid {format}: {e}"))
    };

    if path.ends_with(".json") || content.trim_start().starts_with('{') {
        let declared: DeclaredVersion =
            serde_json::from_str(content).map_err(|e| invalid("JSON", &e))?;
        if declared.is_3_1() {
            let raw: serde_yaml::Value =
                serde_json::from_str(content).map_err(|e| invalid("JSON", &e))?;
            return from_3_1(raw, location);
        }
        serde_json::from_str(content).map_err(|e| invalid("JSON", &e))
    } else {
        let declared: DeclaredVersion =
            serde_yaml::from_str(content).map_err(|e| invalid("YAML", &e))?;
        if declared.is_3_1() {
            let raw: serde_yaml::Value =
                serde_yaml::from_str(content).map_err(|e| invalid("YAML", &e))?;
            return from_3_1(raw, location);
        }
        serde_yaml::from_str(content).map_err(|e| invalid("YAML", &e))
    }
}

fn from_3_1(mut raw: serde_yaml::Value, location: &str) -> Result<OpenAPI> {
    debug!("Rewriting OpenAPI 3.1 schema keywords in {}", location);
    downgrade_3_1(&mut raw);
    serde_yaml::from_value(raw).map_err(|e| {
        OpenApiError::spec_load(location, format!("unsupported OpenAPI 3.1 document: {e}"))
    })
}

fn downgrade_3_1(value: &mut serde_yaml::Value) {
    use serde_yaml::Value;

    match value {
        Value::Mapping(map) => {
            if let Some(Value::Sequence(types)) = map.get("type") {
                let nullable = types.iter().any(|t| t.as_str() == Some("null"));
                let first = types
                    .iter()
                    .filter_map(Value::as_str)
                    .find(|t| *t != "null")
                    .map(str::to_string);
                match first {
                    Some(kind) => {
                        map.insert(Value::from("type"), Value::from(kind));
                    }
                    None => {
                        map.remove("type");
                    }
                }
                if nullable {
                    map.insert(Value::from("nullable"), Value::Bool(true));
                }
            }

            for (keyword, bound) in [("exclusiveMinimum", "minimum"), ("exclusiveMaximum", "maximum")] {
                if let Some(limit) = map.get(keyword).filter(|v| v.is_number()).cloned() {
                    map.insert(Value::from(bound), limit);
                    map.insert(Value::from(keyword), Value::Bool(true));
                }
            }

            for (_, child) in map.iter_mut() {
                downgrade_3_1(child);
            }
        }
        Value::Sequence(items) => items.iter_mut().for_each(downgrade_3_1),
        _ => {}
    }
}

/// Resolve the base URL every tool request is issued against.
///
/// Order: explicit override, then the first server entry (variables
/// replaced by their defaults, relative URLs joined onto a remote spec
/// URL), then the origin of a remote spec URL. Trailing slashes are
/// trimmed.
pub fn resolve_base_url(
    document: &OpenAPI,
    override_url: Option<&str>,
    source: Option<&str>,
) -> Result<String> {
    let location = source.unwrap_or("<inline>");

    if let Some(url) = override_url.filter(|u| !u.trim().is_empty()) {
        return Ok(url.trim().trim_end_matches('/').to_string());
    }

    let spec_url = source
        .filter(|s| is_remote(s))
        .and_then(|s| Url::parse(s).ok());

    if let Some(server) = document.servers.first() {
        let mut url = server.url.clone();
        if let Some(variables) = &server.variables {
            for (name, variable) in variables {
                url = url.replace(&format!("{{{name}}}"), &variable.default);
            }
        }

        if Url::parse(&url).is_ok() {
            return Ok(url.trim_end_matches('/').to_string());
        }

        if let Some(spec_url) = &spec_url {
            let joined = spec_url
                .join(&url)
                .map_err(|e| OpenApiError::spec_load(location, format!("invalid server URL '{url}': {e}")))?;
            return Ok(joined.as_str().trim_end_matches('/').to_string());
        }

        return Err(OpenApiError::spec_load(
            location,
            format!("server URL '{url}' is relative; provide an explicit base URL"),
        ));
    }

    if let Some(spec_url) = spec_url {
        let origin = spec_url.origin().ascii_serialization();
        if origin != "null" {
            return Ok(origin);
        }
    }

    Err(OpenApiError::spec_load(
        location,
        "the document declares no servers; provide an explicit base URL",
    ))
}
