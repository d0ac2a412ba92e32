//! Resolution of security requirements into an [`AuthConfig`].

use crate::auth::{AuthConfig, AuthLocation};
use openapiv3::{OpenAPI, ReferenceOr, SecurityRequirement};
use serde_json::Value;
use tracing::warn;

/// Auth requirement declared at the document level.
pub fn resolve_global_auth(document: &OpenAPI) -> AuthConfig {
    resolve_requirements(document, document.security.as_deref().unwrap_or_default())
}

/// Auth requirement of one operation. The operation's own list wins over
/// the document's, even when it is empty.
pub fn resolve_operation_auth(
    document: &OpenAPI,
    operation_security: Option<&[SecurityRequirement]>,
) -> AuthConfig {
    match operation_security {
        Some(requirements) => resolve_requirements(document, requirements),
        None => resolve_global_auth(document),
    }
}

/// First requirement naming a supported scheme wins.
fn resolve_requirements(document: &OpenAPI, requirements: &[SecurityRequirement]) -> AuthConfig {
    for requirement in requirements {
        for (scheme_name, scopes) in requirement {
            if let Some(config) = resolve_scheme(document, scheme_name, scopes) {
                return config;
            }
        }
    }

    if !requirements.is_empty() {
        warn!("No supported security scheme among the requirements; treating as unauthenticated");
    }
    AuthConfig::None
}

fn resolve_scheme(document: &OpenAPI, name: &str, scopes: &[String]) -> Option<AuthConfig> {
    let scheme = match document.components.as_ref()?.security_schemes.get(name)? {
        ReferenceOr::Item(scheme) => serde_json::to_value(scheme).ok()?,
        ReferenceOr::Reference { reference } => {
            warn!("Security scheme reference '{}' is not supported", reference);
            return None;
        }
    };

    let field = |key: &str| scheme.get(key).and_then(Value::as_str);

    let config = match field("type") {
        Some("apiKey") => {
            let location = match field("in") {
                Some("header") => AuthLocation::Header,
                Some("query") => AuthLocation::Query,
                other => {
                    warn!("API key scheme '{}' in {:?} is not supported", name, other);
                    return None;
                }
            };
            AuthConfig::ApiKey {
                name: field("name")?.to_string(),
                location,
            }
        }
        Some("http") => match field("scheme").map(str::to_ascii_lowercase).as_deref() {
            Some("bearer") => AuthConfig::Bearer,
            Some("basic") => AuthConfig::Basic,
            other => {
                warn!("HTTP auth scheme '{}' ({:?}) is not supported", name, other);
                return None;
            }
        },
        Some("oauth2") => {
            let Some(mut flow) = scheme.pointer("/flows/authorizationCode") else {
                warn!("OAuth2 scheme '{}' has no authorization code flow", name);
                return None;
            };
            // Tagged flow enums serialize one level deeper.
            if let Some(inner) = flow.get("authorizationCode") {
                flow = inner;
            }
            let scopes = if scopes.is_empty() {
                flow.get("scopes")
                    .and_then(Value::as_object)
                    .map(|s| s.keys().cloned().collect())
                    .unwrap_or_default()
            } else {
                scopes.to_vec()
            };
            AuthConfig::OAuth2 {
                authorization_url: flow.get("authorizationUrl")?.as_str()?.to_string(),
                token_url: flow.get("tokenUrl")?.as_str()?.to_string(),
                scopes,
            }
        }
        other => {
            warn!("Security scheme '{}' of type {:?} is not supported", name, other);
            return None;
        }
    };

    Some(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_spec;

    const SPEC: &str = r#"
openapi: 3.0.0
info: {title: Secured, version: "1"}
security:
  - apiKey: []
paths:
  /users:
    get:
      operationId: listUsers
      responses: {'200': {description: OK}}
  /health:
    get:
      operationId: health
      security: []
      responses: {'200': {description: OK}}
  /admin:
    get:
      operationId: admin
      security:
        - cookieAuth: []
        - oauth: [admin]
      responses: {'200': {description: OK}}
components:
  securitySchemes:
    apiKey: {type: apiKey, in: header, name: X-API-Key}
    cookieAuth: {type: apiKey, in: cookie, name: session}
    bearer: {type: http, scheme: Bearer}
    oauth:
      type: oauth2
      flows:
        authorizationCode:
          authorizationUrl: https://auth.example.com/authorize
          tokenUrl: https://auth.example.com/token
          scopes: {read: Read, admin: Admin}
"#;

    fn operation_security<'a>(doc: &'a OpenAPI, path: &str) -> Option<&'a [SecurityRequirement]> {
        match &doc.paths.paths[path] {
            ReferenceOr::Item(item) => item.get.as_ref()?.security.as_deref(),
            ReferenceOr::Reference { .. } => None,
        }
    }

    #[test]
    fn test_operation_security_overrides_global() {
        let doc = parse_spec(SPEC, "spec.yaml").unwrap();

        assert_eq!(
            resolve_operation_auth(&doc, operation_security(&doc, "/users")),
            AuthConfig::api_key_header("X-API-Key")
        );
        assert_eq!(
            resolve_operation_auth(&doc, operation_security(&doc, "/health")),
            AuthConfig::None
        );
    }

    #[test]
    fn test_first_supported_requirement_wins() {
        let doc = parse_spec(SPEC, "spec.yaml").unwrap();
        assert_eq!(
            resolve_operation_auth(&doc, operation_security(&doc, "/admin")),
            AuthConfig::OAuth2 {
                authorization_url: "https://auth.example.com/authorize".to_string(),
                token_url: "https://auth.example.com/token".to_string(),
                scopes: vec!["admin".to_string()],
            }
        );
    }

    #[test]
    fn test_scheme_kinds() {
        let doc = parse_spec(SPEC, "spec.yaml").unwrap();
        assert_eq!(resolve_scheme(&doc, "bearer", &[]), Some(AuthConfig::Bearer));
        assert_eq!(resolve_scheme(&doc, "cookieAuth", &[]), None);
        assert_eq!(resolve_scheme(&doc, "missing", &[]), None);

        match resolve_scheme(&doc, "oauth", &[]) {
            Some(AuthConfig::OAuth2 { scopes, .. }) => assert_eq!(scopes.len(), 2),
            other => panic!("expected oauth2, got {other:?}"),
        }
    }
}
