//! Mining-title boundary service client

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::models::{BoundaryError, parse_boundary_response};
use crate::config::BoundaryConfig;
use crate::geometry::MultiPolygon;

/// Source of the official boundary polygons of a mining title
#[async_trait]
pub trait BoundaryService: Send + Sync {
    /// Polygons registered for `case_code`, one entry per remote feature,
    /// projected to `out_sr` when given
    async fn fetch_boundary(&self, case_code: &str, out_sr: Option<i64>) -> Result<Vec<MultiPolygon>>;
}

/// Feature-service query endpoint filtered by case code
pub struct BoundaryClient {
    http: reqwest::Client,
    endpoint: String,
    case_field: String,
}

impl BoundaryClient {
    pub fn new(config: &BoundaryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(http, &config.endpoint, &config.case_field))
    }

    pub fn with_client(http: reqwest::Client, endpoint: &str, case_field: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            case_field: case_field.to_string(),
        }
    }

    /// `where` filter selecting the case code; quotes in the code are doubled
    pub fn where_clause(&self, case_code: &str) -> String {
        format!("{}='{}'", self.case_field, case_code.trim().replace('\'', "''"))
    }
}

#[async_trait]
impl BoundaryService for BoundaryClient {
    async fn fetch_boundary(&self, case_code: &str, out_sr: Option<i64>) -> Result<Vec<MultiPolygon>> {
        let mut params = vec![
            ("where", self.where_clause(case_code)),
            ("outFields", "*".to_string()),
            ("returnGeometry", "true".to_string()),
            ("f", "json".to_string()),
        ];
        if let Some(srs) = out_sr {
            params.push(("outSR", srs.to_string()));
        }

        log::info!("Querying boundary service for case {}", case_code);
        log::debug!("GET {} {:?}", self.endpoint, params);

        let response = self
            .http
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("Failed to reach boundary service at {}", self.endpoint))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read boundary service response")?;

        if !status.is_success() {
            return Err(BoundaryError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            }
            .into());
        }

        let features = parse_boundary_response(&body)?;
        log::info!("Boundary service returned {} feature(s) for case {}", features.len(), case_code);
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BoundaryClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        BoundaryClient::with_client(http, &format!("{}/query", server.uri()), "CODIGO_EXPEDIENTE")
    }

    #[tokio::test]
    async fn test_fetch_boundary() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("where", "CODIGO_EXPEDIENTE='IDO-08061'"))
            .and(query_param("outFields", "*"))
            .and(query_param("f", "json"))
            .and(query_param("outSR", "4686"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "features": [{
                    "attributes": {"CODIGO_EXPEDIENTE": "IDO-08061"},
                    "geometry": {"rings": [[[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let features = client(&server).fetch_boundary("IDO-08061", Some(4686)).await.unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].area(), 1.0);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_boundary("X", None).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<BoundaryError>(),
            Some(&BoundaryError::Http {
                status: 503,
                body: "maintenance".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_service_error_payload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": 400, "message": "Invalid query"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).fetch_boundary("X", None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoundaryError>(),
            Some(BoundaryError::Service { code: Some(400), .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let client = BoundaryClient::with_client(http, "http://127.0.0.1:9/query", "CODIGO_EXPEDIENTE");
        assert!(client.fetch_boundary("X", None).await.is_err());
    }

    #[test]
    fn test_where_clause_escapes_quotes() {
        let http = reqwest::Client::new();
        let client = BoundaryClient::with_client(http, "http://localhost/query", "CODIGO_EXPEDIENTE");
        assert_eq!(client.where_clause(" O'HARA "), "CODIGO_EXPEDIENTE='O''HARA'");
    }
}
