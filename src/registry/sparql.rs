//! Minimal SPARQL 1.1 Protocol client.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::trace;

use crate::error::RegistryError;

/// One row of a SELECT result, variable name to bound value.
pub type Binding = HashMap<String, String>;

#[derive(Debug, Deserialize)]
struct SelectResponse {
    results: SelectResults,
}

#[derive(Debug, Deserialize)]
struct SelectResults {
    bindings: Vec<HashMap<String, Term>>,
}

#[derive(Debug, Deserialize)]
struct Term {
    value: String,
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    boolean: bool,
}

/// HTTP client for a single SPARQL endpoint.
pub struct SparqlClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SparqlClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        SparqlClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn post(&self, field: &str, text: &str) -> Result<reqwest::Response, RegistryError> {
        trace!(sparql = %text, "registry request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", "application/sparql-results+json")
            .form(&[(field, text)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Run a SELECT query and flatten the bindings to plain strings.
    pub async fn select(&self, query: &str) -> Result<Vec<Binding>, RegistryError> {
        let response = self.post("query", query).await?;
        let parsed: SelectResponse = response.json().await?;

        Ok(parsed
            .results
            .bindings
            .into_iter()
            .map(|row| row.into_iter().map(|(k, t)| (k, t.value)).collect())
            .collect())
    }

    pub async fn ask(&self, query: &str) -> Result<bool, RegistryError> {
        let response = self.post("query", query).await?;
        let parsed: AskResponse = response.json().await?;
        Ok(parsed.boolean)
    }

    pub async fn update(&self, update: &str) -> Result<(), RegistryError> {
        self.post("update", update).await?;
        Ok(())
    }
}
