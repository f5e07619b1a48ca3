use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Response};
use tracing::debug;

use crate::{
    api::{ApiError, Backend, NearestStop, SearchRequest},
    catalog::CATALOG_FILE,
    session::LatLng,
};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Talks to the backend service over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    /// Requests never time out unless `timeout` is given.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client: builder.build().context("Failed to build HTTP client")?,
        })
    }

    pub fn catalog_url(&self) -> String {
        format!("{}/{CATALOG_FILE}", self.base_url)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status(status.as_u16()))
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

impl Backend for HttpBackend {
    async fn fetch_text(&self, url: &str) -> Result<String, ApiError> {
        let response = self.client.get(url).send().await.map_err(transport)?;

        check_status(response)?.text().await.map_err(transport)
    }

    async fn nearest_stop(&self, at: LatLng) -> Result<NearestStop, ApiError> {
        let response = self
            .client
            .post(self.endpoint("/get-nearest-stop"))
            .json(&at)
            .send()
            .await
            .map_err(transport)?;

        check_status(response)?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn submit_search(&self, request: &SearchRequest) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.endpoint("/run-script"))
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let response = check_status(response)?;
        // The body is a bare acknowledgement; completion is the status code.
        let body = response.text().await.map_err(transport)?;
        debug!(%body, "Search acknowledged");

        Ok(())
    }
}
