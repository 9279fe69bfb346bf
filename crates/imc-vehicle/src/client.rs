//! HTTP client for the central admission server (Serial policy only).
//!
//! RequestAccess and the Exiting handshake ride the reliable channel and go
//! through the bounded retry policy; grant polling is a single cheap GET
//! repeated by the caller's own loop.

use crate::retry::{RetryError, RetryPolicy};
use imc_core::messages::{AccessRequest, AccessStatus, Exiting, ExitingAcknowledged, VehicleId};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server refused request: {0}")]
    Refused(StatusCode),
}

/// Client for one vehicle's connection to the admission server.
pub struct ServerClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl ServerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send RequestAccess with bounded retry. `give_up` is consulted before
    /// every attempt so an abandoned request stops retrying.
    pub async fn request_access(
        &self,
        request: &AccessRequest,
        give_up: impl FnMut() -> bool,
    ) -> Result<(), RetryError<ClientError>> {
        let url = format!("{}/v1/access/request", self.base_url);
        self.retry
            .run(
                || async {
                    let response = self.http.post(&url).json(request).send().await?;
                    if response.status().is_success() {
                        Ok(())
                    } else {
                        Err(ClientError::Refused(response.status()))
                    }
                },
                give_up,
            )
            .await
    }

    /// One grant poll. The caller repeats this on its own period; a failed
    /// poll is not an error worth retrying in place.
    pub async fn grant_status(&self, vehicle: &VehicleId) -> Result<AccessStatus, ClientError> {
        let url = format!(
            "{}/v1/access/status?host={}&port={}",
            self.base_url, vehicle.host, vehicle.port
        );
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Refused(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Exiting/Acknowledged handshake with bounded retry. Fire-and-forget
    /// for the caller once the budget is exhausted; the server acknowledges
    /// duplicates, so a retried handshake always converges.
    pub async fn announce_exiting(
        &self,
        vehicle: &VehicleId,
        give_up: impl FnMut() -> bool,
    ) -> Result<ExitingAcknowledged, RetryError<ClientError>> {
        let url = format!("{}/v1/access/exiting", self.base_url);
        let message = Exiting {
            vehicle: vehicle.clone(),
        };
        self.retry
            .run(
                || async {
                    let response = self.http.post(&url).json(&message).send().await?;
                    if !response.status().is_success() {
                        return Err(ClientError::Refused(response.status()));
                    }
                    Ok(response.json::<ExitingAcknowledged>().await?)
                },
                give_up,
            )
            .await
    }
}
