use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::{http_client, ApiError};

/// Owner of the recurring invocation that triggers a job's runs.
pub trait ScheduleManager {
    /// Returns whether the schedule service accepted the deletion.
    fn delete(&self, job_id: &str) -> Result<bool, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub delete_url: String,
    pub api_key: String,
}

#[derive(Serialize)]
struct DeleteScheduleRequest<'a> {
    job_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpScheduleManager {
    client: Client,
    config: ScheduleConfig,
}

impl HttpScheduleManager {
    pub fn new(config: ScheduleConfig) -> Result<Self, ApiError> {
        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            config,
        })
    }
}

impl ScheduleManager for HttpScheduleManager {
    fn delete(&self, job_id: &str) -> Result<bool, ApiError> {
        let response = self
            .client
            .post(&self.config.delete_url)
            .header("x-api-key", &self.config.api_key)
            .json(&DeleteScheduleRequest { job_id })
            .send()
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!("deleted schedule for job {}", job_id);
            return Ok(true);
        }
        let body = response.text().unwrap_or_default();
        if status.is_server_error() {
            return Err(ApiError::Status {
                service: "schedule",
                status: status.as_u16(),
                body,
            });
        }
        warn!("schedule deletion for job {} refused: {} - {}", job_id, status, body);
        Ok(false)
    }
}
