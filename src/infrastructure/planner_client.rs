use crate::domain::models::{DatetimeGreeting, ProductivitySummary, Suggestion, TimerBlockReport};
use crate::infrastructure::csrf::{CsrfTokenSource, CSRF_HEADER};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const REGISTER_BLOCK_PATH: &str = "planner/registrar-bloque-temporizador/";
const OPTIMIZE_PATH: &str = "planner/optimize/";
const DATETIME_PATH: &str = "get-datetime/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductivitySource {
    Primary,
    Legacy,
}

impl ProductivitySource {
    fn path(self) -> &'static str {
        match self {
            Self::Primary => "planner/api/productividad/",
            Self::Legacy => "planner/obtener-estadisticas-productividad/",
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToggleCompletionResponse {
    pub success: bool,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct OptimizeResponse {
    pub success: bool,
    #[serde(default)]
    pub suggestions: Option<Vec<Suggestion>>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub insufficient_tasks: bool,
    #[serde(default)]
    pub current_tasks: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventTimeUpdate {
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UpdateEventResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatetimeResponse {
    pub success: bool,
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub current_date: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl DatetimeResponse {
    pub fn greeting(&self) -> Option<DatetimeGreeting> {
        self.success.then(|| DatetimeGreeting {
            greeting: self.greeting.clone(),
            current_date: self.current_date.clone(),
        })
    }
}

#[async_trait]
pub trait PlannerApi: Send + Sync {
    async fn register_timer_block(
        &self,
        report: &TimerBlockReport,
    ) -> Result<serde_json::Value, InfraError>;

    async fn productivity(
        &self,
        source: ProductivitySource,
    ) -> Result<ProductivitySummary, InfraError>;

    async fn toggle_completion(&self, event_id: &str)
    -> Result<ToggleCompletionResponse, InfraError>;

    async fn optimize(&self) -> Result<OptimizeResponse, InfraError>;

    async fn update_event_times(
        &self,
        event_id: &str,
        update: &EventTimeUpdate,
    ) -> Result<UpdateEventResponse, InfraError>;

    async fn current_datetime(&self) -> Result<DatetimeResponse, InfraError>;
}

pub struct ReqwestPlannerClient {
    client: Client,
    base_url: Url,
    csrf: Arc<dyn CsrfTokenSource>,
}

impl ReqwestPlannerClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        csrf: Arc<dyn CsrfTokenSource>,
    ) -> Result<Self, InfraError> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid planner base url: {error}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::Transport(format!("failed to build http client: {error}")))?;

        Ok(Self {
            client,
            base_url,
            csrf,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Precondition(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("planner api error: http {}", status.as_u16())
        } else {
            format!("planner api error: http {}; body={body}", status.as_u16())
        };
        InfraError::Transport(message)
    }

    fn endpoint(&self, path: &str) -> Result<Url, InfraError> {
        self.base_url
            .join(path)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid planner endpoint {path}: {error}")))
    }

    fn event_endpoint(&self, event_id: &str, action: &str) -> Result<Url, InfraError> {
        let mut url = self.endpoint("planner/event/")?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("planner base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push(event_id.trim());
            segments.push(action);
            segments.push("");
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mutating = method != Method::GET;
        let mut request = self.client.request(method, url);
        if let Some(cookie) = self.csrf.cookie_header() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        if mutating {
            if let Some(token) = self.csrf.csrf_token() {
                request = request.header(CSRF_HEADER, token);
            }
        }
        request
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Transport(format!("network error while {operation}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Transport(format!("failed reading {operation} response: {error}")))?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|error| {
            InfraError::Transport(format!("invalid {operation} payload: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl PlannerApi for ReqwestPlannerClient {
    async fn register_timer_block(
        &self,
        report: &TimerBlockReport,
    ) -> Result<serde_json::Value, InfraError> {
        let request = self
            .request(Method::POST, self.endpoint(REGISTER_BLOCK_PATH)?)
            .json(report);
        self.send(request, "registering timer block").await
    }

    async fn productivity(
        &self,
        source: ProductivitySource,
    ) -> Result<ProductivitySummary, InfraError> {
        let request = self.request(Method::GET, self.endpoint(source.path())?);
        self.send(request, "loading productivity").await
    }

    async fn toggle_completion(
        &self,
        event_id: &str,
    ) -> Result<ToggleCompletionResponse, InfraError> {
        Self::ensure_non_empty(event_id, "event id")?;
        let request = self
            .request(Method::POST, self.event_endpoint(event_id, "toggle-completion")?)
            .json(&serde_json::json!({}));
        self.send(request, "toggling event completion").await
    }

    async fn optimize(&self) -> Result<OptimizeResponse, InfraError> {
        let request = self
            .request(Method::POST, self.endpoint(OPTIMIZE_PATH)?)
            .json(&serde_json::json!({}));
        self.send(request, "requesting schedule optimization").await
    }

    async fn update_event_times(
        &self,
        event_id: &str,
        update: &EventTimeUpdate,
    ) -> Result<UpdateEventResponse, InfraError> {
        Self::ensure_non_empty(event_id, "event id")?;
        let request = self
            .request(Method::POST, self.event_endpoint(event_id, "update-ajax")?)
            .json(update);
        self.send(request, "updating event times").await
    }

    async fn current_datetime(&self) -> Result<DatetimeResponse, InfraError> {
        let request = self.request(Method::GET, self.endpoint(DATETIME_PATH)?);
        self.send(request, "loading current datetime").await
    }
}
