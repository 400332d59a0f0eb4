//! HTTP/JSON client for the remote item service.
//!
//! Every response uses the `{success, data?, error?}` envelope; a
//! `success: false` body is turned into [`StoreError::Rejected`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::traits::{CurrentWeek, DreamCollection, ItemStore, ScoreBook, ScoreTotal};
use crate::calendar::WeekId;
use crate::error::StoreError;
use crate::goal::{Dream, WeeklyGoalInstance, WeeklyGoalTemplate};
use crate::scoring::ScoringEntry;

/// Response envelope shared by every item service endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct Empty {}

/// Client for the item service.
pub struct HttpItemStore {
    base_url: Url,
    token: Option<String>,
    http_client: Client,
}

impl HttpItemStore {
    /// Create a client for the service rooted at `base_url`.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StoreError> {
        let mut base_url = Url::parse(base_url)?;
        // Keep the last path segment when joining relative paths.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            token,
            http_client: Client::new(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Endpoint(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and unwrap the envelope. `operation` names the call in errors.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<Option<T>, StoreError> {
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&text)
                .ok()
                .and_then(|body| body.error)
                .unwrap_or(text);
            return Err(StoreError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body: ApiResponse<T> = resp.json().await?;
        if !body.success {
            return Err(StoreError::Rejected {
                operation: operation.to_string(),
                message: body.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(body.data)
    }

    async fn send_data<T: DeserializeOwned>(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<T, StoreError> {
        self.send(operation, builder)
            .await?
            .ok_or_else(|| StoreError::MissingData(operation.to_string()))
    }
}

#[async_trait]
impl ItemStore for HttpItemStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn load_dreams(&self, user_id: &str) -> Result<DreamCollection, StoreError> {
        let url = self.url(&["users", user_id, "dreams"])?;
        let data: Option<DreamCollection> = self
            .send("load_dreams", self.request(Method::GET, url))
            .await?;
        Ok(data.unwrap_or_default())
    }

    async fn save_dreams(
        &self,
        user_id: &str,
        dreams: &[Dream],
        templates: &[WeeklyGoalTemplate],
    ) -> Result<(), StoreError> {
        let url = self.url(&["users", user_id, "dreams"])?;
        let body = json!({ "dreams": dreams, "templates": templates });
        self.send::<Empty>("save_dreams", self.request(Method::PUT, url).json(&body))
            .await?;
        Ok(())
    }

    async fn get_current_week(
        &self,
        user_id: &str,
        week_id: WeekId,
    ) -> Result<CurrentWeek, StoreError> {
        let week = week_id.to_string();
        let url = self.url(&["users", user_id, "weeks", &week])?;
        let data: Option<CurrentWeek> = self
            .send("get_current_week", self.request(Method::GET, url))
            .await?;
        Ok(data.unwrap_or(CurrentWeek {
            week_id,
            goals: Vec::new(),
        }))
    }

    async fn save_current_week(
        &self,
        user_id: &str,
        week_id: WeekId,
        goals: &[WeeklyGoalInstance],
    ) -> Result<(), StoreError> {
        let week = week_id.to_string();
        let url = self.url(&["users", user_id, "weeks", &week])?;
        let body = json!({ "weekId": week, "goals": goals });
        self.send::<Empty>("save_current_week", self.request(Method::PUT, url).json(&body))
            .await?;
        Ok(())
    }

    async fn add_scoring_entry(
        &self,
        user_id: &str,
        year: i32,
        entry: &ScoringEntry,
    ) -> Result<ScoreTotal, StoreError> {
        let year = year.to_string();
        let url = self.url(&["users", user_id, "scoring", &year])?;
        self.send_data("add_scoring_entry", self.request(Method::POST, url).json(entry))
            .await
    }

    async fn load_scoring(&self, user_id: &str, year: i32) -> Result<ScoreBook, StoreError> {
        let year = year.to_string();
        let url = self.url(&["users", user_id, "scoring", &year])?;
        let data: Option<ScoreBook> = self
            .send("load_scoring", self.request(Method::GET, url))
            .await?;
        Ok(data.unwrap_or_default())
    }
}
