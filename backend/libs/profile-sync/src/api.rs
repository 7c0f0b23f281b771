//! Consumed services
//!
//! The core talks to the profile and feed backend only through
//! [`ProfileApi`] and learns who is looking through [`SessionProvider`].
//! [`TrpcProfileApi`] speaks the tRPC JSON convention used by the web app:
//! queries are `GET {base}/{procedure}?input=<json>`, mutations are
//! `POST {base}/{procedure}` with a JSON body, and every response is wrapped
//! in `{"result":{"data":...}}` or `{"error":{...}}`.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::models::{
    FeedCursor, FeedPage, ProfileRecord, SessionIdentity, ToggleFollowResponse, UserId,
};

pub type ApiResult<T> = Result<T, ApiError>;

#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// Read, idempotent, cacheable by id
    async fn get_profile(&self, id: &UserId) -> ApiResult<ProfileRecord>;

    /// Forward pagination; `cursor` is `None` for the first page
    async fn get_feed_page(
        &self,
        user_id: &UserId,
        cursor: Option<&FeedCursor>,
    ) -> ApiResult<FeedPage>;

    /// Flips the viewer's follow of `user_id` and reports the resulting direction
    async fn toggle_follow(&self, user_id: &UserId) -> ApiResult<ToggleFollowResponse>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session_identity(&self) -> SessionIdentity;
}

/// Session provider returning a fixed identity
#[derive(Debug, Clone)]
pub struct StaticSession(pub SessionIdentity);

#[async_trait]
impl SessionProvider for StaticSession {
    async fn session_identity(&self) -> SessionIdentity {
        self.0.clone()
    }
}

mod procedure {
    pub const PROFILE_BY_ID: &str = "profile.getById";
    pub const PROFILE_FEED: &str = "tweet.infiniteProfileFeed";
    pub const TOGGLE_FOLLOW: &str = "profile.toggleFollow";
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<ResultBody<T>>,
    error: Option<RemoteError>,
}

#[derive(Deserialize)]
struct ResultBody<T> {
    data: T,
}

#[derive(Deserialize)]
struct RemoteError {
    message: String,
    #[serde(default)]
    data: Option<RemoteErrorData>,
}

#[derive(Deserialize)]
struct RemoteErrorData {
    code: Option<String>,
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        ApiError::Remote {
            code: err
                .data
                .and_then(|d| d.code)
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            message: err.message,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedInput<'a> {
    user_id: &'a UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a FeedCursor>,
    limit: u32,
}

/// HTTP client for the tRPC profile and feed procedures
#[derive(Clone)]
pub struct TrpcProfileApi {
    client: Client,
    base_url: String,
    page_size: u32,
}

impl TrpcProfileApi {
    pub fn new(client: Client, base_url: impl Into<String>, page_size: u32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size,
        }
    }

    pub fn from_config(config: &SyncConfig) -> ApiResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::new(client, &config.api_base_url, config.page_size))
    }

    fn query_url(&self, procedure: &str, input: &serde_json::Value) -> String {
        format!(
            "{}/{}?input={}",
            self.base_url,
            procedure,
            urlencoding::encode(&input.to_string())
        )
    }

    async fn query<T: DeserializeOwned>(
        &self,
        procedure: &str,
        input: serde_json::Value,
    ) -> ApiResult<T> {
        let url = self.query_url(procedure, &input);
        debug!(procedure, "tRPC query");
        let response = self.client.get(url).send().await?;
        unwrap_envelope(response).await
    }

    async fn mutate<T: DeserializeOwned>(
        &self,
        procedure: &str,
        input: serde_json::Value,
    ) -> ApiResult<T> {
        let url = format!("{}/{}", self.base_url, procedure);
        debug!(procedure, "tRPC mutation");
        let response = self.client.post(url).json(&input).send().await?;
        unwrap_envelope(response).await
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let body = response.text().await?;

    match serde_json::from_str::<Envelope<T>>(&body) {
        Ok(Envelope {
            result: Some(result),
            ..
        }) if status.is_success() => Ok(result.data),
        Ok(Envelope {
            error: Some(error), ..
        }) => Err(error.into()),
        Ok(_) if status.is_success() => Err(ApiError::Remote {
            code: "EMPTY_RESPONSE".to_string(),
            message: "response carried neither result nor error".to_string(),
        }),
        Err(e) if status.is_success() => Err(ApiError::Decode(e)),
        _ => Err(ApiError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

#[async_trait]
impl ProfileApi for TrpcProfileApi {
    async fn get_profile(&self, id: &UserId) -> ApiResult<ProfileRecord> {
        self.query(procedure::PROFILE_BY_ID, json!({ "id": id }))
            .await
    }

    async fn get_feed_page(
        &self,
        user_id: &UserId,
        cursor: Option<&FeedCursor>,
    ) -> ApiResult<FeedPage> {
        let input = serde_json::to_value(FeedInput {
            user_id,
            cursor,
            limit: self.page_size,
        })?;
        self.query(procedure::PROFILE_FEED, input).await
    }

    async fn toggle_follow(&self, user_id: &UserId) -> ApiResult<ToggleFollowResponse> {
        self.mutate(procedure::TOGGLE_FOLLOW, json!({ "userId": user_id }))
            .await
    }
}
