// Admin backend HTTP client
//
// The admin backend is a small companion service that stores what the hub
// does not: entity-to-room mappings, dashboard preferences, usage stats, and
// a proxy in front of the camera subsystem. Every call is a plain JSON
// request/response; nothing is retried automatically.
//
// Each fetch takes a `CancellationToken` so a consumer tearing down (or
// superseding an in-flight fetch) can abort it. Aborts surface as
// `Error::Aborted`, which callers treat as "no result" rather than a failure.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::camera::CameraProxy;
use crate::error::Error;
use crate::transport::TransportConfig;

const BODY_PREVIEW: usize = 200;

/// One entity-to-room assignment kept by the admin backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub entity_id: String,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Anything else the backend stores alongside the mapping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Raw HTTP client for the admin backend.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    base_url: Url,
}

impl AdminClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL builders for the camera proxy behind this backend.
    pub fn camera(&self) -> CameraProxy {
        CameraProxy::new(self.base_url.clone())
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /api/mappings`
    pub async fn mappings(&self, cancel: &CancellationToken) -> Result<Vec<EntityMapping>, Error> {
        self.get_json("api/mappings", cancel).await
    }

    /// `GET /api/preferences`
    pub async fn preferences(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Map<String, Value>, Error> {
        self.get_json("api/preferences", cancel).await
    }

    /// `PUT /api/preferences`, returning what the backend stored.
    pub async fn save_preferences(
        &self,
        preferences: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Map<String, Value>, Error> {
        self.put_json("api/preferences", preferences, cancel).await
    }

    /// `GET /api/stats`
    pub async fn stats(&self, cancel: &CancellationToken) -> Result<Value, Error> {
        self.get_json("api/stats", cancel).await
    }

    /// `GET /api/camera/config`
    pub async fn camera_config(&self, cancel: &CancellationToken) -> Result<Value, Error> {
        let url = self.camera().config_url()?;
        abortable(cancel, self.send_get(url)).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// GET a JSON document relative to the base URL.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        abortable(cancel, self.send_get(url)).await
    }

    /// PUT a JSON body relative to the base URL and decode the reply.
    pub async fn put_json<B, T>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T, Error>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        abortable(cancel, async {
            debug!("PUT {}", url);
            let resp = self.http.put(url).json(body).send().await?;
            parse_json(resp).await
        })
        .await
    }

    async fn send_get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        parse_json(resp).await
    }
}

/// Run `fut` unless `cancel` fires first.
async fn abortable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Aborted),
        result = fut => result,
    }
}

async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "admin backend rejected the request (HTTP 401)".into(),
        });
    }

    let body = resp.text().await?;

    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            body: preview(&body).to_owned(),
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body: body.clone(),
    })
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREVIEW) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Await an admin fetch, falling back to `T::default()` on any error.
///
/// Aborted fetches are logged at debug level; genuine failures at warn.
/// This is the "no data available" path consumers use to render an empty
/// state instead of an error.
pub async fn fetch_or_default<T: Default>(
    what: &str,
    fut: impl Future<Output = Result<T, Error>>,
) -> T {
    match fut.await {
        Ok(value) => value,
        Err(e) if e.is_aborted() => {
            debug!(what, "admin fetch aborted");
            T::default()
        }
        Err(e) => {
            warn!(what, error = %e, "admin fetch failed");
            T::default()
        }
    }
}
