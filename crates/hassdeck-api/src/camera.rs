// Camera subsystem URLs, reached through the admin backend's proxy.
//
// The camera service is opaque to this client: consumers hand these URLs to
// a player or image loader. Only the address shapes are defined here.

use url::Url;

use crate::error::Error;

/// URL builder for the camera proxy mounted under `/api/camera` on the
/// admin backend.
#[derive(Debug, Clone)]
pub struct CameraProxy {
    base_url: Url,
}

impl CameraProxy {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| Error::UnsupportedScheme {
                scheme: self.base_url.scheme().to_owned(),
            })?;
            path.pop_if_empty().push("api").push("camera");
            path.extend(segments);
        }
        url.set_query(None);
        Ok(url)
    }

    /// Camera service configuration (list of cameras and their options).
    pub fn config_url(&self) -> Result<Url, Error> {
        self.endpoint(&["config"])
    }

    /// Live stream for one camera.
    pub fn live_stream_url(&self, camera: &str) -> Result<Url, Error> {
        self.endpoint(&[camera, "live"])
    }

    /// Recent detection events for one camera, newest first.
    pub fn events_url(&self, camera: &str, limit: Option<u32>) -> Result<Url, Error> {
        let mut url = self.endpoint(&[camera, "events"])?;
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        Ok(url)
    }

    /// Recording clip between two unix timestamps (seconds).
    pub fn recording_url(&self, camera: &str, start: i64, end: i64) -> Result<Url, Error> {
        let start = start.to_string();
        let end = end.to_string();
        self.endpoint(&[camera, "recordings", &start, &end])
    }
}
