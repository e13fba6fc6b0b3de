// Realtime endpoint address derivation.
//
// The hub is configured by its HTTP(S) base URL; the realtime API lives at a
// fixed path on the WebSocket equivalent of that origin.

use url::Url;

use crate::error::Error;

/// Fixed path of the hub's realtime API.
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// Rewrite a hub base URL into its realtime endpoint.
///
/// `http` becomes `ws`, `https` becomes `wss`; URLs that already use a
/// WebSocket scheme keep it. Any path, query or fragment on the base URL is
/// replaced by [`WEBSOCKET_PATH`].
pub fn websocket_url(base: &Url) -> Result<Url, Error> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::UnsupportedScheme {
                scheme: other.to_owned(),
            });
        }
    };

    let host = base.host_str().ok_or_else(|| Error::UnsupportedScheme {
        scheme: format!("{}: (no host)", base.scheme()),
    })?;

    let mut raw = format!("{scheme}://{host}");
    if let Some(port) = base.port() {
        raw.push_str(&format!(":{port}"));
    }
    raw.push_str(WEBSOCKET_PATH);

    Ok(Url::parse(&raw)?)
}
