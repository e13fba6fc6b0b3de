// ── Admin backend wiring ──
//
// Builds the HTTP client for the admin backend from the same `HubConfig`
// that drives the realtime connection, so TLS and timeout settings match.

use hassdeck_api::AdminClient;
use hassdeck_api::transport::{TlsMode, TransportConfig};

use crate::config::{HubConfig, TlsVerification};
use crate::error::CoreError;

/// Admin client for `config.admin_url`, or `None` when no backend is
/// configured.
pub fn admin_client(config: &HubConfig) -> Result<Option<AdminClient>, CoreError> {
    let Some(base_url) = config.admin_url.clone() else {
        return Ok(None);
    };
    let client = AdminClient::new(base_url, &build_transport(config))?;
    Ok(Some(client))
}

/// Build a [`TransportConfig`] from the hub configuration.
fn build_transport(config: &HubConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
