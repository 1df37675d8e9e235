//! Composition root.
//!
//! The only place where the configuration store client is chosen and
//! handed to the services that need it.

use std::sync::Arc;

use lpp_relay_core::{
    ConfigStore, DEFAULT_NMEA_STORE_PATH, DeviceSettings, Parameters, RelaySettings,
};
use lpp_relay_store::StoreTarget;
use serde_json::json;
use tracing::{info, warn};

use crate::error::CliError;
use crate::parser::Cli;

/// Store node holding the published record window.
const RTK_STATUS_PATH: &str = "/status/rtk";

/// Fully composed dependencies of a relay run.
pub struct RelayContext {
    pub settings: RelaySettings,
    pub store: Arc<dyn ConfigStore>,
    pub device: Arc<DeviceSettings>,
}

pub fn bootstrap(cli: &Cli) -> Result<RelayContext, CliError> {
    let settings = cli.settings();
    let target = StoreTarget::detect(&cli.store_socket, cli.remote_endpoint());
    let store = target.connect(settings.store_timeout)?;
    let device = Arc::new(DeviceSettings::new(Arc::clone(&store)));
    Ok(RelayContext {
        settings,
        store,
        device,
    })
}

/// Create the `/status/rtk` node the default window path lives under.
///
/// Only done for the default path; a custom path is assumed to exist.
pub async fn ensure_store_layout(store: &dyn ConfigStore, params: &Parameters) {
    if params.nmea_store_path.as_deref() != Some(DEFAULT_NMEA_STORE_PATH) {
        return;
    }
    match store.get(RTK_STATUS_PATH).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            info!(path = RTK_STATUS_PATH, "creating record window node");
            if let Err(e) = store.put(RTK_STATUS_PATH, &json!({ "nmea": [] })).await {
                warn!(path = RTK_STATUS_PATH, error = %e, "failed creating record window node");
            }
        }
        Err(e) => warn!(path = RTK_STATUS_PATH, error = %e, "failed reading store"),
    }
}
