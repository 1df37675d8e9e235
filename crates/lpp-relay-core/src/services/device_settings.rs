//! Snapshot derivation from the configuration store.
//!
//! Launch parameters come from the SDK "app data" list, a JSON array of
//! `{name, value}` pairs under [`APPDATA_PATH`]. Every key can be
//! overridden from the environment (`lpp-client.host` → `LPP_CLIENT_HOST`).
//! The cellular identity is read from the primary modem's diagnostics and
//! can be pinned through app data as well.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{CellularIdentity, OutputMode, Parameters, StartingCell, parse_flag_list};
use crate::ports::{ConfigError, ConfigStore, DeviceIdentityPort, StoreError};
use crate::settings::DEFAULT_NMEA_STORE_PATH;

/// Store path of the SDK app data list.
pub const APPDATA_PATH: &str = "/config/system/sdk/appdata";

const KEY_PREFIX: &str = "lpp-client.";
const PRIMARY_DEVICE_PATH: &str = "/status/wan/primary_device";

const DEFAULT_HOST: &str = "129.192.82.125";
const DEFAULT_PORT: u16 = 5431;
const DEFAULT_SERIAL: &str = "/dev/ttyS1";
const DEFAULT_BAUD: u32 = 115_200;
const DEFAULT_OUTPUT: &str = "un";
const DEFAULT_FORMAT: &str = "osr";
const DEFAULT_PLMN: &str = "000000";

/// Environment lookup used for app data overrides.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable overriding an app data key.
pub fn appdata_env_key(key: &str) -> String {
    key.to_uppercase().replace(['.', '-'], "_")
}

#[derive(Debug, Deserialize)]
struct AppDataEntry {
    name: String,
    #[serde(default)]
    value: Value,
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// App data resolved once per snapshot so a poll costs one store request.
struct AppData<'a> {
    entries: Vec<(String, String)>,
    env: &'a EnvLookup,
}

impl AppData<'_> {
    /// Raw value for `lpp-client.<key>`, environment first.
    fn get(&self, key: &str) -> Option<String> {
        let name = format!("{KEY_PREFIX}{key}");
        if let Some(value) = (self.env)(&appdata_env_key(&name)).filter(|v| !v.is_empty()) {
            return Some(value);
        }
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.clone())
    }

    /// Value for `key`, treating an empty string as unset.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty())
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.non_empty(key).unwrap_or_else(|| default.to_string())
    }

    fn number<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.non_empty(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::malformed(format!("{KEY_PREFIX}{key}"), raw, e)),
        }
    }
}

/// Derives [`Parameters`] and [`CellularIdentity`] from the configuration store.
pub struct DeviceSettings {
    store: Arc<dyn ConfigStore>,
    env: EnvLookup,
}

impl DeviceSettings {
    /// Create a service reading overrides from the process environment.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            env: Arc::new(|key: &str| std::env::var(key).ok()),
        }
    }

    /// Replace the environment lookup (tests, embedding).
    #[must_use]
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Read a store path. A disabled store reads as empty.
    async fn get(&self, path: &str) -> Result<Option<Value>, ConfigError> {
        match self.store.get(path).await {
            Ok(value) => Ok(value),
            Err(StoreError::Disabled(reason)) => {
                debug!(%path, %reason, "store disabled, treating as empty");
                Ok(None)
            }
            Err(e) => Err(ConfigError::store(path, e)),
        }
    }

    async fn raw_appdata(&self) -> Result<Vec<Value>, ConfigError> {
        match self.get(APPDATA_PATH).await? {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(ConfigError::malformed(
                APPDATA_PATH,
                other.to_string(),
                "expected a list of {name, value} entries",
            )),
        }
    }

    async fn load_appdata(&self) -> Result<AppData<'_>, ConfigError> {
        let mut entries = Vec::new();
        for item in self.raw_appdata().await? {
            match serde_json::from_value::<AppDataEntry>(item) {
                Ok(entry) => entries.push((entry.name, value_to_string(&entry.value))),
                Err(e) => debug!(error = %e, "skipping malformed app data entry"),
            }
        }
        Ok(AppData {
            entries,
            env: &self.env,
        })
    }

    /// Look up a single app data key (full name, e.g. `lpp-client.host`).
    pub async fn appdata(&self, key: &str) -> Result<Option<String>, ConfigError> {
        if let Some(value) = (self.env)(&appdata_env_key(key)).filter(|v| !v.is_empty()) {
            return Ok(Some(value));
        }
        let app = self.load_appdata().await?;
        Ok(app
            .entries
            .into_iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value))
    }

    /// Update or append an app data key and write the list back.
    pub async fn set_appdata(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut items = self.raw_appdata().await?;
        let existing = items
            .iter_mut()
            .find(|item| item.get("name").and_then(Value::as_str) == Some(key));
        match existing {
            Some(item) => item["value"] = Value::String(value.to_string()),
            None => items.push(serde_json::json!({ "name": key, "value": value })),
        }
        self.store
            .put(APPDATA_PATH, &Value::Array(items))
            .await
            .map_err(|e| ConfigError::store(APPDATA_PATH, e))
    }

    /// Derive the launch parameters.
    pub async fn read_parameters(&self) -> Result<Parameters, ConfigError> {
        let app = self.load_appdata().await?;

        let output_raw = app.or_default("output", DEFAULT_OUTPUT);
        let output = output_raw
            .parse::<OutputMode>()
            .map_err(|reason| ConfigError::malformed("lpp-client.output", &output_raw, reason))?;

        let nmea_store_path = match app.get("path") {
            None => Some(DEFAULT_NMEA_STORE_PATH.to_string()),
            Some(path) if path.is_empty() => None,
            Some(path) => Some(path),
        };

        let log_nmea = match app.get("log_nmea") {
            None => true,
            Some(raw) if raw.is_empty() => true,
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognised lpp-client.log_nmea, keeping default");
                true
            }),
        };

        Ok(Parameters {
            host: app.or_default("host", DEFAULT_HOST),
            port: app.number("port", DEFAULT_PORT)?,
            serial: app.or_default("serial", DEFAULT_SERIAL),
            baud: app.number("baud", DEFAULT_BAUD)?,
            output,
            format: app.or_default("format", DEFAULT_FORMAT).as_str().into(),
            starting: StartingCell {
                mcc: app.non_empty("starting_mcc"),
                mnc: app.non_empty("starting_mnc"),
                tac: app.non_empty("starting_tac"),
                cell_id: app.non_empty("starting_cell_id"),
            },
            forwarding: app.get("forwarding").unwrap_or_default(),
            flags: parse_flag_list(&app.get("flags").unwrap_or_default()),
            tokoro_flags: parse_flag_list(&app.get("tokoro_flags").unwrap_or_default()),
            spartn_flags: parse_flag_list(&app.get("spartn_flags").unwrap_or_default()),
            nmea_store_path,
            log_nmea,
        })
    }

    /// Derive the serving cell identity.
    pub async fn read_cellular(&self) -> Result<CellularIdentity, ConfigError> {
        let app = self.load_appdata().await?;

        let device = match app.non_empty("device") {
            Some(device) => Some(device),
            None => self
                .get(PRIMARY_DEVICE_PATH)
                .await?
                .map(|v| value_to_string(&v))
                .filter(|d| !d.is_empty()),
        };
        if !device.as_deref().is_some_and(|d| d.starts_with("mdm")) {
            warn!(device = ?device, "primary device is not a modem");
        }

        let diag = match &device {
            Some(device) => {
                match self
                    .get(&format!("/status/wan/devices/{device}/diagnostics"))
                    .await?
                {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                }
            }
            None => Map::new(),
        };

        let mut identity = identity_from_diagnostics(&diag);

        if let Some(mcc) = app.non_empty("mcc") {
            identity.mcc = mcc;
        }
        if let Some(mnc) = app.non_empty("mnc") {
            identity.mnc = mnc;
        }
        if let Some(tac) = app.non_empty("tac") {
            identity.tac = tac;
        }
        if let Some(cell_id) = app.non_empty("cell_id") {
            identity.cell_id = cell_id;
        }
        if let Some(imsi) = app.non_empty("imsi") {
            identity.imsi = imsi;
        }
        if let Some(raw) = app.non_empty("nr") {
            identity.nr = parse_bool(&raw)
                .ok_or_else(|| ConfigError::malformed("lpp-client.nr", &raw, "expected a boolean"))?;
        }

        // MSISDN identity is opt-in: a truthy flag selects the modem MDN,
        // anything else is used as the MSISDN itself.
        let modem_mdn = diag_string(&diag, "MDN").unwrap_or_else(|| "0".to_string());
        for key in ["mdn", "msisdn"] {
            if let Some(requested) = app.get(key) {
                let truthy = requested.is_empty() || parse_bool(&requested) == Some(true);
                identity.msisdn = Some(if truthy {
                    modem_mdn.clone()
                } else {
                    requested
                });
            }
        }

        Ok(identity)
    }
}

fn diag_string(diag: &Map<String, Value>, key: &str) -> Option<String> {
    diag.get(key)
        .map(value_to_string)
        .filter(|value| !value.is_empty())
}

fn identity_from_diagnostics(diag: &Map<String, Value>) -> CellularIdentity {
    let plmn = diag_string(diag, "CUR_PLMN").unwrap_or_else(|| DEFAULT_PLMN.to_string());
    let split = plmn.char_indices().nth(3).map_or(plmn.len(), |(i, _)| i);
    let (mcc, mnc) = plmn.split_at(split);

    let mut cell_id = diag_string(diag, "CELL_ID")
        .and_then(|raw| raw.split_whitespace().next().map(str::to_string))
        .unwrap_or_default();
    let mut nr = false;
    if cell_id.is_empty() {
        cell_id = diag_string(diag, "NR_CELL_ID").unwrap_or_else(|| "0".to_string());
        nr = cell_id != "0";
    }

    CellularIdentity {
        mcc: mcc.to_string(),
        mnc: mnc.to_string(),
        tac: diag_string(diag, "TAC").unwrap_or_else(|| "0".to_string()),
        cell_id,
        imsi: diag_string(diag, "IMSI").unwrap_or_else(|| "0".to_string()),
        msisdn: None,
        nr,
    }
}

#[async_trait]
impl DeviceIdentityPort for DeviceSettings {
    async fn parameters(&self) -> Result<Parameters, ConfigError> {
        self.read_parameters().await
    }

    async fn cellular(&self) -> Result<CellularIdentity, ConfigError> {
        self.read_cellular().await
    }
}
