use std::env;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const API_KEY_FIELD: &str = "QWENVL_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://dashscope.aliyuncs.com/api/v1";

#[derive(Debug, Clone)]
pub struct Credential {
    secret: SecretString,
}

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(value.into().trim().to_string()),
        }
    }

    pub fn empty() -> Self {
        Self::new(String::new())
    }

    pub fn load(install_dir: &Path) -> Self {
        let path = install_dir.join(CONFIG_FILE_NAME);
        match read_api_key(&path) {
            Ok(key) => Self::new(key),
            Err(reason) => {
                tracing::error!(path = %path.display(), %reason, "API key is required");
                Self::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.secret.expose_secret().is_empty()
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

fn read_api_key(path: &Path) -> Result<String, String> {
    let raw = std::fs::read_to_string(path).map_err(|err| format!("cannot read config: {err}"))?;
    let parsed: Value =
        serde_json::from_str(&raw).map_err(|err| format!("invalid config JSON: {err}"))?;
    let key = parsed
        .get(API_KEY_FIELD)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("missing string field {API_KEY_FIELD}"))?;
    Ok(key.to_string())
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub install_dir: PathBuf,
    pub api_base: String,
    pub credential: Credential,
}

impl NodeConfig {
    pub fn new(install_dir: impl Into<PathBuf>, credential: Credential) -> Self {
        Self {
            install_dir: install_dir.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            credential,
        }
    }

    pub fn load(install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        let credential = Credential::load(&install_dir);
        Self {
            install_dir,
            api_base: api_base_from_env(),
            credential,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = normalize_api_base(&api_base.into());
        self
    }

    pub fn chat_image_dir(&self) -> PathBuf {
        self.install_dir.join("qw")
    }
}

fn api_base_from_env() -> String {
    env::var("DASHSCOPE_API_BASE")
        .ok()
        .map(|value| normalize_api_base(&value))
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}

fn normalize_api_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
