use std::path::Path;

use serde::Deserialize;

use crate::error::{LokiError, Result};

pub const DEFAULT_LOKI_URL: &str = "http://localhost:3100";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Stdio,
    Http,
    Both,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LokiConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub token: String,
    pub org_id: String,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LOKI_URL.to_string(),
            username: String::new(),
            password: String::new(),
            token: String::new(),
            org_id: String::new(),
        }
    }
}

impl LokiConfig {
    pub fn has_basic_auth(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn has_bearer_token(&self) -> bool {
        !self.token.is_empty()
    }
}

impl std::fmt::Debug for LokiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LokiConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("token", &redact(&self.token))
            .field("org_id", &self.org_id)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "***"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub http_addr: String,
    pub http_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Stdio,
            http_addr: "0.0.0.0".to_string(),
            http_port: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loki: LokiConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Reads a YAML config file, or JSON when the extension is `.json`.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&content)
                .map_err(|e| LokiError::Config(format!("{}: {e}", path.display())))
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| LokiError::Config(format!("{}: {e}", path.display())))
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_lookup(lookup)
    }

    /// Overlays environment-style variables. Empty values are treated as unset.
    pub fn with_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get("LOKI_URL") {
            self.loki.url = url;
        }
        if let Some(username) = get("LOKI_USERNAME") {
            self.loki.username = username;
        }
        if let Some(password) = get("LOKI_PASSWORD") {
            self.loki.password = password;
        }
        if let Some(token) = get("LOKI_TOKEN") {
            self.loki.token = token;
        }
        if let Some(org_id) = get("LOKI_ORG_ID") {
            self.loki.org_id = org_id;
        }
        if let Some(addr) = get("MCP_HTTP_ADDR") {
            self.server.http_addr = addr;
        }
        if let Some(port) = get("MCP_HTTP_PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|e| LokiError::Config(format!("invalid MCP_HTTP_PORT {port:?}: {e}")))?;
            self.server.http_port = Some(port);
            if self.server.mode == ServerMode::Stdio {
                self.server.mode = ServerMode::Both;
            }
        }
        if self.loki.url.is_empty() {
            self.loki.url = DEFAULT_LOKI_URL.to_string();
        }
        Ok(self)
    }
}
