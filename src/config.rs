//! Runtime configuration
//!
//! Values come from the process environment (the binaries load `.env` with
//! dotenv first). Anything unset falls back to the defaults below.

use crate::error::CrosswalkError;
use crate::gemini::DEFAULT_MODEL;
use crate::state::StoreSource;
use crate::Result;
use std::path::PathBuf;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STORE_ROOT: &str = "./data";

/// Settings for one generation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Total drafts allowed per job, including the first. Always at least 1.
    pub max_attempts: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl GeneratorConfig {
    pub fn with_max_attempts(max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(CrosswalkError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self { max_attempts })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Empty means no credential; the offline synthetic backend is used.
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub agent_tools: bool,
    pub generator: GeneratorConfig,
    pub store: StoreSource,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_MODEL.to_string(),
            agent_tools: true,
            generator: GeneratorConfig::default(),
            store: StoreSource::Filesystem {
                root: PathBuf::from(DEFAULT_STORE_ROOT),
            },
            port: DEFAULT_PORT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let max_attempts = match get("CROSSWALK_MAX_ATTEMPTS") {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                CrosswalkError::Config(format!("CROSSWALK_MAX_ATTEMPTS: {:?} is not a number", raw))
            })?,
            None => DEFAULT_MAX_ATTEMPTS,
        };

        let agent_tools = match get("CROSSWALK_AGENT_TOOLS") {
            Some(raw) => parse_bool("CROSSWALK_AGENT_TOOLS", &raw)?,
            None => defaults.agent_tools,
        };

        let store = match get("CROSSWALK_STORE").as_deref().unwrap_or("fs") {
            "memory" => StoreSource::Memory,
            "fs" => StoreSource::Filesystem {
                root: PathBuf::from(
                    get("CROSSWALK_STORE_ROOT").unwrap_or_else(|| DEFAULT_STORE_ROOT.to_string()),
                ),
            },
            "postgres" => StoreSource::Postgres {
                database_url: get("DATABASE_URL").ok_or_else(|| {
                    CrosswalkError::Config(
                        "DATABASE_URL is required when CROSSWALK_STORE=postgres".to_string(),
                    )
                })?,
            },
            other => {
                return Err(CrosswalkError::Config(format!(
                    "CROSSWALK_STORE: unknown store {:?} (expected memory, fs or postgres)",
                    other
                )))
            }
        };

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| CrosswalkError::Config(format!("PORT: {:?} is not a port", raw)))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            agent_tools,
            generator: GeneratorConfig::with_max_attempts(max_attempts)?,
            store,
            port,
        })
    }

    pub fn has_gemini_key(&self) -> bool {
        !self.gemini_api_key.is_empty()
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CrosswalkError::Config(format!(
            "{}: {:?} is not a boolean",
            key, raw
        ))),
    }
}
