//! Runtime configuration
//!
//! Read from the process environment (after `dotenv`), with defaults for
//! everything except credentials.

use crate::audit::DEFAULT_TURN_LOG_CAPACITY;
use crate::error::OrchestrationError;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Business constants behind the commission rule:
/// commission rate = on-target incentive / annual quota
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommissionTerms {
    pub on_target_incentive: u64,
    pub annual_quota: u64,
}

impl CommissionTerms {
    pub fn rate(&self) -> f64 {
        if self.annual_quota == 0 {
            return 0.0;
        }
        self.on_target_incentive as f64 / self.annual_quota as f64
    }
}

impl Default for CommissionTerms {
    fn default() -> Self {
        Self {
            on_target_incentive: 100_000,
            annual_quota: 2_000_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub embedding_model: String,
    pub vector_index_host: Option<String>,
    pub vector_index_api_key: Option<String>,
    pub vector_index_namespace: String,
    pub retrieval_top_k: usize,
    pub contest_rules_path: PathBuf,
    pub oracle_timeout: Duration,
    pub commission: CommissionTerms,
    /// Most recent turns kept in the in-memory audit log
    pub turn_log_capacity: usize,
    pub api_port: u16,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let terms = CommissionTerms::default();

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            embedding_model: get("GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            vector_index_host: get("VECTOR_INDEX_HOST")
                .map(|h| h.trim_end_matches('/').to_string()),
            vector_index_api_key: get("VECTOR_INDEX_API_KEY"),
            vector_index_namespace: get("VECTOR_INDEX_NAMESPACE").unwrap_or_default(),
            retrieval_top_k: parse_or(&get, "RETRIEVAL_TOP_K", 3)?,
            contest_rules_path: get("CONTEST_RULES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("contestrules.txt")),
            oracle_timeout: Duration::from_secs(parse_or(&get, "ORACLE_TIMEOUT_SECS", 30)?),
            commission: CommissionTerms {
                on_target_incentive: parse_or(
                    &get,
                    "ON_TARGET_INCENTIVE",
                    terms.on_target_incentive,
                )?,
                annual_quota: parse_or(&get, "ANNUAL_QUOTA", terms.annual_quota)?,
            },
            turn_log_capacity: parse_or(&get, "TURN_LOG_CAPACITY", DEFAULT_TURN_LOG_CAPACITY)?,
            api_port: match get("PORT") {
                Some(_) => parse_or(&get, "PORT", 8080)?,
                None => parse_or(&get, "API_PORT", 8080)?,
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))
        }),
        None => Ok(default),
    }
}
