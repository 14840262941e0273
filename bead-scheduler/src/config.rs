use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub max_parallel_sessions: usize,
    pub workdir_root: PathBuf,
    pub session_log_dir: PathBuf,
    pub provenance_path: PathBuf,
    pub tracker_bin: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            bind_address: string("BIND_ADDRESS", "0.0.0.0"),
            port: parse_or("PORT", lookup("PORT"), 8080),
            max_parallel_sessions: parse_or::<usize>(
                "MAX_PARALLEL_SESSIONS",
                lookup("MAX_PARALLEL_SESSIONS"),
                2,
            )
            .max(1),
            workdir_root: PathBuf::from(string("WORKDIR_ROOT", ".")),
            session_log_dir: PathBuf::from(string("SESSION_LOG_DIR", "./.scheduler/logs")),
            provenance_path: PathBuf::from(string(
                "PROVENANCE_PATH",
                "./.scheduler/provenance.jsonl",
            )),
            tracker_bin: string("TRACKER_BIN", "bd"),
        }
    }
}

fn parse_or<T: FromStr + std::fmt::Display>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{}='{}' is not valid, using default {}", key, raw, default);
            default
        }),
        _ => default,
    }
}
