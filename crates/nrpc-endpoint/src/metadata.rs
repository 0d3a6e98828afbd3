//! The metadata record exchanged at connect time.
//!
//! Mirrors `original_source/nrpc_py/common_base.py`'s `SocketMetadataInfo`:
//! language tag, host, addressing info, entry-file name, an ISO-8601 start
//! time, and the identity strings assigned during registration. Extra
//! user-attached key/value pairs (e.g. a `fixed_start_time` that should
//! survive reconnects) ride along in `extra`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as Json};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SocketMetadata {
    pub lang: String,
    pub host: String,
    pub ip_address: String,
    pub main_port: u16,
    pub main_port_rev: u16,
    pub entry_file: String,
    pub start_time: String,
    pub client_signature: String,
    pub client_signature_rev: String,
    pub server_signature: String,
    pub server_signature_rev: String,
    #[serde(flatten)]
    pub extra: JsonMap<String, Json>,
}

impl SocketMetadata {
    /// Builds this process's own metadata record at bind/connect time.
    pub fn local(entry_file: impl Into<String>, ip_address: impl Into<String>, main_port: u16, main_port_rev: u16) -> Self {
        Self {
            lang: "rust".to_owned(),
            host: hostname(),
            ip_address: ip_address.into(),
            main_port,
            main_port_rev,
            entry_file: entry_file.into(),
            start_time: Utc::now().to_rfc3339(),
            client_signature: String::new(),
            client_signature_rev: String::new(),
            server_signature: String::new(),
            server_signature_rev: String::new(),
            extra: JsonMap::new(),
        }
    }

    /// Attaches an extra user key/value pair (e.g. `fixed_start_time`).
    pub fn with_extra(mut self, key: impl Into<String>, value: Json) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_pairs_round_trip_through_json() {
        let meta = SocketMetadata::local("demo.rs", "127.0.0.1", 9000, 19000)
            .with_extra("fixed_start_time", Json::String("2024-01-01T00:00:00Z".into()));
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["fixed_start_time"], "2024-01-01T00:00:00Z");
        assert_eq!(json["lang"], "rust");
        let back: SocketMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.extra.get("fixed_start_time").unwrap(), "2024-01-01T00:00:00Z");
    }
}
