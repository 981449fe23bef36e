use std::env;

/// Configuration for the upload API server.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Lifetime of a direct-upload grant in seconds (default: 600 = 10 min)
    pub grant_expiry_secs: u64,

    /// Name of the Lambda function that merges uploaded chunks
    pub merge_function: String,

    /// Bind address for the HTTP API (default: "127.0.0.1:3000")
    pub bind_addr: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            grant_expiry_secs: 600,
            merge_function: "video-merge-worker".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl UploadConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            grant_expiry_secs: env::var("GRANT_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.grant_expiry_secs),

            merge_function: env::var("MERGE_FUNCTION").unwrap_or(default.merge_function),

            bind_addr: env::var("BIND_ADDR").unwrap_or(default.bind_addr),
        }
    }
}

/// Connection settings for the chunk bucket (MinIO-compatible S3).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Endpoint URL of the object store (default: "http://127.0.0.1:9000")
    pub endpoint: String,

    pub access_key: String,
    pub secret_key: String,

    /// Bucket holding chunks, merged outputs and status records
    pub bucket: String,

    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "scout-media".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            endpoint: env::var("MINIO_ENDPOINT").unwrap_or(default.endpoint),

            access_key: env::var("MINIO_ACCESS_KEY").unwrap_or(default.access_key),

            secret_key: env::var("MINIO_SECRET_KEY").unwrap_or(default.secret_key),

            bucket: env::var("MINIO_BUCKET").unwrap_or(default.bucket),

            region: env::var("S3_REGION").unwrap_or(default.region),
        }
    }
}

/// Configuration for the subscription relay server.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address for the relay WebSocket endpoint (default: "127.0.0.1:3100")
    pub bind_addr: String,

    /// Interval of the dead-connection sweep in seconds (default: 60)
    pub sweep_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            bind_addr: env::var("RELAY_BIND_ADDR").unwrap_or(default.bind_addr),

            sweep_interval_secs: env::var("RELAY_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.sweep_interval_secs),
        }
    }
}

/// Configuration for the change-notification bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub database_url: String,

    /// LISTEN channel carrying changed-row identifiers (default: "new_notification")
    pub channel: String,

    /// WebSocket URL of the relay server (default: "ws://127.0.0.1:3100/ws")
    pub relay_url: String,

    /// First reconnect delay in milliseconds (default: 1000)
    pub reconnect_base_ms: u64,

    /// Reconnect delay ceiling in milliseconds (default: 60000)
    pub reconnect_max_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/scout_media".to_string(),
            channel: "new_notification".to_string(),
            relay_url: "ws://127.0.0.1:3100/ws".to_string(),
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 60_000,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            channel: env::var("NOTIFY_CHANNEL").unwrap_or(default.channel),

            relay_url: env::var("RELAY_URL").unwrap_or(default.relay_url),

            reconnect_base_ms: env::var("RELAY_RECONNECT_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.reconnect_base_ms),

            reconnect_max_ms: env::var("RELAY_RECONNECT_MAX_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.reconnect_max_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_upload_config() {
        let config = UploadConfig::default();
        assert_eq!(config.grant_expiry_secs, 600);
        assert_eq!(config.merge_function, "video-merge-worker");
    }

    #[test]
    fn test_default_storage_config() {
        let config = StorageConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:9000");
        assert_eq!(config.bucket, "scout-media");
        assert_eq!(config.region, "us-east-1");
    }

    #[test]
    fn test_default_relay_config() {
        let config = RelayConfig::default();
        assert_eq!(config.sweep_interval_secs, 60);
    }

    #[test]
    fn test_default_bridge_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.channel, "new_notification");
        assert!(config.reconnect_base_ms < config.reconnect_max_ms);
    }
}
