use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub backend: BackendConfig,
    pub auth: AuthConfig,
    pub upload: UploadConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Hosted auth+database platform. No URL selects the in-memory backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub login_route: String,
    pub default_route: String,
    /// Whether signup may request the `super_admin` role
    pub allow_admin_signup: bool,
    pub min_password_length: usize,
    pub notification_capacity: usize,
    /// Signing secret for tokens minted by the in-memory backend
    pub token_secret: String,
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_size_bytes: u64,
    pub accepted_mime_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub cors_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_route: "/login".to_string(),
            default_route: "/".to_string(),
            allow_admin_signup: true,
            min_password_length: 6,
            notification_capacity: 32,
            token_secret: "realty-insight-dev-secret".to_string(),
            token_ttl_secs: 3600,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 10 * 1024 * 1024, // 10MB
            accepted_mime_types: vec![
                "text/csv".to_string(),
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
                "application/vnd.ms-excel".to_string(),
            ],
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Backend overrides
        if let Ok(v) = env::var("BACKEND_URL") {
            self.backend.url = Some(v.trim_end_matches('/').to_string()).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("BACKEND_ANON_KEY") {
            self.backend.anon_key = Some(v);
        }
        if let Ok(v) = env::var("BACKEND_SERVICE_KEY") {
            self.backend.service_key = Some(v);
        }
        if let Ok(v) = env::var("BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = v.parse().unwrap_or(self.backend.timeout_secs);
        }

        // Auth overrides
        if let Ok(v) = env::var("AUTH_LOGIN_ROUTE") {
            self.auth.login_route = v;
        }
        if let Ok(v) = env::var("AUTH_DEFAULT_ROUTE") {
            self.auth.default_route = v;
        }
        if let Ok(v) = env::var("AUTH_ALLOW_ADMIN_SIGNUP") {
            self.auth.allow_admin_signup = v.parse().unwrap_or(self.auth.allow_admin_signup);
        }
        if let Ok(v) = env::var("AUTH_MIN_PASSWORD_LENGTH") {
            self.auth.min_password_length = v.parse().unwrap_or(self.auth.min_password_length);
        }
        if let Ok(v) = env::var("AUTH_NOTIFICATION_CAPACITY") {
            self.auth.notification_capacity = v.parse().unwrap_or(self.auth.notification_capacity);
        }
        if let Ok(v) = env::var("AUTH_TOKEN_SECRET") {
            self.auth.token_secret = v;
        }
        if let Ok(v) = env::var("AUTH_TOKEN_TTL_SECS") {
            self.auth.token_ttl_secs = v.parse().unwrap_or(self.auth.token_ttl_secs);
        }

        // Upload overrides
        if let Ok(v) = env::var("UPLOAD_MAX_FILE_SIZE_BYTES") {
            self.upload.max_file_size_bytes = v.parse().unwrap_or(self.upload.max_file_size_bytes);
        }

        // Server overrides
        if let Some(port) = env::var("SERVER_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("SERVER_ENABLE_REQUEST_LOGGING") {
            self.server.enable_request_logging = v.parse().unwrap_or(self.server.enable_request_logging);
        }
        if let Ok(v) = env::var("SERVER_CORS_ORIGINS") {
            self.server.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            backend: BackendConfig {
                url: None,
                anon_key: None,
                service_key: None,
                timeout_secs: 30,
            },
            auth: AuthConfig::default(),
            upload: UploadConfig::default(),
            server: ServerConfig {
                port: 3000,
                enable_request_logging: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            backend: BackendConfig {
                url: None,
                anon_key: None,
                service_key: None,
                timeout_secs: 10,
            },
            auth: AuthConfig {
                notification_capacity: 64,
                ..AuthConfig::default()
            },
            upload: UploadConfig::default(),
            server: ServerConfig {
                port: 3000,
                enable_request_logging: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            backend: BackendConfig {
                url: None,
                anon_key: None,
                service_key: None,
                timeout_secs: 5,
            },
            auth: AuthConfig {
                notification_capacity: 64,
                token_ttl_secs: 900,
                ..AuthConfig::default()
            },
            upload: UploadConfig::default(),
            server: ServerConfig {
                port: 8080,
                enable_request_logging: false,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
