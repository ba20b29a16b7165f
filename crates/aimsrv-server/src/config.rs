//! Server configuration (`SPEC_FULL.md` §4.12): TOML file, overridden by
//! `AIMSRV_<SECTION>_<FIELD>` environment variables, further overridden by
//! CLI flags. Precedence is CLI > env > file > default.

use serde::{Deserialize, Serialize};

use crate::cli::ServeArgs;

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_advertised_host() -> String {
    "127.0.0.1".to_string()
}

fn default_dsn() -> String {
    "memory://".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One logical OSCAR service's listen configuration (`SPEC_FULL.md` §4.12:
/// "per-service (bind_host, bind_port, ssl_port)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    pub bind_port: u16,
    #[serde(default)]
    pub ssl_port: Option<u16>,
}

impl ServiceConfig {
    fn with_port(bind_port: u16) -> Self {
        Self {
            bind_host: default_bind_host(),
            bind_port,
            ssl_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_auth")]
    pub auth: ServiceConfig,
    #[serde(default = "default_bos")]
    pub bos: ServiceConfig,
    #[serde(default = "default_chat")]
    pub chat: ServiceConfig,
    #[serde(default = "default_chat_nav")]
    pub chat_nav: ServiceConfig,
    #[serde(default = "default_bart")]
    pub bart: ServiceConfig,
    #[serde(default = "default_admin")]
    pub admin: ServiceConfig,
    #[serde(default = "default_alert")]
    pub alert: ServiceConfig,
    #[serde(default = "default_odir")]
    pub odir: ServiceConfig,
    /// Host reported back to clients in `ServiceRequest`/`LoginResponse`
    /// replies; may differ from any `bind_host` behind NAT or a proxy.
    #[serde(default = "default_advertised_host")]
    pub advertised_host: String,
    /// Accepted but not wired into a listener (`SPEC_FULL.md` NON-GOALS:
    /// "TLS implementation detail beyond accepting configured cert/key
    /// paths and deferring to `tokio-rustls`"); plaintext is the tested
    /// default and what every listener in this binary actually opens.
    #[serde(default)]
    pub tls_cert_path: Option<String>,
    #[serde(default)]
    pub tls_key_path: Option<String>,
    /// `sqlite://path` or `memory://`.
    #[serde(default = "default_dsn")]
    pub dsn: String,
    #[serde(default = "default_true")]
    pub registration_open: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_auth() -> ServiceConfig {
    ServiceConfig::with_port(5190)
}
fn default_bos() -> ServiceConfig {
    ServiceConfig::with_port(5191)
}
fn default_chat() -> ServiceConfig {
    ServiceConfig::with_port(5192)
}
fn default_chat_nav() -> ServiceConfig {
    ServiceConfig::with_port(5193)
}
fn default_bart() -> ServiceConfig {
    ServiceConfig::with_port(5194)
}
fn default_admin() -> ServiceConfig {
    ServiceConfig::with_port(5195)
}
fn default_alert() -> ServiceConfig {
    ServiceConfig::with_port(5196)
}
fn default_odir() -> ServiceConfig {
    ServiceConfig::with_port(5197)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth: default_auth(),
            bos: default_bos(),
            chat: default_chat(),
            chat_nav: default_chat_nav(),
            bart: default_bart(),
            admin: default_admin(),
            alert: default_alert(),
            odir: default_odir(),
            advertised_host: default_advertised_host(),
            tls_cert_path: None,
            tls_key_path: None,
            dsn: default_dsn(),
            registration_open: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Loads from `path` if given and present, else returns the default,
    /// then layers environment and CLI overrides on top.
    pub fn load(path: Option<&str>, cli: &ServeArgs) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) if std::path::Path::new(path).exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.apply_cli_overrides(cli);
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        overlay_service(&mut self.auth, "AUTH");
        overlay_service(&mut self.bos, "BOS");
        overlay_service(&mut self.chat, "CHAT");
        overlay_service(&mut self.chat_nav, "CHAT_NAV");
        overlay_service(&mut self.bart, "BART");
        overlay_service(&mut self.admin, "ADMIN");
        overlay_service(&mut self.alert, "ALERT");
        overlay_service(&mut self.odir, "ODIR");

        if let Ok(v) = std::env::var("AIMSRV_ADVERTISED_HOST") {
            self.advertised_host = v;
        }
        if let Ok(v) = std::env::var("AIMSRV_TLS_CERT_PATH") {
            self.tls_cert_path = Some(v);
        }
        if let Ok(v) = std::env::var("AIMSRV_TLS_KEY_PATH") {
            self.tls_key_path = Some(v);
        }
        if let Ok(v) = std::env::var("AIMSRV_DSN") {
            self.dsn = v;
        }
        if let Ok(v) = std::env::var("AIMSRV_REGISTRATION_OPEN") {
            if let Ok(parsed) = v.parse() {
                self.registration_open = parsed;
            }
        }
        if let Ok(v) = std::env::var("AIMSRV_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &ServeArgs) {
        overlay_cli(&mut self.auth, &cli.auth_bind_host, cli.auth_bind_port);
        overlay_cli(&mut self.bos, &cli.bos_bind_host, cli.bos_bind_port);
        overlay_cli(&mut self.chat, &cli.chat_bind_host, cli.chat_bind_port);
        overlay_cli(&mut self.chat_nav, &cli.chat_nav_bind_host, cli.chat_nav_bind_port);
        overlay_cli(&mut self.bart, &cli.bart_bind_host, cli.bart_bind_port);
        overlay_cli(&mut self.admin, &cli.admin_bind_host, cli.admin_bind_port);
        overlay_cli(&mut self.alert, &cli.alert_bind_host, cli.alert_bind_port);
        overlay_cli(&mut self.odir, &cli.odir_bind_host, cli.odir_bind_port);

        if let Some(v) = &cli.advertised_host {
            self.advertised_host = v.clone();
        }
        if let Some(v) = &cli.dsn {
            self.dsn = v.clone();
        }
        if let Some(v) = &cli.log_level {
            self.log_level = v.clone();
        }
        if let Some(v) = cli.registration_open {
            self.registration_open = v;
        }
    }
}

fn overlay_service(service: &mut ServiceConfig, section: &str) {
    if let Ok(v) = std::env::var(format!("AIMSRV_{section}_BIND_HOST")) {
        service.bind_host = v;
    }
    if let Ok(v) = std::env::var(format!("AIMSRV_{section}_BIND_PORT")) {
        if let Ok(port) = v.parse() {
            service.bind_port = port;
        }
    }
    if let Ok(v) = std::env::var(format!("AIMSRV_{section}_SSL_PORT")) {
        service.ssl_port = v.parse().ok();
    }
}

fn overlay_cli(service: &mut ServiceConfig, bind_host: &Option<String>, bind_port: Option<u16>) {
    if let Some(host) = bind_host {
        service.bind_host = host.clone();
    }
    if let Some(port) = bind_port {
        service.bind_port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_assigns_distinct_ports_per_service() {
        let config = ServerConfig::default();
        assert_eq!(config.auth.bind_port, 5190);
        assert_eq!(config.bos.bind_port, 5191);
        assert_ne!(config.auth.bind_port, config.chat.bind_port);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = ServerConfig::default();
        let rendered = toml::to_string(&config).expect("serialize");
        let parsed: ServerConfig = toml::from_str(&rendered).expect("parse");
        assert_eq!(parsed.bos.bind_port, config.bos.bind_port);
    }

    #[test]
    fn cli_bind_port_overrides_default() {
        let mut config = ServerConfig::default();
        let mut args = ServeArgs::default();
        args.bos_bind_port = Some(9999);
        config.apply_cli_overrides(&args);
        assert_eq!(config.bos.bind_port, 9999);
    }
}
