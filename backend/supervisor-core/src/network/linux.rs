//! Linux: GNOME proxy settings through `gsettings`, DNS through `resolvectl`.

use crate::command::{CommandRunner, args};
use crate::error::network::NetworkError;
use crate::network::{DnsState, NetworkConfigurator, ProxySettings, ProxyStatus, run_checked};

use common::ErrorLocation;

use std::net::IpAddr;
use std::panic::Location;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

const GSETTINGS: &str = "gsettings";
const RESOLVECTL: &str = "resolvectl";
const IP: &str = "ip";
const PROXY_SCHEMA: &str = "org.gnome.system.proxy";
const PROXY_SCHEMES: [&str; 3] = ["http", "https", "socks"];

/// gsettings prints strings single-quoted.
pub(crate) fn unquote(value: &str) -> &str {
    value.trim().trim_matches('\'')
}

pub(crate) fn ignore_hosts_value(bypass: &[String]) -> String {
    let quoted: Vec<String> = bypass.iter().map(|host| format!("'{host}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// `dev` of the first line of `ip route show default`.
pub(crate) fn parse_default_device(output: &str) -> Option<String> {
    let line = output.lines().next()?;
    let mut tokens = line.split_whitespace();
    tokens.find(|token| *token == "dev")?;
    tokens.next().map(String::from)
}

/// `resolvectl dns <iface>` prints `Link 2 (eth0): 1.1.1.1 8.8.8.8`.
pub(crate) fn parse_resolvectl_dns(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_once("):").map(|(_, servers)| servers))
        .flat_map(str::split_whitespace)
        .filter(|token| token.parse::<IpAddr>().is_ok())
        .map(String::from)
        .collect()
}

pub struct LinuxNetwork {
    runner: Arc<dyn CommandRunner>,
}

impl LinuxNetwork {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn gsettings_set(&self, schema: &str, key: &str, value: &str) -> Result<(), NetworkError> {
        run_checked(&*self.runner, GSETTINGS, args(["set", schema, key, value]))
            .await
            .map(|_| ())
    }

    async fn gsettings_get(&self, schema: &str, key: &str) -> Result<String, NetworkError> {
        run_checked(&*self.runner, GSETTINGS, args(["get", schema, key]))
            .await
            .map(|output| unquote(&output.stdout).to_string())
    }
}

#[async_trait]
impl NetworkConfigurator for LinuxNetwork {
    async fn set_system_proxy(
        &self,
        settings: &ProxySettings,
        enabled: bool,
    ) -> Result<(), NetworkError> {
        if enabled {
            let port = settings.port.to_string();
            for scheme in PROXY_SCHEMES {
                let schema = format!("{PROXY_SCHEMA}.{scheme}");
                self.gsettings_set(&schema, "host", &format!("'{}'", settings.host))
                    .await?;
                self.gsettings_set(&schema, "port", &port).await?;
            }
            self.gsettings_set(
                PROXY_SCHEMA,
                "ignore-hosts",
                &ignore_hosts_value(&settings.bypass),
            )
            .await?;
        }

        let mode = if enabled { "'manual'" } else { "'none'" };
        self.gsettings_set(PROXY_SCHEMA, "mode", mode).await?;

        debug!("GNOME proxy mode set to {mode}");
        Ok(())
    }

    async fn get_system_proxy_status(&self) -> Result<ProxyStatus, NetworkError> {
        let enabled = self.gsettings_get(PROXY_SCHEMA, "mode").await? == "manual";
        let schema = format!("{PROXY_SCHEMA}.http");
        let host = Some(self.gsettings_get(&schema, "host").await?).filter(|h| !h.is_empty());
        let port = self
            .gsettings_get(&schema, "port")
            .await?
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0);

        Ok(ProxyStatus {
            enabled,
            host,
            port,
        })
    }

    async fn current_dns(&self) -> Result<DnsState, NetworkError> {
        let routes = run_checked(&*self.runner, IP, args(["route", "show", "default"])).await?;
        let scope = parse_default_device(&routes.stdout).ok_or_else(|| NetworkError::Parse {
            message: "No interface carries the default route".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let output = run_checked(&*self.runner, RESOLVECTL, args(["dns", scope.as_str()])).await?;

        Ok(DnsState {
            servers: parse_resolvectl_dns(&output.stdout),
            scope,
        })
    }

    async fn set_dns(&self, scope: &str, servers: &[String]) -> Result<(), NetworkError> {
        let mut arguments = args(["dns", scope]);
        arguments.extend(servers.iter().cloned());
        run_checked(&*self.runner, RESOLVECTL, arguments)
            .await
            .map(|_| ())
    }

    async fn reset_dns(&self, scope: &str) -> Result<(), NetworkError> {
        run_checked(&*self.runner, RESOLVECTL, args(["revert", scope]))
            .await
            .map(|_| ())
    }
}
