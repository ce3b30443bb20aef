//! macOS: `networksetup` across every enabled network service.

use crate::command::{CommandRunner, args};
use crate::error::network::NetworkError;
use crate::network::{DnsState, NetworkConfigurator, ProxySettings, ProxyStatus, run_checked};

use common::ErrorLocation;

use std::panic::Location;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, warn};
use regex::Regex;

const NETWORKSETUP: &str = "networksetup";
const ROUTE: &str = "route";
const NO_DNS_SERVERS: &str = "There aren't any DNS Servers";
/// `networksetup` spelling for "clear this list".
const EMPTY_LIST: &str = "Empty";

static SERVICE_ORDER_REGEX: OnceLock<Regex> = OnceLock::new();
static DEVICE_REGEX: OnceLock<Regex> = OnceLock::new();

fn service_order_regex() -> &'static Regex {
    SERVICE_ORDER_REGEX.get_or_init(|| Regex::new(r"^\(\d+\)\s+(.+)$").expect("valid regex pattern"))
}

fn device_regex() -> &'static Regex {
    DEVICE_REGEX.get_or_init(|| Regex::new(r"Device:\s*([^)\s,]+)").expect("valid regex pattern"))
}

/// Names from `-listallnetworkservices`, minus the header line and disabled
/// (`*`-prefixed) services.
pub(crate) fn parse_services(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('*'))
        .map(String::from)
        .collect()
}

/// `(service, device)` pairs from `-listnetworkserviceorder`.
pub(crate) fn parse_service_order(output: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut pending: Option<String> = None;

    for line in output.lines().map(str::trim) {
        if let Some(cap) = service_order_regex().captures(line) {
            pending = Some(cap[1].trim().to_string());
        } else if let Some(cap) = device_regex().captures(line)
            && let Some(service) = pending.take()
        {
            pairs.push((service, cap[1].to_string()));
        }
    }

    pairs
}

/// Interface of the default route from `route -n get default`.
pub(crate) fn parse_default_interface(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("interface:")
            .map(|iface| iface.trim().to_string())
    })
}

/// `-getwebproxy` output: `Enabled`, `Server` and `Port` lines.
pub(crate) fn parse_proxy_info(output: &str) -> ProxyStatus {
    let mut status = ProxyStatus::default();

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "Enabled" => status.enabled = value.eq_ignore_ascii_case("yes"),
            "Server" if !value.is_empty() => status.host = Some(value.to_string()),
            "Port" => status.port = value.parse().ok().filter(|p| *p > 0),
            _ => {}
        }
    }

    status
}

pub(crate) fn parse_dns_servers(output: &str) -> Vec<String> {
    if output.contains(NO_DNS_SERVERS) {
        return Vec::new();
    }

    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

pub struct MacosNetwork {
    runner: Arc<dyn CommandRunner>,
}

impl MacosNetwork {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn networksetup(&self, arguments: Vec<String>) -> Result<String, NetworkError> {
        run_checked(&*self.runner, NETWORKSETUP, arguments)
            .await
            .map(|output| output.stdout)
    }

    async fn services(&self) -> Result<Vec<String>, NetworkError> {
        let output = self.networksetup(args(["-listallnetworkservices"])).await?;
        let services = parse_services(&output);

        if services.is_empty() {
            return Err(NetworkError::Parse {
                message: "networksetup reported no enabled network services".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(services)
    }

    /// Service carrying the default route, falling back to the first enabled one.
    async fn primary_service(&self) -> Result<String, NetworkError> {
        let services = self.services().await?;

        let interface = match run_checked(&*self.runner, ROUTE, args(["-n", "get", "default"])).await
        {
            Ok(output) => parse_default_interface(&output.stdout),
            Err(e) => {
                debug!("No default route: {e}");
                None
            }
        };

        if let Some(interface) = interface {
            let order = self
                .networksetup(args(["-listnetworkserviceorder"]))
                .await?;

            if let Some((service, _)) = parse_service_order(&order)
                .into_iter()
                .find(|(service, device)| *device == interface && services.contains(service))
            {
                return Ok(service);
            }
        }

        services
            .into_iter()
            .next()
            .ok_or_else(|| NetworkError::Parse {
                message: "No primary network service".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    async fn configure_service(
        &self,
        service: &str,
        settings: &ProxySettings,
        enabled: bool,
    ) -> Result<(), NetworkError> {
        let port = settings.port.to_string();

        if enabled {
            for setter in ["-setwebproxy", "-setsecurewebproxy", "-setsocksfirewallproxy"] {
                self.networksetup(args([setter, service, settings.host.as_str(), port.as_str()]))
                    .await?;
            }

            let mut bypass = args(["-setproxybypassdomains", service]);
            if settings.bypass.is_empty() {
                bypass.push(EMPTY_LIST.to_string());
            } else {
                bypass.extend(settings.bypass.iter().cloned());
            }
            self.networksetup(bypass).await?;
        }

        let state = if enabled { "on" } else { "off" };
        for toggle in [
            "-setwebproxystate",
            "-setsecurewebproxystate",
            "-setsocksfirewallproxystate",
        ] {
            self.networksetup(args([toggle, service, state])).await?;
        }

        debug!("Proxy on {service} switched {state}");
        Ok(())
    }
}

#[async_trait]
impl NetworkConfigurator for MacosNetwork {
    async fn set_system_proxy(
        &self,
        settings: &ProxySettings,
        enabled: bool,
    ) -> Result<(), NetworkError> {
        let services = self.services().await?;
        let mut last_error = None;
        let mut applied = 0;

        for service in &services {
            match self.configure_service(service, settings, enabled).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!("Proxy update failed on {service}: {e}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if applied == 0 => Err(e),
            _ => Ok(()),
        }
    }

    async fn get_system_proxy_status(&self) -> Result<ProxyStatus, NetworkError> {
        let services = self.services().await?;

        let reports = join_all(
            services
                .iter()
                .map(|service| self.networksetup(args(["-getwebproxy", service.as_str()]))),
        )
        .await;

        let statuses: Vec<ProxyStatus> = reports
            .into_iter()
            .filter_map(Result::ok)
            .map(|output| parse_proxy_info(&output))
            .collect();

        Ok(statuses
            .iter()
            .find(|status| status.enabled)
            .or_else(|| statuses.first())
            .cloned()
            .unwrap_or_default())
    }

    async fn current_dns(&self) -> Result<DnsState, NetworkError> {
        let scope = self.primary_service().await?;
        let output = self
            .networksetup(args(["-getdnsservers", scope.as_str()]))
            .await?;

        Ok(DnsState {
            servers: parse_dns_servers(&output),
            scope,
        })
    }

    async fn set_dns(&self, scope: &str, servers: &[String]) -> Result<(), NetworkError> {
        let mut arguments = args(["-setdnsservers", scope]);
        arguments.extend(servers.iter().cloned());
        self.networksetup(arguments).await.map(|_| ())
    }

    async fn reset_dns(&self, scope: &str) -> Result<(), NetworkError> {
        self.networksetup(args(["-setdnsservers", scope, EMPTY_LIST]))
            .await
            .map(|_| ())
    }
}
