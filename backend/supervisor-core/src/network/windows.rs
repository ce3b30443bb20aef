//! Windows: per-user WinINet registry keys plus `netsh` for DNS.

use crate::command::{CommandRunner, args};
use crate::error::network::NetworkError;
use crate::network::{DnsState, NetworkConfigurator, ProxySettings, ProxyStatus, run_checked};

use common::ErrorLocation;

use std::net::Ipv4Addr;
use std::panic::Location;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

const REG: &str = "reg";
const NETSH: &str = "netsh";
const POWERSHELL: &str = "powershell";
const INTERNET_SETTINGS_KEY: &str =
    r"HKCU\Software\Microsoft\Windows\CurrentVersion\Internet Settings";
const LOCAL_BYPASS: &str = "<local>";
const DHCP_MARKER: &str = "DHCP";

/// Tell WinINet the settings changed (INTERNET_OPTION_SETTINGS_CHANGED = 39,
/// INTERNET_OPTION_REFRESH = 37) so running browsers pick them up.
const REFRESH_SCRIPT: &str = r#"$sig = '[DllImport("wininet.dll", SetLastError = true)] public static extern bool InternetSetOption(IntPtr hInternet, int dwOption, IntPtr lpBuffer, int dwBufferLength);'
$wininet = Add-Type -MemberDefinition $sig -Name WinInet -Namespace Coreward -PassThru
$wininet::InternetSetOption([IntPtr]::Zero, 39, [IntPtr]::Zero, 0) | Out-Null
$wininet::InternetSetOption([IntPtr]::Zero, 37, [IntPtr]::Zero, 0) | Out-Null"#;

const DEFAULT_ROUTE_SCRIPT: &str = "Get-NetRoute -DestinationPrefix 0.0.0.0/0 | Sort-Object RouteMetric | Select-Object -First 1 -ExpandProperty InterfaceAlias";

/// `10.0.0.0/8` → `10.*`, keeping one octet per whole 8 bits of prefix.
pub(crate) fn bypass_to_wininet(entry: &str) -> String {
    let Some((address, prefix)) = entry.split_once('/') else {
        return entry.to_string();
    };

    match (address.parse::<Ipv4Addr>(), prefix.parse::<u8>()) {
        (Ok(ip), Ok(prefix)) if prefix < 32 => {
            let kept = usize::from((prefix / 8).max(1));
            let octets: Vec<String> = ip.octets()[..kept].iter().map(u8::to_string).collect();
            format!("{}.*", octets.join("."))
        }
        _ => address.to_string(),
    }
}

pub(crate) fn proxy_override(bypass: &[String]) -> String {
    let mut entries: Vec<String> = bypass
        .iter()
        .filter(|entry| !entry.contains(':'))
        .map(|entry| bypass_to_wininet(entry))
        .collect();
    entries.push(LOCAL_BYPASS.to_string());
    entries.join(";")
}

/// Value column of `reg query ... /v <name>` output.
pub(crate) fn parse_reg_value(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        if parts.next()? != name {
            return None;
        }
        let _kind = parts.next()?;
        Some(parts.collect::<Vec<_>>().join(" "))
    })
}

pub(crate) fn parse_proxy_server(value: &str) -> (Option<String>, Option<u16>) {
    // Either "host:port" or "http=host:port;https=host:port".
    let entry = value
        .split(';')
        .find(|part| part.starts_with("http=") || !part.contains('='))
        .unwrap_or(value);
    let entry = entry.trim_start_matches("http=");

    match entry.rsplit_once(':') {
        Some((host, port)) => (Some(host.to_string()), port.parse().ok()),
        None if !entry.is_empty() => (Some(entry.to_string()), None),
        None => (None, None),
    }
}

/// `netsh interface ipv4 show dnsservers` output. DHCP-provided servers count
/// as "none configured" so a restore goes back to DHCP.
pub(crate) fn parse_netsh_dns(output: &str) -> Vec<String> {
    if output.contains(DHCP_MARKER) {
        return Vec::new();
    }

    output
        .split(|c: char| c.is_whitespace() || c == ':')
        .filter(|token| token.parse::<Ipv4Addr>().is_ok())
        .map(String::from)
        .collect()
}

pub struct WindowsNetwork {
    runner: Arc<dyn CommandRunner>,
}

impl WindowsNetwork {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn reg_add(&self, name: &str, kind: &str, data: &str) -> Result<(), NetworkError> {
        run_checked(
            &*self.runner,
            REG,
            args(["add", INTERNET_SETTINGS_KEY, "/v", name, "/t", kind, "/d", data, "/f"]),
        )
        .await
        .map(|_| ())
    }

    async fn reg_query(&self, name: &str) -> Result<Option<String>, NetworkError> {
        let output = self
            .runner
            .run(REG, &args(["query", INTERNET_SETTINGS_KEY, "/v", name]))
            .await?;

        // A missing value exits non-zero; that just means "not set".
        if !output.success() {
            return Ok(None);
        }

        Ok(parse_reg_value(&output.stdout, name))
    }

    async fn powershell(&self, script: &str) -> Result<String, NetworkError> {
        run_checked(
            &*self.runner,
            POWERSHELL,
            args(["-NoProfile", "-NonInteractive", "-Command", script]),
        )
        .await
        .map(|output| output.stdout)
    }
}

#[async_trait]
impl NetworkConfigurator for WindowsNetwork {
    async fn set_system_proxy(
        &self,
        settings: &ProxySettings,
        enabled: bool,
    ) -> Result<(), NetworkError> {
        if enabled {
            let server = format!("{}:{}", settings.host, settings.port);
            self.reg_add("ProxyServer", "REG_SZ", &server).await?;
            self.reg_add("ProxyOverride", "REG_SZ", &proxy_override(&settings.bypass))
                .await?;
        }

        self.reg_add("ProxyEnable", "REG_DWORD", if enabled { "1" } else { "0" })
            .await?;
        self.powershell(REFRESH_SCRIPT).await?;

        debug!("WinINet proxy enabled={enabled}");
        Ok(())
    }

    async fn get_system_proxy_status(&self) -> Result<ProxyStatus, NetworkError> {
        let enabled = self
            .reg_query("ProxyEnable")
            .await?
            .is_some_and(|value| value.trim() == "0x1");

        let (host, port) = match self.reg_query("ProxyServer").await? {
            Some(value) => parse_proxy_server(value.trim()),
            None => (None, None),
        };

        Ok(ProxyStatus {
            enabled,
            host,
            port,
        })
    }

    async fn current_dns(&self) -> Result<DnsState, NetworkError> {
        let scope = self.powershell(DEFAULT_ROUTE_SCRIPT).await?.trim().to_string();
        if scope.is_empty() {
            return Err(NetworkError::Parse {
                message: "No interface carries the default route".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let name = format!("name={scope}");
        let output = run_checked(
            &*self.runner,
            NETSH,
            args(["interface", "ipv4", "show", "dnsservers", name.as_str()]),
        )
        .await?;

        Ok(DnsState {
            servers: parse_netsh_dns(&output.stdout),
            scope,
        })
    }

    async fn set_dns(&self, scope: &str, servers: &[String]) -> Result<(), NetworkError> {
        let name = format!("name={scope}");

        for (index, server) in servers.iter().enumerate() {
            let arguments = if index == 0 {
                args([
                    "interface",
                    "ipv4",
                    "set",
                    "dnsservers",
                    name.as_str(),
                    "static",
                    server.as_str(),
                    "primary",
                ])
            } else {
                let position = format!("index={}", index + 1);
                args([
                    "interface",
                    "ipv4",
                    "add",
                    "dnsservers",
                    name.as_str(),
                    server.as_str(),
                    position.as_str(),
                ])
            };
            run_checked(&*self.runner, NETSH, arguments).await?;
        }

        Ok(())
    }

    async fn reset_dns(&self, scope: &str) -> Result<(), NetworkError> {
        let name = format!("name={scope}");
        run_checked(
            &*self.runner,
            NETSH,
            args(["interface", "ipv4", "set", "dnsservers", name.as_str(), "source=dhcp"]),
        )
        .await
        .map(|_| ())
    }
}
