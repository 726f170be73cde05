use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{HttpProxyOptions, RoutingProfile};

/// 应用层设置。扁平记录，文件形态为 kebab-case JSON。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppSettings {
    pub log_level: String,
    pub log_timestamp: bool,
    pub dns_strategy: Option<String>,
    pub dns_independent_cache: bool,
    pub tun_mtu: u32,
    pub tun_auto_route: bool,
    pub tun_strict_route: bool,
    pub http_proxy_enabled: bool,
    pub mixed_port: u16,
    pub socks_port: u16,
    pub controller_enabled: bool,
    pub controller_address: String,
    pub cache_file_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_timestamp: true,
            dns_strategy: None,
            dns_independent_cache: false,
            tun_mtu: 9000,
            tun_auto_route: true,
            tun_strict_route: false,
            http_proxy_enabled: false,
            mixed_port: 2080,
            socks_port: 2081,
            controller_enabled: false,
            controller_address: "127.0.0.1:9090".to_string(),
            cache_file_enabled: true,
        }
    }
}

/// 把设置投影到文档上。只改设置覆盖的字段，其余内容不碰。
pub fn apply(profile: &mut RoutingProfile, settings: &AppSettings) {
    profile.log.level = settings.log_level.clone();
    profile.log.timestamp = Some(settings.log_timestamp);

    // DNS 设置仅在文档已有 DNS 块时投影
    if let Some(dns) = &mut profile.dns {
        dns.strategy = settings.dns_strategy.clone();
        dns.independent_cache = Some(settings.dns_independent_cache);
        if let Some(final_tag) = dns.final_server.clone() {
            for server in &mut dns.servers {
                if server.tag == final_tag {
                    server.strategy = settings.dns_strategy.clone();
                }
            }
        }
    }

    for inbound in &mut profile.inbounds {
        match inbound.kind.as_str() {
            "tun" => {
                inbound.mtu = Some(settings.tun_mtu);
                inbound.auto_route = Some(settings.tun_auto_route);
                inbound.strict_route = Some(settings.tun_strict_route);
                let platform = inbound.platform.get_or_insert_with(Default::default);
                platform.http_proxy = Some(HttpProxyOptions {
                    enabled: settings.http_proxy_enabled,
                    server: "127.0.0.1".to_string(),
                    server_port: settings.mixed_port,
                });
            }
            "mixed" => inbound.listen_port = Some(settings.mixed_port),
            "socks" => inbound.listen_port = Some(settings.socks_port),
            _ => {}
        }
    }

    let experimental = profile.experimental.get_or_insert_with(Default::default);
    let cache_file = experimental.cache_file.get_or_insert_with(Default::default);
    cache_file.enabled = settings.cache_file_enabled;
    if settings.controller_enabled {
        let clash_api = experimental.clash_api.get_or_insert_with(Default::default);
        clash_api.external_controller = settings.controller_address.clone();
    } else {
        // 关闭控制器时整块删除
        experimental.clash_api = None;
    }
}

/// 文本进文本出。解析不了的文档不碰，返回 None。
pub fn apply_text(text: &str, settings: &AppSettings) -> Option<String> {
    let mut profile: RoutingProfile = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "profile does not parse, settings not applied");
            return None;
        }
    };
    apply(&mut profile, settings);
    super::encode_json(&profile).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use crate::profile::types::ClashApi;

    const CLASH_MINIMAL: &str = r#"
proxies:
  - name: "SS1"
    type: ss
    server: 1.2.3.4
    port: 8388
    cipher: aes-256-gcm
    password: secret
"#;

    fn compiled() -> RoutingProfile {
        compile::convert(CLASH_MINIMAL).unwrap().profile
    }

    #[test]
    fn settings_project_onto_compiled_profile() {
        let mut profile = compiled();
        let settings = AppSettings {
            log_level: "debug".to_string(),
            mixed_port: 7890,
            socks_port: 7891,
            tun_strict_route: true,
            http_proxy_enabled: true,
            dns_strategy: Some("ipv4_only".to_string()),
            ..AppSettings::default()
        };
        apply(&mut profile, &settings);

        assert_eq!(profile.log.level, "debug");
        let tun = profile.inbounds.iter().find(|i| i.kind == "tun").unwrap();
        assert_eq!(tun.strict_route, Some(true));
        let http = tun.platform.as_ref().unwrap().http_proxy.as_ref().unwrap();
        assert!(http.enabled);
        assert_eq!(http.server_port, 7890);
        let mixed = profile.inbounds.iter().find(|i| i.kind == "mixed").unwrap();
        assert_eq!(mixed.listen_port, Some(7890));
        let socks = profile.inbounds.iter().find(|i| i.kind == "socks").unwrap();
        assert_eq!(socks.listen_port, Some(7891));

        let dns = profile.dns.as_ref().unwrap();
        assert_eq!(dns.strategy.as_deref(), Some("ipv4_only"));
        let remote = dns.servers.iter().find(|s| s.tag == "dns-remote").unwrap();
        assert_eq!(remote.strategy.as_deref(), Some("ipv4_only"));

        // 设置不得破坏文档不变量
        profile.validate().unwrap();
    }

    #[test]
    fn disabled_controller_removes_clash_api_block() {
        let mut profile = compiled();
        apply(&mut profile, &AppSettings::default());
        assert!(profile.experimental.as_ref().unwrap().clash_api.is_none());
    }

    #[test]
    fn enabled_controller_sets_address() {
        let mut profile = compiled();
        let settings = AppSettings {
            controller_enabled: true,
            controller_address: "127.0.0.1:9999".to_string(),
            ..AppSettings::default()
        };
        apply(&mut profile, &settings);
        let api: &ClashApi = profile
            .experimental
            .as_ref()
            .unwrap()
            .clash_api
            .as_ref()
            .unwrap();
        assert_eq!(api.external_controller, "127.0.0.1:9999");
    }

    #[test]
    fn apply_text_passes_through_unparseable_input() {
        assert!(apply_text("not json", &AppSettings::default()).is_none());
    }

    #[test]
    fn settings_file_form_is_kebab_case() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"log-level":"warn","mixed-port":1080}"#).unwrap();
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.mixed_port, 1080);
        // 未给的字段吃默认值
        assert_eq!(settings.socks_port, 2081);
    }
}
