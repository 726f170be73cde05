use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 文档中保留未知字段用的扁平 map
pub type ExtraMap = serde_json::Map<String, Value>;

/// 基础出站 tag（直连 / 拦截），任何编译产物都必须包含这两个
pub const TAG_DIRECT: &str = "direct";
pub const TAG_BLOCK: &str = "block";

/// 合成组的保留 tag：手动切换组与自动测速组
pub const GROUP_SELECT: &str = "Proxy";
pub const GROUP_AUTO: &str = "Auto";

/// 完整路由配置文档（持久化格式，同时也是交给代理核心的格式）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingProfile {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbounds: Vec<Inbound>,
    #[serde(default)]
    pub outbounds: Vec<OutboundEntry>,
    #[serde(default)]
    pub route: RouteConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Experimental>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<bool>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamp: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// DNS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub servers: Vec<DnsServer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<DnsRule>,
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub final_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub independent_cache: Option<bool>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsServer {
    pub tag: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_resolver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detour: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_set: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_suffix: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbound: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

// ---------------------------------------------------------------------------
// 入站
// ---------------------------------------------------------------------------

/// 入站监听器。tun 与本地代理监听共用一个结构，按 `type` 区分。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inbound {
    #[serde(rename = "type")]
    pub kind: String,
    pub tag: String,
    // tun 专用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_route: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_route: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformOptions>,
    // 本地监听专用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<HttpProxyOptions>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpProxyOptions {
    pub enabled: bool,
    pub server: String,
    pub server_port: u16,
}

// ---------------------------------------------------------------------------
// 出站
// ---------------------------------------------------------------------------

/// 出站条目。已建模的协议走 `Known`，其余类型原样保留在 `Other`，
/// 归一化时不丢弃用户写入的未知出站。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundEntry {
    Known(Outbound),
    Other(Value),
}

impl OutboundEntry {
    pub fn tag(&self) -> Option<&str> {
        match self {
            OutboundEntry::Known(o) => Some(o.tag()),
            OutboundEntry::Other(v) => v.get("tag").and_then(|t| t.as_str()),
        }
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            OutboundEntry::Known(o) => Some(o.kind()),
            OutboundEntry::Other(v) => v.get("type").and_then(|t| t.as_str()),
        }
    }

    /// 基础出站：direct / block / dns
    pub fn is_base(&self) -> bool {
        matches!(self.kind(), Some("direct") | Some("block") | Some("dns"))
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind(), Some("selector") | Some("urltest"))
    }
}

/// 协议出站与组出站的封闭枚举，按 `type` 字段分派。
/// 新增协议必须补全此处的分支，编译期保证穷尽。
///
/// 手写 Serialize/Deserialize：先摘掉 `type` 再交给变体结构体，
/// 避免 flatten 的 extra map 把标签字段也收进去。
#[derive(Debug, Clone)]
pub enum Outbound {
    Direct(BasicOutbound),
    Block(BasicOutbound),
    Dns(BasicOutbound),
    Shadowsocks(ShadowsocksOutbound),
    Trojan(TrojanOutbound),
    Vmess(VmessOutbound),
    Vless(VlessOutbound),
    Socks(SocksOutbound),
    Http(HttpOutbound),
    Selector(SelectorOutbound),
    Urltest(UrltestOutbound),
}

impl Outbound {
    pub fn tag(&self) -> &str {
        match self {
            Outbound::Direct(o) | Outbound::Block(o) | Outbound::Dns(o) => &o.tag,
            Outbound::Shadowsocks(o) => &o.tag,
            Outbound::Trojan(o) => &o.tag,
            Outbound::Vmess(o) => &o.tag,
            Outbound::Vless(o) => &o.tag,
            Outbound::Socks(o) => &o.tag,
            Outbound::Http(o) => &o.tag,
            Outbound::Selector(o) => &o.tag,
            Outbound::Urltest(o) => &o.tag,
        }
    }

    pub fn set_tag(&mut self, tag: String) {
        match self {
            Outbound::Direct(o) | Outbound::Block(o) | Outbound::Dns(o) => o.tag = tag,
            Outbound::Shadowsocks(o) => o.tag = tag,
            Outbound::Trojan(o) => o.tag = tag,
            Outbound::Vmess(o) => o.tag = tag,
            Outbound::Vless(o) => o.tag = tag,
            Outbound::Socks(o) => o.tag = tag,
            Outbound::Http(o) => o.tag = tag,
            Outbound::Selector(o) => o.tag = tag,
            Outbound::Urltest(o) => o.tag = tag,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Direct(_) => "direct",
            Outbound::Block(_) => "block",
            Outbound::Dns(_) => "dns",
            Outbound::Shadowsocks(_) => "shadowsocks",
            Outbound::Trojan(_) => "trojan",
            Outbound::Vmess(_) => "vmess",
            Outbound::Vless(_) => "vless",
            Outbound::Socks(_) => "socks",
            Outbound::Http(_) => "http",
            Outbound::Selector(_) => "selector",
            Outbound::Urltest(_) => "urltest",
        }
    }
}

impl Serialize for Outbound {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::Error;
        let value = match self {
            Outbound::Direct(o) | Outbound::Block(o) | Outbound::Dns(o) => serde_json::to_value(o),
            Outbound::Shadowsocks(o) => serde_json::to_value(o),
            Outbound::Trojan(o) => serde_json::to_value(o),
            Outbound::Vmess(o) => serde_json::to_value(o),
            Outbound::Vless(o) => serde_json::to_value(o),
            Outbound::Socks(o) => serde_json::to_value(o),
            Outbound::Http(o) => serde_json::to_value(o),
            Outbound::Selector(o) => serde_json::to_value(o),
            Outbound::Urltest(o) => serde_json::to_value(o),
        };
        let mut value = value.map_err(S::Error::custom)?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| S::Error::custom("outbound must serialize to an object"))?;
        obj.insert(
            "type".to_string(),
            Value::String(self.kind().to_string()),
        );
        obj.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Outbound {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let mut value = Value::deserialize(deserializer)?;
        let kind = {
            let obj = value
                .as_object_mut()
                .ok_or_else(|| D::Error::custom("outbound must be an object"))?;
            match obj.remove("type") {
                Some(Value::String(s)) => s,
                _ => return Err(D::Error::custom("outbound is missing 'type'")),
            }
        };
        let parsed = match kind.as_str() {
            "direct" => serde_json::from_value(value).map(Outbound::Direct),
            "block" => serde_json::from_value(value).map(Outbound::Block),
            "dns" => serde_json::from_value(value).map(Outbound::Dns),
            "shadowsocks" => serde_json::from_value(value).map(Outbound::Shadowsocks),
            "trojan" => serde_json::from_value(value).map(Outbound::Trojan),
            "vmess" => serde_json::from_value(value).map(Outbound::Vmess),
            "vless" => serde_json::from_value(value).map(Outbound::Vless),
            "socks" => serde_json::from_value(value).map(Outbound::Socks),
            "http" => serde_json::from_value(value).map(Outbound::Http),
            "selector" => serde_json::from_value(value).map(Outbound::Selector),
            "urltest" => serde_json::from_value(value).map(Outbound::Urltest),
            other => {
                return Err(D::Error::custom(format!(
                    "unsupported outbound type '{}'",
                    other
                )))
            }
        };
        parsed.map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicOutbound {
    pub tag: String,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

impl BasicOutbound {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            extra: ExtraMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadowsocksOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub method: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrojanOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmessOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VlessOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocksOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsOptions>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorOutbound {
    pub tag: String,
    pub outbounds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_exist_connections: Option<bool>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrltestOutbound {
    pub tag: String,
    pub outbounds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_exist_connections: Option<bool>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

/// TLS 选项。仅当源记录显式声明 TLS 时才出现。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsOptions {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

/// 传输层。默认帧（tcp）不出现在文档里。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    Ws(WsTransport),
    Grpc(GrpcTransport),
    Http(HttpTransport),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsTransport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrpcTransport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpTransport {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// ---------------------------------------------------------------------------
// 路由
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RouteRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_set: Vec<RuleSet>,
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub final_outbound: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_detect_interface: Option<bool>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleAction {
    Route,
    Reject,
    Sniff,
    HijackDns,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbound: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocol: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_suffix: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_keyword: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_cidr: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ip_cidr: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_port: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_set: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RuleAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

impl RouteRule {
    /// 至少带一个匹配条件才是合法规则
    pub fn has_matcher(&self) -> bool {
        !self.inbound.is_empty()
            || !self.protocol.is_empty()
            || !self.domain.is_empty()
            || !self.domain_suffix.is_empty()
            || !self.domain_keyword.is_empty()
            || !self.ip_cidr.is_empty()
            || !self.source_ip_cidr.is_empty()
            || !self.port.is_empty()
            || !self.source_port.is_empty()
            || !self.rule_set.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_detour: Option<String>,
}

// ---------------------------------------------------------------------------
// experimental
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Experimental {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<CacheFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clash_api: Option<ClashApi>,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheFile {
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClashApi {
    pub external_controller: String,
    #[serde(flatten)]
    pub extra: ExtraMap,
}

// ---------------------------------------------------------------------------
// 校验
// ---------------------------------------------------------------------------

impl RoutingProfile {
    pub fn outbound_tags(&self) -> Vec<&str> {
        self.outbounds.iter().filter_map(|o| o.tag()).collect()
    }

    /// 校验文档不变量：tag 唯一、引用可解析、组 default 是成员、
    /// direct/block 基础出站存在。编译与归一化产物都必须通过。
    pub fn validate(&self) -> Result<()> {
        let tags = self.outbound_tags();

        let mut seen = std::collections::HashSet::new();
        for tag in &tags {
            if !seen.insert(*tag) {
                anyhow::bail!("duplicate outbound tag '{}'", tag);
            }
        }

        for base in [TAG_DIRECT, TAG_BLOCK] {
            if !tags.contains(&base) {
                anyhow::bail!("base outbound '{}' is missing", base);
            }
        }

        for entry in &self.outbounds {
            let (group_tag, members, default) = match entry {
                OutboundEntry::Known(Outbound::Selector(g)) => {
                    (&g.tag, &g.outbounds, g.default.as_deref())
                }
                OutboundEntry::Known(Outbound::Urltest(g)) => (&g.tag, &g.outbounds, None),
                _ => continue,
            };
            if members.is_empty() {
                anyhow::bail!("group '{}' has no members", group_tag);
            }
            for m in members {
                if !tags.contains(&m.as_str()) {
                    anyhow::bail!("group '{}' references unknown outbound '{}'", group_tag, m);
                }
            }
            if let Some(d) = default {
                if !members.iter().any(|m| m == d) {
                    anyhow::bail!("group '{}' default '{}' is not a member", group_tag, d);
                }
            }
        }

        match self.route.final_outbound.as_deref() {
            Some(f) if tags.contains(&f) => {}
            Some(f) => anyhow::bail!("route.final '{}' does not match any outbound tag", f),
            None => anyhow::bail!("route.final is not set"),
        }

        for (i, rule) in self.route.rules.iter().enumerate() {
            if !rule.has_matcher() {
                anyhow::bail!("route rule {} has no matcher", i);
            }
            if let Some(target) = &rule.outbound {
                if !tags.contains(&target.as_str()) {
                    anyhow::bail!("route rule {} targets unknown outbound '{}'", i, target);
                }
            }
        }

        if let Some(dns) = &self.dns {
            let server_tags: Vec<&str> = dns.servers.iter().map(|s| s.tag.as_str()).collect();
            for (i, rule) in dns.rules.iter().enumerate() {
                if let Some(server) = &rule.server {
                    if !server_tags.contains(&server.as_str()) {
                        anyhow::bail!("dns rule {} references unknown server '{}'", i, server);
                    }
                }
            }
            if let Some(f) = &dns.final_server {
                if !server_tags.contains(&f.as_str()) {
                    anyhow::bail!("dns.final '{}' does not match any dns server", f);
                }
            }
            for server in &dns.servers {
                if let Some(detour) = &server.detour {
                    if !tags.contains(&detour.as_str()) {
                        anyhow::bail!(
                            "dns server '{}' detours to unknown outbound '{}'",
                            server.tag,
                            detour
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_profile() -> RoutingProfile {
        let mut p = RoutingProfile::default();
        p.outbounds = vec![
            OutboundEntry::Known(Outbound::Direct(BasicOutbound::new(TAG_DIRECT))),
            OutboundEntry::Known(Outbound::Block(BasicOutbound::new(TAG_BLOCK))),
        ];
        p.route.final_outbound = Some(TAG_DIRECT.to_string());
        p
    }

    #[test]
    fn validate_minimal_profile() {
        base_profile().validate().unwrap();
    }

    #[test]
    fn validate_rejects_duplicate_tags() {
        let mut p = base_profile();
        p.outbounds
            .push(OutboundEntry::Known(Outbound::Direct(BasicOutbound::new(
                TAG_DIRECT,
            ))));
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_final() {
        let mut p = base_profile();
        p.route.final_outbound = Some("nope".to_string());
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_default_outside_members() {
        let mut p = base_profile();
        p.outbounds
            .push(OutboundEntry::Known(Outbound::Selector(SelectorOutbound {
                tag: "g".to_string(),
                outbounds: vec![TAG_DIRECT.to_string()],
                default: Some(TAG_BLOCK.to_string()),
                ..Default::default()
            })));
        assert!(p.validate().is_err());
    }

    #[test]
    fn outbound_serializes_with_type_tag() {
        let ob = Outbound::Shadowsocks(ShadowsocksOutbound {
            tag: "ss1".to_string(),
            server: "1.2.3.4".to_string(),
            server_port: 8388,
            method: "aes-256-gcm".to_string(),
            password: "pw".to_string(),
            ..Default::default()
        });
        let v = serde_json::to_value(&ob).unwrap();
        assert_eq!(v["type"], "shadowsocks");
        assert_eq!(v["server_port"], 8388);
        assert!(v.get("plugin").is_none());
    }

    #[test]
    fn unknown_outbound_type_round_trips() {
        let json = r#"{"type":"hysteria2","tag":"hy","server":"x.com","up_mbps":100}"#;
        let entry: OutboundEntry = serde_json::from_str(json).unwrap();
        assert!(matches!(entry, OutboundEntry::Other(_)));
        assert_eq!(entry.tag(), Some("hy"));
        assert!(!entry.is_base());
        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["up_mbps"], 100);
    }

    #[test]
    fn known_outbound_keeps_unknown_fields() {
        let json = r#"{"type":"shadowsocks","tag":"ss","server":"a","server_port":1,"method":"m","password":"p","udp_over_tcp":true}"#;
        let entry: OutboundEntry = serde_json::from_str(json).unwrap();
        assert!(matches!(entry, OutboundEntry::Known(_)));
        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["udp_over_tcp"], true);
    }

    #[test]
    fn rule_action_kebab_case() {
        assert_eq!(
            serde_json::to_value(RuleAction::HijackDns).unwrap(),
            serde_json::json!("hijack-dns")
        );
    }
}
