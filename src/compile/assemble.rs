use std::collections::BTreeSet;

use crate::profile::types::{
    BasicOutbound, CacheFile, ClashApi, DnsConfig, DnsRule, DnsServer, Experimental, Inbound,
    LogConfig, Outbound, OutboundEntry, RouteRule, RoutingProfile, RuleAction, RuleSet,
    GROUP_SELECT, TAG_BLOCK, TAG_DIRECT,
};

use super::diag::{DiagCode, Diagnostics};

pub const TUN_TAG: &str = "tun-in";
pub const MIXED_TAG: &str = "mixed-in";
pub const SOCKS_TAG: &str = "socks-in";

pub const TUN_ADDRESS_V4: &str = "172.19.0.1/30";
pub const TUN_ADDRESS_V6: &str = "fdfe:dcba:9876::1/126";
pub const DEFAULT_MTU: u32 = 9000;
pub const DEFAULT_MIXED_PORT: u16 = 2080;
pub const DEFAULT_SOCKS_PORT: u16 = 2081;
pub const DEFAULT_CONTROLLER: &str = "127.0.0.1:9090";

const GEOSITE_URL_BASE: &str =
    "https://raw.githubusercontent.com/SagerNet/sing-geosite/rule-set";
const GEOIP_URL_BASE: &str =
    "https://raw.githubusercontent.com/SagerNet/sing-geoip/rule-set";

fn dns_block() -> DnsConfig {
    DnsConfig {
        servers: vec![
            // 代理侧解析走手选组，避免污染
            DnsServer {
                tag: "dns-remote".to_string(),
                address: "https://1.1.1.1/dns-query".to_string(),
                address_resolver: Some("dns-resolver".to_string()),
                detour: Some(GROUP_SELECT.to_string()),
                ..DnsServer::default()
            },
            DnsServer {
                tag: "dns-local".to_string(),
                address: "https://223.5.5.5/dns-query".to_string(),
                detour: Some(TAG_DIRECT.to_string()),
                ..DnsServer::default()
            },
            // DoH 域名的引导解析
            DnsServer {
                tag: "dns-resolver".to_string(),
                address: "223.5.5.5".to_string(),
                detour: Some(TAG_DIRECT.to_string()),
                ..DnsServer::default()
            },
            DnsServer {
                tag: "dns-block".to_string(),
                address: "rcode://success".to_string(),
                ..DnsServer::default()
            },
        ],
        rules: vec![
            DnsRule {
                outbound: vec!["any".to_string()],
                server: Some("dns-resolver".to_string()),
                ..DnsRule::default()
            },
            DnsRule {
                rule_set: vec!["geosite-private".to_string()],
                server: Some("dns-local".to_string()),
                ..DnsRule::default()
            },
            DnsRule {
                rule_set: vec!["geosite-category-ads-all".to_string()],
                server: Some("dns-block".to_string()),
                ..DnsRule::default()
            },
            DnsRule {
                rule_set: vec!["geosite-cn".to_string()],
                server: Some("dns-local".to_string()),
                ..DnsRule::default()
            },
        ],
        final_server: Some("dns-remote".to_string()),
        ..DnsConfig::default()
    }
}

fn inbounds() -> Vec<Inbound> {
    vec![
        Inbound {
            kind: "tun".to_string(),
            tag: TUN_TAG.to_string(),
            address: vec![TUN_ADDRESS_V4.to_string(), TUN_ADDRESS_V6.to_string()],
            mtu: Some(DEFAULT_MTU),
            auto_route: Some(true),
            strict_route: Some(false),
            stack: Some("mixed".to_string()),
            ..Inbound::default()
        },
        Inbound {
            kind: "mixed".to_string(),
            tag: MIXED_TAG.to_string(),
            listen: Some("127.0.0.1".to_string()),
            listen_port: Some(DEFAULT_MIXED_PORT),
            ..Inbound::default()
        },
        Inbound {
            kind: "socks".to_string(),
            tag: SOCKS_TAG.to_string(),
            listen: Some("127.0.0.1".to_string()),
            listen_port: Some(DEFAULT_SOCKS_PORT),
            ..Inbound::default()
        },
    ]
}

/// 路由前置动作规则：入站流量先嗅探，DNS 查询劫持给 DNS 模块
fn action_rules() -> Vec<RouteRule> {
    vec![
        RouteRule {
            inbound: vec![
                TUN_TAG.to_string(),
                MIXED_TAG.to_string(),
                SOCKS_TAG.to_string(),
            ],
            action: Some(RuleAction::Sniff),
            ..RouteRule::default()
        },
        RouteRule {
            protocol: vec!["dns".to_string()],
            action: Some(RuleAction::HijackDns),
            ..RouteRule::default()
        },
    ]
}

/// 扫描规则引用过的 geo rule-set 标签，生成远程 rule-set 定义
fn rule_set_definitions(profile_rules: &[RouteRule], dns: &DnsConfig) -> Vec<RuleSet> {
    let mut referenced = BTreeSet::new();
    for rule in profile_rules {
        referenced.extend(rule.rule_set.iter().cloned());
    }
    for rule in &dns.rules {
        referenced.extend(rule.rule_set.iter().cloned());
    }

    referenced
        .into_iter()
        .map(|tag| {
            let base = if tag.starts_with("geoip-") {
                GEOIP_URL_BASE
            } else {
                GEOSITE_URL_BASE
            };
            RuleSet {
                url: format!("{base}/{tag}.srs"),
                tag,
                kind: "remote".to_string(),
                format: "binary".to_string(),
                download_detour: Some(TAG_DIRECT.to_string()),
            }
        })
        .collect()
}

/// 组装最终文档。出站顺序固定：基础 → 合成组 → 用户组 → 节点。
pub fn assemble(
    proxies: Vec<Outbound>,
    synthesized: Vec<Outbound>,
    user_groups: Vec<Outbound>,
    translated_rules: Vec<RouteRule>,
    log_level: Option<String>,
    diags: &mut Diagnostics,
) -> RoutingProfile {
    let mut outbounds: Vec<OutboundEntry> = Vec::new();
    outbounds.push(OutboundEntry::Known(Outbound::Direct(BasicOutbound::new(
        TAG_DIRECT,
    ))));
    outbounds.push(OutboundEntry::Known(Outbound::Block(BasicOutbound::new(
        TAG_BLOCK,
    ))));
    outbounds.extend(synthesized.into_iter().map(OutboundEntry::Known));
    outbounds.extend(user_groups.into_iter().map(OutboundEntry::Known));
    outbounds.extend(proxies.into_iter().map(OutboundEntry::Known));

    let tags: BTreeSet<String> = outbounds
        .iter()
        .filter_map(|o| o.tag().map(str::to_string))
        .collect();

    // 目标悬空的规则进不了文档，否则引用完整性不成立
    let mut rules = action_rules();
    for (idx, rule) in translated_rules.into_iter().enumerate() {
        match &rule.outbound {
            Some(target) if !tags.contains(target) => {
                diags.warn(
                    DiagCode::MalformedRule,
                    format!("rules[{idx}]"),
                    format!("rule targets unknown outbound '{target}', dropped"),
                );
            }
            _ => rules.push(rule),
        }
    }

    let dns = dns_block();
    let rule_set = rule_set_definitions(&rules, &dns);

    let mut profile = RoutingProfile {
        log: LogConfig {
            level: log_level.unwrap_or_else(|| "info".to_string()),
            timestamp: None,
        },
        dns: Some(dns),
        inbounds: inbounds(),
        outbounds,
        experimental: Some(Experimental {
            cache_file: Some(CacheFile {
                enabled: true,
                ..CacheFile::default()
            }),
            clash_api: Some(ClashApi {
                external_controller: DEFAULT_CONTROLLER.to_string(),
                ..ClashApi::default()
            }),
            ..Experimental::default()
        }),
        ..RoutingProfile::default()
    };
    profile.route.rules = rules;
    profile.route.rule_set = rule_set;
    profile.route.final_outbound = Some(GROUP_SELECT.to_string());
    profile.route.auto_detect_interface = Some(true);
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::groups::synthesize_groups;
    use crate::profile::types::ShadowsocksOutbound;

    fn proxy(tag: &str) -> Outbound {
        Outbound::Shadowsocks(ShadowsocksOutbound {
            tag: tag.to_string(),
            server: "1.2.3.4".to_string(),
            server_port: 8388,
            method: "aes-256-gcm".to_string(),
            password: "pw".to_string(),
            ..ShadowsocksOutbound::default()
        })
    }

    fn assemble_one() -> RoutingProfile {
        let proxies = vec![proxy("SS1")];
        let tags = vec!["SS1".to_string()];
        let mut diags = Diagnostics::new();
        assemble(
            proxies,
            synthesize_groups(&tags),
            Vec::new(),
            Vec::new(),
            None,
            &mut diags,
        )
    }

    #[test]
    fn assembled_profile_validates() {
        let profile = assemble_one();
        profile.validate().unwrap();
        assert_eq!(profile.route.final_outbound.as_deref(), Some(GROUP_SELECT));
    }

    #[test]
    fn outbound_order_is_bases_groups_proxies() {
        let profile = assemble_one();
        let tags: Vec<&str> = profile.outbound_tags();
        assert_eq!(&tags[..4], &[TAG_DIRECT, TAG_BLOCK, "Proxy", "Auto"]);
        assert_eq!(*tags.last().unwrap(), "SS1");
    }

    #[test]
    fn leading_rules_are_sniff_and_hijack() {
        let profile = assemble_one();
        assert_eq!(profile.route.rules[0].action, Some(RuleAction::Sniff));
        assert_eq!(profile.route.rules[1].action, Some(RuleAction::HijackDns));
    }

    #[test]
    fn referenced_rule_sets_get_definitions() {
        let proxies = vec![proxy("SS1")];
        let tags = vec!["SS1".to_string()];
        let translated = vec![RouteRule {
            rule_set: vec!["geoip-cn".to_string()],
            action: Some(RuleAction::Route),
            outbound: Some(TAG_DIRECT.to_string()),
            ..RouteRule::default()
        }];
        let mut diags = Diagnostics::new();
        let profile = assemble(
            proxies,
            synthesize_groups(&tags),
            Vec::new(),
            translated,
            None,
            &mut diags,
        );
        let defined: Vec<&str> = profile.route.rule_set.iter().map(|r| r.tag.as_str()).collect();
        assert!(defined.contains(&"geoip-cn"));
        // DNS 规则引用的 geosite 集合也要有定义
        assert!(defined.contains(&"geosite-cn"));
        let geoip = profile
            .route
            .rule_set
            .iter()
            .find(|r| r.tag == "geoip-cn")
            .unwrap();
        assert!(geoip.url.contains("sing-geoip"));
        profile.validate().unwrap();
    }

    #[test]
    fn dangling_rule_target_is_dropped_with_warning() {
        let proxies = vec![proxy("SS1")];
        let tags = vec!["SS1".to_string()];
        let translated = vec![RouteRule {
            domain: vec!["x.com".to_string()],
            action: Some(RuleAction::Route),
            outbound: Some("NoSuchGroup".to_string()),
            ..RouteRule::default()
        }];
        let mut diags = Diagnostics::new();
        let profile = assemble(
            proxies,
            synthesize_groups(&tags),
            Vec::new(),
            translated,
            None,
            &mut diags,
        );
        assert_eq!(profile.route.rules.len(), 2);
        assert_eq!(diags.warnings().len(), 1);
        profile.validate().unwrap();
    }
}
