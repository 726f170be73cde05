//! 持久化文档的就地迁移。所有 pass 幂等，重复运行不再变更。

use std::borrow::Cow;
use std::net::IpAddr;

use tracing::{debug, warn};

use super::types::{
    OutboundEntry, RoutingProfile, SelectorOutbound, GROUP_SELECT, TAG_DIRECT,
};

/// 识别为"全局选择组"的历史别名。文档里已有这类组就不再合成兜底组。
const GLOBAL_ALIASES: &[&str] = &["Proxy", "PROXY", "GLOBAL", "Select", "select", "proxy"];

/// tun 地址迁移：默认栈上的裸 IP 条目补上前缀长度。
/// 旧版写法是裸主机地址，现行写法是显式前缀。
fn migrate_tun_addresses(profile: &mut RoutingProfile) -> bool {
    let mut changed = false;
    for inbound in &mut profile.inbounds {
        if inbound.kind != "tun" {
            continue;
        }
        if !matches!(inbound.stack.as_deref(), None | Some("mixed")) {
            continue;
        }
        for addr in &mut inbound.address {
            if addr.contains('/') {
                continue;
            }
            match addr.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => {
                    *addr = format!("{addr}/30");
                    changed = true;
                }
                Ok(IpAddr::V6(_)) => {
                    *addr = format!("{addr}/126");
                    changed = true;
                }
                // 解析不了的条目保持原样
                Err(_) => {}
            }
        }
    }
    changed
}

fn has_global_group(profile: &RoutingProfile) -> bool {
    profile.outbounds.iter().any(|entry| {
        if entry.is_group() {
            return true;
        }
        if entry.is_base() {
            return false;
        }
        entry
            .tag()
            .map(|t| GLOBAL_ALIASES.contains(&t))
            .unwrap_or(false)
    })
}

/// 兜底组合成：文档里没有任何组出站时，把全部节点收进一个选择组，
/// 并把空置或指向直连的 final 指过去。
fn ensure_fallback_group(profile: &mut RoutingProfile) -> bool {
    if has_global_group(profile) {
        return false;
    }
    let non_base: Vec<String> = profile
        .outbounds
        .iter()
        .filter(|e| !e.is_base())
        .filter_map(|e| e.tag().map(str::to_string))
        .collect();
    if non_base.is_empty() {
        return false;
    }

    let default = non_base[0].clone();
    profile
        .outbounds
        .push(OutboundEntry::Known(super::types::Outbound::Selector(
            SelectorOutbound {
                tag: GROUP_SELECT.to_string(),
                outbounds: non_base,
                default: Some(default),
                interrupt_exist_connections: None,
                extra: Default::default(),
            },
        )));

    match profile.route.final_outbound.as_deref() {
        None | Some("") | Some(TAG_DIRECT) => {
            profile.route.final_outbound = Some(GROUP_SELECT.to_string());
        }
        // 用户自定义的 final 不动
        Some(_) => {}
    }
    true
}

/// 归一化文档。返回是否发生了变更，调用方据此决定要不要回写。
pub fn normalize(profile: &mut RoutingProfile) -> bool {
    let migrated = migrate_tun_addresses(profile);
    let grouped = ensure_fallback_group(profile);
    if migrated || grouped {
        debug!(migrated, grouped, "profile normalized");
    }
    migrated || grouped
}

/// 文本级归一化结果
pub struct NormalizeOutcome<'a> {
    pub text: Cow<'a, str>,
    pub changed: bool,
}

/// 文本进文本出的归一化。解析不了的输入原样透传，绝不毁文件。
pub fn normalize_text(text: &str) -> NormalizeOutcome<'_> {
    let mut profile: RoutingProfile = match serde_json::from_str(text) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "profile does not parse, left untouched");
            return NormalizeOutcome {
                text: Cow::Borrowed(text),
                changed: false,
            };
        }
    };
    if !normalize(&mut profile) {
        return NormalizeOutcome {
            text: Cow::Borrowed(text),
            changed: false,
        };
    }
    match super::encode_json(&profile) {
        Ok(encoded) => NormalizeOutcome {
            text: Cow::Owned(encoded),
            changed: true,
        },
        Err(e) => {
            warn!(error = %e, "profile does not re-encode, left untouched");
            NormalizeOutcome {
                text: Cow::Borrowed(text),
                changed: false,
            }
        }
    }
}
