use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;

use crate::profile::types::{
    Outbound, SelectorOutbound, UrltestOutbound, GROUP_AUTO, GROUP_SELECT, TAG_BLOCK, TAG_DIRECT,
};

use super::diag::{DiagCode, Diagnostics};
use super::record::ClashDoc;

pub const PROBE_URL: &str = "http://www.gstatic.com/generate_204";
pub const PROBE_INTERVAL: &str = "10m";

/// 固定的分流服务分组表。proxy_biased 决定默认出口偏走代理还是直连。
pub struct ServiceCategory {
    pub name: &'static str,
    pub proxy_biased: bool,
}

pub const SERVICE_CATEGORIES: &[ServiceCategory] = &[
    ServiceCategory { name: "Telegram", proxy_biased: true },
    ServiceCategory { name: "YouTube", proxy_biased: true },
    ServiceCategory { name: "OpenAI", proxy_biased: true },
    ServiceCategory { name: "Bilibili", proxy_biased: false },
    ServiceCategory { name: "Apple", proxy_biased: false },
];

/// 内部 DNS 服务器标签，同样占用标签命名空间
pub const DNS_SERVER_TAGS: &[&str] = &["dns-remote", "dns-local", "dns-resolver", "dns-block"];

/// 合成标签与基础标签保留，节点撞名必须让位
pub fn reserved_tags() -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    set.insert(GROUP_SELECT.to_string());
    set.insert(GROUP_AUTO.to_string());
    set.insert(TAG_DIRECT.to_string());
    set.insert(TAG_BLOCK.to_string());
    for cat in SERVICE_CATEGORIES {
        set.insert(cat.name.to_string());
    }
    for tag in DNS_SERVER_TAGS {
        set.insert(tag.to_string());
    }
    set
}

/// 追加 `-2`、`-3`… 后缀直到不撞名
pub fn unique_tag(base: &str, used: &BTreeSet<String>) -> String {
    if !used.contains(base) {
        return base.to_string();
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{base}-{n}");
        if !used.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// 节点标签去重。保留标签与已用标签触发重命名，原名到新名的映射返回给调用方。
pub fn dedupe_proxy_tags(
    proxies: &mut [Outbound],
    diags: &mut Diagnostics,
) -> BTreeMap<String, String> {
    let mut used = reserved_tags();
    let mut renames = BTreeMap::new();
    for (idx, proxy) in proxies.iter_mut().enumerate() {
        let original = proxy.tag().to_string();
        let tag = unique_tag(&original, &used);
        if tag != original {
            diags.info(
                DiagCode::DuplicateName,
                format!("proxies[{idx}]"),
                format!("node '{original}' renamed to '{tag}'"),
            );
            renames.insert(original, tag.clone());
            proxy.set_tag(tag.clone());
        }
        used.insert(tag);
    }
    renames
}

/// 合成固定分组：Auto（测速）、Proxy（手选）、服务分组
pub fn synthesize_groups(proxy_tags: &[String]) -> Vec<Outbound> {
    let mut groups = Vec::with_capacity(2 + SERVICE_CATEGORIES.len());

    let mut select_members = vec![GROUP_AUTO.to_string()];
    select_members.extend(proxy_tags.iter().cloned());
    groups.push(Outbound::Selector(SelectorOutbound {
        tag: GROUP_SELECT.to_string(),
        outbounds: select_members,
        default: Some(GROUP_AUTO.to_string()),
        interrupt_exist_connections: None,
        extra: Default::default(),
    }));

    groups.push(Outbound::Urltest(UrltestOutbound {
        tag: GROUP_AUTO.to_string(),
        outbounds: proxy_tags.to_vec(),
        url: Some(PROBE_URL.to_string()),
        interval: Some(PROBE_INTERVAL.to_string()),
        tolerance: None,
        interrupt_exist_connections: Some(false),
        extra: Default::default(),
    }));

    for cat in SERVICE_CATEGORIES {
        let mut members = vec![GROUP_AUTO.to_string(), GROUP_SELECT.to_string()];
        if !cat.proxy_biased {
            members.push(TAG_DIRECT.to_string());
        }
        members.extend(proxy_tags.iter().cloned());
        let default = if cat.proxy_biased {
            GROUP_AUTO.to_string()
        } else {
            TAG_DIRECT.to_string()
        };
        groups.push(Outbound::Selector(SelectorOutbound {
            tag: cat.name.to_string(),
            outbounds: members,
            default: Some(default),
            interrupt_exist_connections: None,
            extra: Default::default(),
        }));
    }

    groups
}

#[derive(Debug, Deserialize)]
struct ClashGroup {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    proxies: Vec<String>,
    url: Option<String>,
    interval: Option<u64>,
}

/// Clash 用户自定义分组翻译。成员只能指向基础标签、节点或同批里
/// 最终落地的组：先定存活集合再解析成员，被跳过的组不参与解析，
/// 悬空成员丢弃并告警，成员清空的组整组跳过。
pub fn translate_user_groups(
    doc: &ClashDoc,
    renames: &BTreeMap<String, String>,
    proxy_tags: &[String],
    diags: &mut Diagnostics,
) -> Vec<Outbound> {
    struct Pending {
        path: String,
        group: ClashGroup,
    }

    // 第一遍：解析，类型不支持的组就地淘汰
    let mut pending: Vec<Pending> = Vec::new();
    for (idx, raw) in doc.proxy_groups.iter().enumerate() {
        let path = format!("proxy-groups[{idx}]");
        let group: ClashGroup = match serde_yml::from_value(raw.clone()) {
            Ok(g) => g,
            Err(e) => {
                diags.warn(
                    DiagCode::InvalidFieldValue,
                    path,
                    format!("proxy group does not parse: {e}"),
                );
                continue;
            }
        };
        if matches!(
            group.kind.as_str(),
            "select" | "selector" | "url-test" | "urltest"
        ) {
            pending.push(Pending { path, group });
        } else {
            diags.warn(
                DiagCode::UnsupportedGroupType,
                path,
                format!(
                    "group '{}' has unsupported type '{}'",
                    group.name, group.kind
                ),
            );
        }
    }

    let mut base: BTreeSet<String> = reserved_tags();
    base.extend(proxy_tags.iter().cloned());

    let resolve = |member: &str| -> String {
        match member {
            "DIRECT" => TAG_DIRECT.to_string(),
            "REJECT" => TAG_BLOCK.to_string(),
            name => renames.get(name).cloned().unwrap_or_else(|| name.to_string()),
        }
    };

    // 第二遍：迭代收敛存活集合。成员全部悬空的组出局，
    // 它的出局可能再清空引用它的组，直到不再有变化。
    let mut alive: BTreeSet<String> = pending.iter().map(|p| p.group.name.clone()).collect();
    loop {
        let mut dropped = false;
        for p in &pending {
            if !alive.contains(&p.group.name) {
                continue;
            }
            let has_member = p.group.proxies.iter().any(|m| {
                let r = resolve(m);
                base.contains(&r) || (r != p.group.name && alive.contains(&r))
            });
            if !has_member {
                alive.remove(&p.group.name);
                dropped = true;
            }
        }
        if !dropped {
            break;
        }
    }

    // 先给存活组定名，成员引用解析到最终标签。重名组首个保住原名。
    let mut used: BTreeSet<String> = base.clone();
    let mut group_tags: BTreeMap<String, String> = BTreeMap::new();
    let mut assigned: Vec<Option<String>> = Vec::with_capacity(pending.len());
    for p in &pending {
        if !alive.contains(&p.group.name) {
            assigned.push(None);
            continue;
        }
        let tag = unique_tag(&p.group.name, &used);
        if tag != p.group.name {
            diags.info(
                DiagCode::DuplicateName,
                p.path.clone(),
                format!("group '{}' renamed to '{}'", p.group.name, tag),
            );
        }
        used.insert(tag.clone());
        group_tags.entry(p.group.name.clone()).or_insert(tag.clone());
        assigned.push(Some(tag));
    }

    // 第三遍：落地
    let mut out = Vec::new();
    for (p, tag) in pending.into_iter().zip(assigned) {
        let Some(tag) = tag else {
            diags.warn(
                DiagCode::InvalidFieldValue,
                p.path,
                format!(
                    "group '{}' has no resolvable members, skipped",
                    p.group.name
                ),
            );
            continue;
        };

        let mut members = Vec::with_capacity(p.group.proxies.len());
        for member in &p.group.proxies {
            let r = resolve(member);
            let target = if base.contains(&r) {
                Some(r)
            } else {
                // 只认落地组的最终标签，自引用同样算悬空
                group_tags.get(&r).filter(|t| **t != tag).cloned()
            };
            match target {
                Some(t) => members.push(t),
                None => diags.warn(
                    DiagCode::InvalidFieldValue,
                    p.path.clone(),
                    format!(
                        "group '{}' references unknown member '{}'",
                        p.group.name, member
                    ),
                ),
            }
        }

        match p.group.kind.as_str() {
            "select" | "selector" => out.push(Outbound::Selector(SelectorOutbound {
                tag,
                default: Some(members[0].clone()),
                outbounds: members,
                interrupt_exist_connections: None,
                extra: Default::default(),
            })),
            _ => out.push(Outbound::Urltest(UrltestOutbound {
                tag,
                outbounds: members,
                url: Some(p.group.url.unwrap_or_else(|| PROBE_URL.to_string())),
                interval: Some(
                    p.group
                        .interval
                        .map(|secs| format!("{secs}s"))
                        .unwrap_or_else(|| PROBE_INTERVAL.to_string()),
                ),
                tolerance: None,
                interrupt_exist_connections: Some(false),
                extra: Default::default(),
            })),
        }
    }
    out
}
