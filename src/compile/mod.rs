//! 订阅文本到路由配置的编译管线：
//! 探测格式 → 归一节点记录 → 协议映射 → 组合成 → 规则翻译 → 组装。

pub mod assemble;
pub mod detect;
pub mod diag;
pub mod groups;
pub mod mapper;
pub mod record;
pub mod rules;

use serde_json::Value;
use tracing::info;

use crate::common::ConvertError;
use crate::profile::types::RoutingProfile;

use detect::Detected;
use diag::Diagnostics;
use record::ClashDoc;

/// 编译结果：文档加按序的诊断列表
#[derive(Debug)]
pub struct Conversion {
    pub profile: RoutingProfile,
    pub diags: Diagnostics,
}

/// 订阅文本编译入口。两种源格式都从这里走。
pub fn convert(text: &str) -> Result<Conversion, ConvertError> {
    let conversion = match detect::detect(text)? {
        Detected::Clash(doc) => convert_clash(&doc)?,
        Detected::SingBox(value) => convert_singbox(&value)?,
    };
    info!(
        outbounds = conversion.profile.outbounds.len(),
        warnings = conversion.diags.warnings().len(),
        "subscription compiled"
    );
    Ok(conversion)
}

fn convert_clash(doc: &ClashDoc) -> Result<Conversion, ConvertError> {
    let mut diags = Diagnostics::new();

    let records = record::clash_records(doc, &mut diags);
    let mut proxies = mapper::map_nodes(&records, &mut diags);
    if proxies.is_empty() {
        return Err(ConvertError::NoUsableNodes {
            skipped: doc.proxies.len(),
        });
    }

    let renames = groups::dedupe_proxy_tags(&mut proxies, &mut diags);
    let proxy_tags: Vec<String> = proxies.iter().map(|p| p.tag().to_string()).collect();

    let synthesized = groups::synthesize_groups(&proxy_tags);
    let user_groups = groups::translate_user_groups(doc, &renames, &proxy_tags, &mut diags);
    let translated = rules::translate_rules(&doc.rules, &mut diags);

    let profile = assemble::assemble(
        proxies,
        synthesized,
        user_groups,
        translated,
        doc.log_level.clone(),
        &mut diags,
    );
    Ok(Conversion { profile, diags })
}

fn convert_singbox(value: &Value) -> Result<Conversion, ConvertError> {
    let mut diags = Diagnostics::new();

    let records = record::singbox_records(value, &mut diags);
    let candidates = value
        .get("outbounds")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter(|o| {
                    let kind = o.get("type").and_then(Value::as_str).unwrap_or_default();
                    !record::is_non_node_kind(kind)
                })
                .count()
        })
        .unwrap_or(0);

    let mut proxies = mapper::map_nodes(&records, &mut diags);
    if proxies.is_empty() {
        return Err(ConvertError::NoUsableNodes { skipped: candidates });
    }

    groups::dedupe_proxy_tags(&mut proxies, &mut diags);
    let proxy_tags: Vec<String> = proxies.iter().map(|p| p.tag().to_string()).collect();
    let synthesized = groups::synthesize_groups(&proxy_tags);

    let log_level = value
        .get("log")
        .and_then(|l| l.get("level"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let profile = assemble::assemble(
        proxies,
        synthesized,
        Vec::new(),
        Vec::new(),
        log_level,
        &mut diags,
    );
    Ok(Conversion { profile, diags })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::types::GROUP_SELECT;

    const CLASH_MINIMAL: &str = r#"
proxies:
  - name: "SS1"
    type: ss
    server: 1.2.3.4
    port: 8388
    cipher: aes-256-gcm
    password: secret
rules:
  - DOMAIN-SUFFIX,google.com,Proxy
  - MATCH,Proxy
"#;

    #[test]
    fn clash_subscription_compiles_and_validates() {
        let conversion = convert(CLASH_MINIMAL).unwrap();
        conversion.profile.validate().unwrap();
        assert!(conversion.diags.warnings().is_empty());
        assert_eq!(
            conversion.profile.route.final_outbound.as_deref(),
            Some(GROUP_SELECT)
        );
    }

    #[test]
    fn empty_proxies_is_no_usable_nodes() {
        let err = convert("proxies: []\nrules: []\n").unwrap_err();
        assert!(matches!(err, ConvertError::NoUsableNodes { skipped: 0 }));
    }

    #[test]
    fn all_skipped_reports_count() {
        let yaml = r#"
proxies:
  - name: "old1"
    type: ssr
  - name: "old2"
    type: ssr
"#;
        let err = convert(yaml).unwrap_err();
        assert!(matches!(err, ConvertError::NoUsableNodes { skipped: 2 }));
    }

    #[test]
    fn singbox_document_recompiles() {
        let json = r#"{"log":{"level":"debug"},"outbounds":[
            {"type":"shadowsocks","tag":"SS1","server":"1.2.3.4","server_port":8388,
             "method":"aes-256-gcm","password":"secret"},
            {"type":"selector","tag":"Old","outbounds":["SS1"]}
        ]}"#;
        let conversion = convert(json).unwrap();
        conversion.profile.validate().unwrap();
        assert_eq!(conversion.profile.log.level, "debug");
        // 源文档的组不保留，按固定拓扑重建
        assert!(conversion
            .profile
            .outbound_tags()
            .iter()
            .all(|t| *t != "Old"));
    }
}
