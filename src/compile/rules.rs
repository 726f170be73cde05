use std::str::FromStr;

use ipnet::IpNet;

use crate::profile::types::{RouteRule, RuleAction, TAG_BLOCK, TAG_DIRECT};

use super::diag::{DiagCode, Diagnostics};

/// Clash 规则目标别名到基础出站的映射
fn resolve_target(target: &str) -> String {
    match target {
        "DIRECT" => TAG_DIRECT.to_string(),
        "REJECT" => TAG_BLOCK.to_string(),
        other => other.to_string(),
    }
}

fn rule_with_target(target: &str) -> RouteRule {
    RouteRule {
        action: Some(RuleAction::Route),
        outbound: Some(resolve_target(target)),
        ..RouteRule::default()
    }
}

/// geo 规则落成 rule-set 引用标签
pub fn geosite_tag(value: &str) -> String {
    format!("geosite-{}", value.to_ascii_lowercase())
}

pub fn geoip_tag(value: &str) -> String {
    format!("geoip-{}", value.to_ascii_lowercase())
}

/// 单条 Clash 规则行翻译。坏行告警后返回 None。
fn translate_line(line: &str, idx: usize, diags: &mut Diagnostics) -> Option<RouteRule> {
    let path = format!("rules[{idx}]");
    let fields: Vec<&str> = line
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();

    if fields.is_empty() {
        diags.warn(
            DiagCode::MalformedRule,
            path,
            format!("rule line '{line}' has no fields"),
        );
        return None;
    }
    // MATCH 兜底行不翻译，final 出口另行指定
    if fields[0] == "MATCH" {
        return None;
    }
    if fields.len() < 3 {
        diags.warn(
            DiagCode::MalformedRule,
            path,
            format!("rule line '{line}' has too few fields"),
        );
        return None;
    }

    let kind = fields[0];
    let value = fields[1];
    // 尾随 no-resolve 修饰符允许出现，目标取倒数第二段
    let target = if fields.last() == Some(&"no-resolve") {
        if fields.len() < 4 {
            diags.warn(
                DiagCode::MalformedRule,
                path,
                format!("rule line '{line}' has too few fields"),
            );
            return None;
        }
        fields[fields.len() - 2]
    } else {
        fields[fields.len() - 1]
    };

    let mut rule = rule_with_target(target);
    match kind {
        "DOMAIN" => rule.domain.push(value.to_string()),
        "DOMAIN-SUFFIX" => rule.domain_suffix.push(value.to_string()),
        "DOMAIN-KEYWORD" => rule.domain_keyword.push(value.to_string()),
        "IP-CIDR" | "IP-CIDR6" => {
            if IpNet::from_str(value).is_err() {
                diags.warn(
                    DiagCode::MalformedRule,
                    path,
                    format!("rule line '{line}' has an invalid CIDR '{value}'"),
                );
                return None;
            }
            rule.ip_cidr.push(value.to_string());
        }
        "SRC-IP-CIDR" => {
            if IpNet::from_str(value).is_err() {
                diags.warn(
                    DiagCode::MalformedRule,
                    path,
                    format!("rule line '{line}' has an invalid CIDR '{value}'"),
                );
                return None;
            }
            rule.source_ip_cidr.push(value.to_string());
        }
        "DST-PORT" => match value.parse::<u16>() {
            Ok(port) => rule.port.push(port),
            Err(_) => {
                diags.warn(
                    DiagCode::MalformedRule,
                    path,
                    format!("rule line '{line}' has an invalid port '{value}'"),
                );
                return None;
            }
        },
        "SRC-PORT" => match value.parse::<u16>() {
            Ok(port) => rule.source_port.push(port),
            Err(_) => {
                diags.warn(
                    DiagCode::MalformedRule,
                    path,
                    format!("rule line '{line}' has an invalid port '{value}'"),
                );
                return None;
            }
        },
        "GEOIP" => rule.rule_set.push(geoip_tag(value)),
        "GEOSITE" => rule.rule_set.push(geosite_tag(value)),
        other => {
            diags.warn(
                DiagCode::UnsupportedRuleType,
                path,
                format!("unsupported rule type '{other}'"),
            );
            return None;
        }
    }
    Some(rule)
}

/// 整批翻译，源顺序保留
pub fn translate_rules(lines: &[String], diags: &mut Diagnostics) -> Vec<RouteRule> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| translate_line(line, idx, diags))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(lines: &[&str]) -> (Vec<RouteRule>, Diagnostics) {
        let owned: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        let mut diags = Diagnostics::new();
        let rules = translate_rules(&owned, &mut diags);
        (rules, diags)
    }

    #[test]
    fn domain_rule_translates() {
        let (rules, diags) = translate(&["DOMAIN-SUFFIX,google.com,Proxy"]);
        assert!(diags.is_empty());
        assert_eq!(rules[0].domain_suffix, vec!["google.com"]);
        assert_eq!(rules[0].outbound.as_deref(), Some("Proxy"));
        assert_eq!(rules[0].action, Some(RuleAction::Route));
    }

    #[test]
    fn match_line_is_dropped_silently() {
        let (rules, diags) = translate(&["MATCH,Proxy"]);
        assert!(rules.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn direct_and_reject_aliases_map_to_base_tags() {
        let (rules, _) = translate(&[
            "DOMAIN,cn.bing.com,DIRECT",
            "DOMAIN-KEYWORD,adservice,REJECT",
        ]);
        assert_eq!(rules[0].outbound.as_deref(), Some(TAG_DIRECT));
        assert_eq!(rules[1].outbound.as_deref(), Some(TAG_BLOCK));
    }

    #[test]
    fn geo_rules_become_rule_set_references() {
        let (rules, _) = translate(&["GEOSITE,CN,DIRECT", "GEOIP,CN,DIRECT,no-resolve"]);
        assert_eq!(rules[0].rule_set, vec!["geosite-cn"]);
        assert_eq!(rules[1].rule_set, vec!["geoip-cn"]);
        assert_eq!(rules[1].outbound.as_deref(), Some(TAG_DIRECT));
    }

    #[test]
    fn invalid_cidr_warns_and_skips() {
        let (rules, diags) = translate(&["IP-CIDR,999.0.0.0/8,DIRECT"]);
        assert!(rules.is_empty());
        assert_eq!(diags.items[0].code, DiagCode::MalformedRule);
    }

    #[test]
    fn short_line_warns_and_skips() {
        let (rules, diags) = translate(&["DOMAIN,example.com"]);
        assert!(rules.is_empty());
        assert_eq!(diags.items[0].code, DiagCode::MalformedRule);
    }

    #[test]
    fn blank_line_warns_as_malformed() {
        let (rules, diags) = translate(&["", " , , "]);
        assert!(rules.is_empty());
        assert_eq!(diags.warnings().len(), 2);
        assert!(diags
            .items
            .iter()
            .all(|d| d.code == DiagCode::MalformedRule));
    }

    #[test]
    fn unknown_rule_type_warns() {
        let (rules, diags) = translate(&["PROCESS-NAME,chrome.exe,Proxy"]);
        assert!(rules.is_empty());
        assert_eq!(diags.items[0].code, DiagCode::UnsupportedRuleType);
    }

    #[test]
    fn order_is_preserved() {
        let (rules, _) = translate(&[
            "DOMAIN,a.com,Proxy",
            "DOMAIN,b.com,DIRECT",
            "DOMAIN,c.com,Proxy",
        ]);
        let domains: Vec<&str> = rules.iter().map(|r| r.domain[0].as_str()).collect();
        assert_eq!(domains, vec!["a.com", "b.com", "c.com"]);
    }
}
