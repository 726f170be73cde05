use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::diag::{DiagCode, Diagnostics};

/// Clash YAML 文档。只取编译要用的键，其余忽略。
#[derive(Debug, Default, Deserialize)]
pub struct ClashDoc {
    #[serde(default)]
    pub proxies: Vec<serde_yml::Value>,
    #[serde(default, rename = "proxy-groups")]
    pub proxy_groups: Vec<serde_yml::Value>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

/// 两种源格式归一后的节点记录。字段缺失由 mapper 判定是否致命。
#[derive(Debug, Default, Clone)]
pub struct NodeRecord {
    pub name: String,
    pub kind: String,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub uuid: Option<String>,
    pub password: Option<String>,
    pub method: Option<String>,
    pub alter_id: Option<u32>,
    pub flow: Option<String>,
    pub plugin: Option<String>,
    pub plugin_opts: Option<String>,
    pub username: Option<String>,
    /// Some 即视为声明了 TLS
    pub tls: Option<TlsRecord>,
    pub network: Option<String>,
    pub ws_path: Option<String>,
    pub ws_headers: BTreeMap<String, String>,
    pub grpc_service_name: Option<String>,
    pub h2_hosts: Vec<String>,
    pub h2_path: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct TlsRecord {
    pub server_name: Option<String>,
    pub insecure: bool,
    pub alpn: Vec<String>,
}

// ---------- Clash 侧 ----------

#[derive(Debug, Deserialize)]
struct ClashProxy {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    server: Option<String>,
    port: Option<u16>,
    uuid: Option<String>,
    password: Option<String>,
    cipher: Option<String>,
    #[serde(rename = "alterId")]
    alter_id: Option<u32>,
    flow: Option<String>,
    plugin: Option<String>,
    #[serde(rename = "plugin-opts")]
    plugin_opts: Option<BTreeMap<String, serde_yml::Value>>,
    username: Option<String>,
    tls: Option<bool>,
    sni: Option<String>,
    servername: Option<String>,
    #[serde(rename = "skip-cert-verify")]
    skip_cert_verify: Option<bool>,
    alpn: Option<Vec<String>>,
    network: Option<String>,
    #[serde(rename = "ws-opts")]
    ws_opts: Option<WsOpts>,
    #[serde(rename = "grpc-opts")]
    grpc_opts: Option<GrpcOpts>,
    #[serde(rename = "h2-opts")]
    h2_opts: Option<H2Opts>,
}

#[derive(Debug, Deserialize)]
struct WsOpts {
    path: Option<String>,
    headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct GrpcOpts {
    #[serde(rename = "grpc-service-name")]
    service_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct H2Opts {
    host: Option<Vec<String>>,
    path: Option<String>,
}

/// Clash `plugin-opts` 映射压成 sing-box 的 `k=v;k=v` 字符串形式
fn plugin_opts_string(opts: &BTreeMap<String, serde_yml::Value>) -> String {
    let mut parts = Vec::with_capacity(opts.len());
    for (k, v) in opts {
        let rendered = match v {
            serde_yml::Value::String(s) => s.clone(),
            serde_yml::Value::Bool(b) => b.to_string(),
            serde_yml::Value::Number(n) => n.to_string(),
            _ => continue,
        };
        parts.push(format!("{k}={rendered}"));
    }
    parts.join(";")
}

/// 解析 Clash `proxies` 列表。单条坏记录告警跳过，不中断整批。
pub fn clash_records(doc: &ClashDoc, diags: &mut Diagnostics) -> Vec<NodeRecord> {
    let mut out = Vec::with_capacity(doc.proxies.len());
    for (idx, raw) in doc.proxies.iter().enumerate() {
        let path = format!("proxies[{idx}]");
        let proxy: ClashProxy = match serde_yml::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                diags.warn(
                    DiagCode::InvalidFieldValue,
                    path,
                    format!("proxy entry does not parse: {e}"),
                );
                continue;
            }
        };

        // trojan 的 TLS 由协议强制，无需显式 tls 标志
        let declares_tls = proxy.tls == Some(true) || proxy.kind == "trojan";
        let tls = declares_tls.then(|| TlsRecord {
            server_name: proxy.sni.clone().or_else(|| proxy.servername.clone()),
            insecure: proxy.skip_cert_verify.unwrap_or(false),
            alpn: proxy.alpn.clone().unwrap_or_default(),
        });

        let mut rec = NodeRecord {
            name: proxy.name.unwrap_or_default(),
            kind: proxy.kind,
            server: proxy.server,
            port: proxy.port,
            uuid: proxy.uuid,
            password: proxy.password,
            method: proxy.cipher,
            alter_id: proxy.alter_id,
            flow: proxy.flow,
            plugin: proxy.plugin,
            plugin_opts: proxy.plugin_opts.as_ref().map(plugin_opts_string),
            username: proxy.username,
            tls,
            network: proxy.network,
            ..NodeRecord::default()
        };
        if let Some(ws) = proxy.ws_opts {
            rec.ws_path = ws.path;
            rec.ws_headers = ws.headers.unwrap_or_default();
        }
        if let Some(grpc) = proxy.grpc_opts {
            rec.grpc_service_name = grpc.service_name;
        }
        if let Some(h2) = proxy.h2_opts {
            rec.h2_hosts = h2.host.unwrap_or_default();
            rec.h2_path = h2.path;
        }
        out.push(rec);
    }
    out
}

// ---------- sing-box 侧 ----------

#[derive(Debug, Deserialize)]
struct SingBoxNode {
    tag: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    server: Option<String>,
    server_port: Option<u16>,
    uuid: Option<String>,
    password: Option<String>,
    method: Option<String>,
    security: Option<String>,
    alter_id: Option<u32>,
    flow: Option<String>,
    plugin: Option<String>,
    plugin_opts: Option<String>,
    username: Option<String>,
    tls: Option<SingBoxTls>,
    transport: Option<SingBoxTransport>,
}

#[derive(Debug, Deserialize)]
struct SingBoxTls {
    #[serde(default)]
    enabled: bool,
    server_name: Option<String>,
    #[serde(default)]
    insecure: bool,
    #[serde(default)]
    alpn: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SingBoxTransport {
    #[serde(rename = "type")]
    kind: String,
    path: Option<String>,
    headers: Option<BTreeMap<String, String>>,
    service_name: Option<String>,
    host: Option<Vec<String>>,
}

/// 非节点 outbound（组、基础出站）不进节点记录
pub fn is_non_node_kind(kind: &str) -> bool {
    matches!(kind, "selector" | "urltest" | "direct" | "block" | "dns")
}

/// 从 sing-box JSON 文档提取节点记录。组与基础出站静默跳过。
pub fn singbox_records(doc: &Value, diags: &mut Diagnostics) -> Vec<NodeRecord> {
    let outbounds = match doc.get("outbounds").and_then(Value::as_array) {
        Some(list) => list,
        None => return Vec::new(),
    };
    let mut out = Vec::with_capacity(outbounds.len());
    for (idx, raw) in outbounds.iter().enumerate() {
        let path = format!("outbounds[{idx}]");
        let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();
        if is_non_node_kind(kind) {
            continue;
        }
        let node: SingBoxNode = match serde_json::from_value(raw.clone()) {
            Ok(n) => n,
            Err(e) => {
                diags.warn(
                    DiagCode::InvalidFieldValue,
                    path,
                    format!("outbound entry does not parse: {e}"),
                );
                continue;
            }
        };

        let declares_tls = node.tls.as_ref().map(|t| t.enabled).unwrap_or(false)
            || node.kind == "trojan";
        let tls = if declares_tls {
            let t = node.tls.as_ref();
            Some(TlsRecord {
                server_name: t.and_then(|t| t.server_name.clone()),
                insecure: t.map(|t| t.insecure).unwrap_or(false),
                alpn: t.map(|t| t.alpn.clone()).unwrap_or_default(),
            })
        } else {
            None
        };

        let mut rec = NodeRecord {
            name: node.tag.unwrap_or_default(),
            kind: node.kind,
            server: node.server,
            port: node.server_port,
            uuid: node.uuid,
            password: node.password,
            // vmess 的加密字段叫 security，统一收进 method
            method: node.method.or(node.security),
            alter_id: node.alter_id,
            flow: node.flow,
            plugin: node.plugin,
            plugin_opts: node.plugin_opts,
            username: node.username,
            tls,
            ..NodeRecord::default()
        };
        if let Some(tr) = node.transport {
            rec.network = Some(tr.kind.clone());
            match tr.kind.as_str() {
                "ws" => {
                    rec.ws_path = tr.path;
                    rec.ws_headers = tr.headers.unwrap_or_default();
                }
                "grpc" => rec.grpc_service_name = tr.service_name,
                "http" => {
                    rec.h2_hosts = tr.host.unwrap_or_default();
                    rec.h2_path = tr.path;
                }
                _ => {}
            }
        }
        out.push(rec);
    }
    out
}
