use uuid::Uuid;

use crate::profile::types::{
    GrpcTransport, HttpOutbound, HttpTransport, Outbound, ShadowsocksOutbound, SocksOutbound,
    TlsOptions, Transport, TrojanOutbound, VlessOutbound, VmessOutbound, WsTransport,
};

use super::diag::{DiagCode, Diagnostics};
use super::record::{NodeRecord, TlsRecord};

/// 支持映射的节点协议。封闭枚举，分派必须穷尽。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Shadowsocks,
    Trojan,
    Vmess,
    Vless,
    Socks,
    Http,
}

impl Protocol {
    /// 两种源格式的协议别名都在这里归一
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "ss" | "shadowsocks" => Some(Protocol::Shadowsocks),
            "trojan" => Some(Protocol::Trojan),
            "vmess" => Some(Protocol::Vmess),
            "vless" => Some(Protocol::Vless),
            "socks" | "socks5" => Some(Protocol::Socks),
            "http" => Some(Protocol::Http),
            _ => None,
        }
    }
}

fn tls_options(rec: &TlsRecord) -> TlsOptions {
    TlsOptions {
        enabled: true,
        server_name: rec.server_name.clone(),
        insecure: rec.insecure.then_some(true),
        alpn: rec.alpn.clone(),
        extra: Default::default(),
    }
}

fn transport(rec: &NodeRecord) -> Option<Transport> {
    match rec.network.as_deref() {
        Some("ws") => Some(Transport::Ws(WsTransport {
            path: rec.ws_path.clone(),
            headers: rec.ws_headers.clone(),
        })),
        Some("grpc") => Some(Transport::Grpc(GrpcTransport {
            service_name: rec.grpc_service_name.clone(),
        })),
        Some("h2") | Some("http") => Some(Transport::Http(HttpTransport {
            host: rec.h2_hosts.clone(),
            path: rec.h2_path.clone(),
        })),
        // 未识别的传输类型按裸 tcp 处理，不告警
        _ => None,
    }
}

/// 节点名。空白名用位置占位符顶上。
fn node_tag(rec: &NodeRecord, idx: usize) -> String {
    let trimmed = rec.name.trim();
    if trimmed.is_empty() {
        format!("node-{}", idx + 1)
    } else {
        trimmed.to_string()
    }
}

struct Required<'a> {
    path: String,
    name: String,
    diags: &'a mut Diagnostics,
    ok: bool,
}

impl<'a> Required<'a> {
    fn str_field(&mut self, field: &str, value: &Option<String>) -> String {
        match value {
            Some(v) if !v.trim().is_empty() => v.clone(),
            _ => {
                self.diags.warn(
                    DiagCode::MissingRequiredField,
                    self.path.clone(),
                    format!("node '{}' is missing required field '{}'", self.name, field),
                );
                self.ok = false;
                String::new()
            }
        }
    }

    fn port(&mut self, value: Option<u16>) -> u16 {
        match value {
            Some(p) if p != 0 => p,
            _ => {
                self.diags.warn(
                    DiagCode::MissingRequiredField,
                    self.path.clone(),
                    format!("node '{}' is missing required field 'port'", self.name),
                );
                self.ok = false;
                0
            }
        }
    }

    fn uuid_field(&mut self, value: &Option<String>) -> String {
        let raw = self.str_field("uuid", value);
        if !self.ok {
            return raw;
        }
        if Uuid::parse_str(raw.trim()).is_err() {
            self.diags.warn(
                DiagCode::InvalidFieldValue,
                self.path.clone(),
                format!("node '{}' has a malformed uuid '{}'", self.name, raw),
            );
            self.ok = false;
        }
        raw
    }
}

/// 单节点映射。失败的记录告警后返回 None，批次照常继续。
pub fn map_node(rec: &NodeRecord, idx: usize, diags: &mut Diagnostics) -> Option<Outbound> {
    let path = format!("proxies[{idx}]");
    let tag = node_tag(rec, idx);

    let protocol = match Protocol::from_kind(&rec.kind) {
        Some(p) => p,
        None => {
            diags.warn(
                DiagCode::UnsupportedProtocol,
                path,
                format!("unsupported protocol '{}' for node '{}'", rec.kind, tag),
            );
            return None;
        }
    };

    let mut req = Required {
        path,
        name: tag.clone(),
        diags,
        ok: true,
    };

    let outbound = match protocol {
        Protocol::Shadowsocks => {
            let server = req.str_field("server", &rec.server);
            let server_port = req.port(rec.port);
            let method = req.str_field("cipher", &rec.method);
            let password = req.str_field("password", &rec.password);
            Outbound::Shadowsocks(ShadowsocksOutbound {
                tag,
                server,
                server_port,
                method,
                password,
                plugin: rec.plugin.clone(),
                plugin_opts: rec.plugin_opts.clone(),
                extra: Default::default(),
            })
        }
        Protocol::Trojan => {
            let server = req.str_field("server", &rec.server);
            let server_port = req.port(rec.port);
            let password = req.str_field("password", &rec.password);
            Outbound::Trojan(TrojanOutbound {
                tag,
                server,
                server_port,
                password,
                tls: rec.tls.as_ref().map(tls_options),
                transport: transport(rec),
                extra: Default::default(),
            })
        }
        Protocol::Vmess => {
            let server = req.str_field("server", &rec.server);
            let server_port = req.port(rec.port);
            let uuid = req.uuid_field(&rec.uuid);
            Outbound::Vmess(VmessOutbound {
                tag,
                server,
                server_port,
                uuid,
                security: rec.method.clone().or_else(|| Some("auto".to_string())),
                alter_id: rec.alter_id,
                tls: rec.tls.as_ref().map(tls_options),
                transport: transport(rec),
                extra: Default::default(),
            })
        }
        Protocol::Vless => {
            let server = req.str_field("server", &rec.server);
            let server_port = req.port(rec.port);
            let uuid = req.uuid_field(&rec.uuid);
            Outbound::Vless(VlessOutbound {
                tag,
                server,
                server_port,
                uuid,
                flow: rec.flow.clone(),
                tls: rec.tls.as_ref().map(tls_options),
                transport: transport(rec),
                extra: Default::default(),
            })
        }
        Protocol::Socks => {
            let server = req.str_field("server", &rec.server);
            let server_port = req.port(rec.port);
            Outbound::Socks(SocksOutbound {
                tag,
                server,
                server_port,
                username: rec.username.clone(),
                password: rec.password.clone(),
                extra: Default::default(),
            })
        }
        Protocol::Http => {
            let server = req.str_field("server", &rec.server);
            let server_port = req.port(rec.port);
            Outbound::Http(HttpOutbound {
                tag,
                server,
                server_port,
                username: rec.username.clone(),
                password: rec.password.clone(),
                tls: rec.tls.as_ref().map(tls_options),
                extra: Default::default(),
            })
        }
    };

    req.ok.then_some(outbound)
}

/// 整批映射，顺序保留
pub fn map_nodes(records: &[NodeRecord], diags: &mut Diagnostics) -> Vec<Outbound> {
    records
        .iter()
        .enumerate()
        .filter_map(|(idx, rec)| map_node(rec, idx, diags))
        .collect()
}
