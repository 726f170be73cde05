/// 归一化与设置投影的文件级测试：模拟宿主的读-改-写循环。
use std::fs;

use boxforge::profile::{self, normalize_text, AppSettings};
use boxforge::RoutingProfile;

const LEGACY_DOC: &str = r#"{
  "log": { "level": "info" },
  "inbounds": [
    { "type": "tun", "tag": "tun-in", "address": ["172.19.0.1"] }
  ],
  "outbounds": [
    { "type": "direct", "tag": "direct" },
    { "type": "block", "tag": "block" },
    { "type": "shadowsocks", "tag": "SS1", "server": "1.2.3.4",
      "server_port": 8388, "method": "aes-256-gcm", "password": "pw" }
  ],
  "route": { "final": "direct" }
}"#;

#[test]
fn legacy_document_migrates_once() {
    let first = normalize_text(LEGACY_DOC);
    assert!(first.changed);

    let migrated: RoutingProfile = serde_json::from_str(&first.text).unwrap();
    migrated.validate().unwrap();
    assert_eq!(migrated.inbounds[0].address, vec!["172.19.0.1/30"]);
    assert_eq!(migrated.route.final_outbound.as_deref(), Some("Proxy"));

    // 第二遍必须无变更
    let second = normalize_text(&first.text);
    assert!(!second.changed);
}

#[test]
fn normalize_file_cycle_skips_write_when_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, LEGACY_DOC).unwrap();

    // 宿主循环：读，归一化，仅变更时回写
    let text = fs::read_to_string(&path).unwrap();
    let outcome = normalize_text(&text);
    assert!(outcome.changed);
    fs::write(&path, outcome.text.as_ref()).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let outcome = normalize_text(&text);
    assert!(!outcome.changed);
    // 无变更时借用原文，不产生新串
    assert!(matches!(outcome.text, std::borrow::Cow::Borrowed(_)));
}

#[test]
fn corrupt_file_survives_normalize_and_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ truncated").unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let outcome = normalize_text(&text);
    assert!(!outcome.changed);
    assert_eq!(outcome.text, "{ truncated");

    assert!(profile::apply_text(&text, &AppSettings::default()).is_none());
}

#[test]
fn unknown_outbounds_survive_the_full_cycle() {
    let doc = r#"{
      "outbounds": [
        { "type": "direct", "tag": "direct" },
        { "type": "block", "tag": "block" },
        { "type": "hysteria2", "tag": "H1", "server": "h.example.com",
          "server_port": 443, "up_mbps": 100 }
      ],
      "route": { "final": "direct" }
    }"#;
    let outcome = normalize_text(doc);
    assert!(outcome.changed, "fallback group must be synthesized");

    let value: serde_json::Value = serde_json::from_str(&outcome.text).unwrap();
    let outbounds = value["outbounds"].as_array().unwrap();
    let h1 = outbounds
        .iter()
        .find(|o| o["tag"] == "H1")
        .expect("unmodeled outbound preserved");
    assert_eq!(h1["up_mbps"], 100);

    // 兜底组把未建模节点也收进来
    let group = outbounds
        .iter()
        .find(|o| o["type"] == "selector")
        .expect("fallback selector");
    assert_eq!(group["tag"], "Proxy");
    assert!(group["outbounds"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m == "H1"));
    assert_eq!(value["route"]["final"], "Proxy");
}

#[test]
fn settings_apply_to_file_preserves_unknown_fields() {
    let doc = r#"{
      "log": { "level": "info" },
      "inbounds": [
        { "type": "tun", "tag": "tun-in", "address": ["172.19.0.1/30"],
          "custom_vendor_key": true },
        { "type": "mixed", "tag": "mixed-in", "listen": "127.0.0.1", "listen_port": 2080 }
      ],
      "outbounds": [
        { "type": "direct", "tag": "direct" },
        { "type": "block", "tag": "block" }
      ],
      "route": { "final": "direct" }
    }"#;
    let settings = AppSettings {
        mixed_port: 7890,
        tun_mtu: 1500,
        ..AppSettings::default()
    };
    let updated = profile::apply_text(doc, &settings).unwrap();
    let value: serde_json::Value = serde_json::from_str(&updated).unwrap();
    let tun = &value["inbounds"][0];
    assert_eq!(tun["mtu"], 1500);
    assert_eq!(tun["custom_vendor_key"], true, "unknown field preserved");
    assert_eq!(value["inbounds"][1]["listen_port"], 7890);
}

#[test]
fn compile_then_settings_then_normalize_is_stable() {
    let yaml = r#"
proxies:
  - name: "SS1"
    type: ss
    server: 1.2.3.4
    port: 8388
    cipher: aes-256-gcm
    password: secret
"#;
    let mut compiled = boxforge::convert(yaml).unwrap().profile;
    profile::apply(&mut compiled, &AppSettings::default());
    compiled.validate().unwrap();

    // 编译产物已是规范形态，归一化不得再有动作
    assert!(!profile::normalize(&mut compiled));
}
