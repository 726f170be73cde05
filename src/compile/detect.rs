use serde_json::Value;

use crate::common::ConvertError;

use super::record::ClashDoc;

/// 识别出的订阅格式
#[derive(Debug)]
pub enum Detected {
    /// sing-box JSON 文档（原样保留 Value，后续按类型解出 outbounds）
    SingBox(Value),
    /// Clash YAML 文档
    Clash(Box<ClashDoc>),
}

/// 格式探测：先试 JSON，再试 YAML。
///
/// JSON 解析成功但顶层既无 `outbounds` 也无 `inbounds` 的，不当作
/// sing-box 文档，落到 YAML 分支（合法 JSON 也是合法 YAML）。
pub fn detect(text: &str) -> Result<Detected, ConvertError> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(obj) = value.as_object() {
            if obj.contains_key("outbounds") || obj.contains_key("inbounds") {
                return Ok(Detected::SingBox(value));
            }
        }
    }

    match serde_yml::from_str::<serde_yml::Value>(text) {
        Ok(serde_yml::Value::Mapping(_)) => {
            let doc: ClashDoc = serde_yml::from_str(text)
                .map_err(|e| ConvertError::InvalidDocument(format!("clash yaml: {e}")))?;
            Ok(Detected::Clash(Box::new(doc)))
        }
        _ => Err(ConvertError::UnknownFormat),
    }
}
