//! 路由配置文档：类型、归一化迁移、设置投影与编码。

pub mod normalize;
pub mod settings;
pub mod types;

pub use normalize::{normalize, normalize_text, NormalizeOutcome};
pub use settings::{apply, apply_text, AppSettings};
pub use types::RoutingProfile;

use anyhow::Result;

/// 落盘格式：两空格缩进的 pretty JSON
pub fn encode_json(profile: &RoutingProfile) -> Result<String> {
    Ok(serde_json::to_string_pretty(profile)?)
}

/// 紧凑编码，给不在乎可读性的调用方
pub fn encode_json_compact(profile: &RoutingProfile) -> Result<String> {
    Ok(serde_json::to_string(profile)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_and_compact_encode_the_same_document() {
        let profile = RoutingProfile::default();
        let pretty = encode_json(&profile).unwrap();
        let compact = encode_json_compact(&profile).unwrap();
        let a: serde_json::Value = serde_json::from_str(&pretty).unwrap();
        let b: serde_json::Value = serde_json::from_str(&compact).unwrap();
        assert_eq!(a, b);
        assert!(pretty.contains('\n'));
        assert!(!compact.contains('\n'));
    }
}
