use thiserror::Error;

/// 订阅编译的致命错误。可恢复问题走 `compile::diag::Diagnostics`。
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("subscription text matches neither the sing-box JSON nor the Clash YAML schema")]
    UnknownFormat,

    #[error("subscription contains no usable proxy nodes ({skipped} skipped)")]
    NoUsableNodes { skipped: usize },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ConvertError {
    /// 是否为输入本身的问题（换一份订阅文本才有救）
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ConvertError::UnknownFormat | ConvertError::NoUsableNodes { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let e = ConvertError::NoUsableNodes { skipped: 3 };
        assert!(e.to_string().contains("3 skipped"));
        assert!(e.is_input_error());
        assert!(!ConvertError::InvalidDocument("x".into()).is_input_error());
    }
}
