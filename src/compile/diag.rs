use std::fmt;

/// 编译告警等级。致命错误走 `ConvertError`，不进诊断列表。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Info,
    Warn,
}

impl fmt::Display for DiagLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagLevel::Info => write!(f, "INFO"),
            DiagLevel::Warn => write!(f, "WARN"),
        }
    }
}

/// 稳定告警码（对外 API，不可随意变更）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagCode {
    MissingRequiredField,
    InvalidFieldValue,
    UnsupportedProtocol,
    UnsupportedGroupType,
    UnsupportedRuleType,
    MalformedRule,
    DuplicateName,
}

impl DiagCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            DiagCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            DiagCode::UnsupportedProtocol => "UNSUPPORTED_PROTOCOL",
            DiagCode::UnsupportedGroupType => "UNSUPPORTED_GROUP_TYPE",
            DiagCode::UnsupportedRuleType => "UNSUPPORTED_RULE_TYPE",
            DiagCode::MalformedRule => "MALFORMED_RULE",
            DiagCode::DuplicateName => "DUPLICATE_NAME",
        }
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 单条诊断信息
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: DiagLevel,
    pub code: DiagCode,
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at {}: {}",
            self.level, self.code, self.path, self.message
        )
    }
}

/// 诊断收集器，顺序保留
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn warn(&mut self, code: DiagCode, path: impl Into<String>, message: impl Into<String>) {
        self.items.push(Diagnostic {
            level: DiagLevel::Warn,
            code,
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn info(&mut self, code: DiagCode, path: impl Into<String>, message: impl Into<String>) {
        self.items.push(Diagnostic {
            level: DiagLevel::Info,
            code,
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.items
            .iter()
            .filter(|d| d.level == DiagLevel::Warn)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }
}
