use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 状态账本错误
    Ledger(LedgerError),
    /// 阶段适配器错误
    Adapter(AdapterError),
    /// 产物生成错误
    Artifact(ArtifactError),
    /// 上传/导出错误
    Sink(SinkError),
    /// 文件操作错误
    File(FileError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Ledger(e) => write!(f, "账本错误: {}", e),
            AppError::Adapter(e) => write!(f, "适配器错误: {}", e),
            AppError::Artifact(e) => write!(f, "产物错误: {}", e),
            AppError::Sink(e) => write!(f, "上传错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Ledger(e) => Some(e),
            AppError::Adapter(e) => Some(e),
            AppError::Artifact(e) => Some(e),
            AppError::Sink(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 状态账本错误
#[derive(Debug)]
pub enum LedgerError {
    /// 记录不存在
    RecordNotFound {
        article_id: String,
    },
    /// 账本持久化失败
    PersistFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 账本文件解析失败
    ParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::RecordNotFound { article_id } => {
                write!(f, "账本中不存在记录: {}", article_id)
            }
            LedgerError::PersistFailed { path, source } => {
                write!(f, "账本写入失败 ({}): {}", path, source)
            }
            LedgerError::ParseFailed { path, source } => {
                write!(f, "账本解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::PersistFailed { source, .. } | LedgerError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 阶段适配器错误
///
/// 每个流水线阶段的调用结果都用显式的 `Result` 表达，
/// 由调用方按变体分支处理，而不是层层向上抛。
#[derive(Debug)]
pub enum AdapterError {
    /// 源文本不存在或不可用（按条目终止，不再进入后续阶段）
    SourceNotFound {
        path: String,
    },
    /// 适配器返回了空结果
    EmptyResponse {
        stage: String,
    },
    /// 适配器 API 调用失败
    ApiCallFailed {
        stage: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 适配器响应解析失败
    ResponseParseFailed {
        stage: String,
        detail: String,
    },
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterError::SourceNotFound { path } => {
                write!(f, "源文本不存在或不可用: {}", path)
            }
            AdapterError::EmptyResponse { stage } => {
                write!(f, "阶段 {} 返回空结果", stage)
            }
            AdapterError::ApiCallFailed { stage, source } => {
                write!(f, "阶段 {} API调用失败: {}", stage, source)
            }
            AdapterError::ResponseParseFailed { stage, detail } => {
                write!(f, "阶段 {} 响应解析失败: {}", stage, detail)
            }
        }
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdapterError::ApiCallFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 产物生成错误
///
/// 产物按种类独立生成，单个种类失败只跳过该种类。
#[derive(Debug)]
pub enum ArtifactError {
    /// 产物写入失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 生成产物所需的输入缺失
    MissingInput {
        kind: String,
        detail: String,
    },
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::WriteFailed { path, source } => {
                write!(f, "产物写入失败 ({}): {}", path, source)
            }
            ArtifactError::MissingInput { kind, detail } => {
                write!(f, "产物 {} 缺少输入: {}", kind, detail)
            }
        }
    }
}

impl std::error::Error for ArtifactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArtifactError::WriteFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 上传/导出错误
///
/// 上传失败不致命：条目仍标记为完成，产物保留在本地。
#[derive(Debug)]
pub enum SinkError {
    /// 上传请求失败
    UploadFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 存储服务返回错误状态
    BadStatus {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },
    /// 本地产物文件读取失败
    LocalFileUnreadable {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::UploadFailed { endpoint, source } => {
                write!(f, "上传请求失败 ({}): {}", endpoint, source)
            }
            SinkError::BadStatus {
                endpoint,
                status,
                message,
            } => {
                write!(
                    f,
                    "存储服务返回错误状态 ({}): status={}, message={:?}",
                    endpoint, status, message
                )
            }
            SinkError::LocalFileUnreadable { path, source } => {
                write!(f, "产物文件读取失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::UploadFailed { source, .. }
            | SinkError::LocalFileUnreadable { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 文件不存在
    NotFound {
        path: String,
    },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 序列化失败
    TomlSerializeFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { path } => write!(f, "文件不存在: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::WriteFailed { path, source } => {
                write!(f, "写入文件失败 ({}): {}", path, source)
            }
            FileError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
            FileError::TomlSerializeFailed { source } => {
                write!(f, "TOML序列化失败: {}", source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. }
            | FileError::WriteFailed { source, .. }
            | FileError::TomlParseFailed { source, .. }
            | FileError::TomlSerializeFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 流水线入口点无效
    InvalidEntryPoint {
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
            ConfigError::InvalidEntryPoint { value } => {
                write!(f, "无效的流水线入口点: {}", value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        AppError::File(FileError::TomlSerializeFailed {
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Sink(SinkError::UploadFailed {
            endpoint: err.url().map(|u| u.to_string()).unwrap_or_default(),
            source: Box::new(err),
        })
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl From<AdapterError> for AppError {
    fn from(err: AdapterError) -> Self {
        AppError::Adapter(err)
    }
}

// ========== 便捷构造函数 ==========

impl AdapterError {
    /// 创建源文本缺失错误
    pub fn source_not_found(path: impl Into<String>) -> Self {
        AdapterError::SourceNotFound { path: path.into() }
    }

    /// 创建适配器 API 调用错误
    pub fn api_call_failed(stage: impl Into<String>, source: anyhow::Error) -> Self {
        AdapterError::ApiCallFailed {
            stage: stage.into(),
            source: source.into(),
        }
    }

    /// 创建适配器响应解析错误
    pub fn response_parse_failed(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        AdapterError::ResponseParseFailed {
            stage: stage.into(),
            detail: detail.into(),
        }
    }
}

impl LedgerError {
    /// 创建账本持久化错误
    pub fn persist_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LedgerError::PersistFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// 创建账本解析错误
    pub fn parse_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LedgerError::ParseFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

impl ArtifactError {
    /// 创建产物写入错误
    pub fn write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ArtifactError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
