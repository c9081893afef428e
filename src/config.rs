/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 数据目录（账本、候选文件、生成的产物都存放在这里）
    pub data_dir: String,
    /// 账本文件路径
    pub state_file: String,
    /// 批次数量
    pub num_batches: usize,
    /// 每批次的候选文章数量
    pub candidates_per_batch: usize,
    /// 检索主题（为空则表示"diversidad temática"，即不限主题）
    pub topic: Option<String>,
    /// 流水线入口点
    pub start_from: EntryPoint,
    /// 候选/预审批列表文件（validation / generation 入口使用）
    pub candidates_file: Option<String>,
    /// 反向处理批内文章
    ///
    /// 用于两个实例从同一批次的两端同时处理的手动分片。
    /// 条目之间没有锁或租约，碰撞概率低但不为零——这是尽力而为的
    /// 启发式，不是正确性保证。
    pub reverse_order: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 存储 API 配置 ---
    pub storage_api_base_url: String,
    pub storage_token: String,
}

/// 流水线入口点
///
/// 三个入口互斥，由配置选择：
/// - `Discovery`: 完整流水线（检索 → 法务审核 → 出题）
/// - `Validation`: 加载已有候选列表，跳过检索
/// - `Generation`: 加载已审批列表，跳过检索和审核
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Discovery,
    Validation,
    Generation,
}

impl EntryPoint {
    /// 尝试从字符串解析入口点
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discovery" | "full" => Some(EntryPoint::Discovery),
            "validation" => Some(EntryPoint::Validation),
            "generation" => Some(EntryPoint::Generation),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            state_file: "data/pipeline_state.toml".to_string(),
            num_batches: 1,
            candidates_per_batch: 30,
            topic: None,
            start_from: EntryPoint::Discovery,
            candidates_file: None,
            reverse_order: false,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            storage_api_base_url: "http://localhost:9870/api".to_string(),
            storage_token: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or(default.data_dir),
            state_file: std::env::var("STATE_FILE").unwrap_or(default.state_file),
            num_batches: std::env::var("NUM_BATCHES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.num_batches),
            candidates_per_batch: std::env::var("CANDIDATES_PER_BATCH").ok().and_then(|v| v.parse().ok()).unwrap_or(default.candidates_per_batch),
            topic: std::env::var("TOPIC").ok().filter(|v| !v.trim().is_empty()),
            start_from: std::env::var("START_FROM").ok().and_then(|v| EntryPoint::from_str(&v)).unwrap_or(default.start_from),
            candidates_file: std::env::var("CANDIDATES_FILE").ok().filter(|v| !v.trim().is_empty()),
            reverse_order: std::env::var("REVERSE_ORDER").ok().and_then(|v| v.parse().ok()).unwrap_or(default.reverse_order),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            storage_api_base_url: std::env::var("STORAGE_API_BASE_URL").unwrap_or(default.storage_api_base_url),
            storage_token: std::env::var("STORAGE_TOKEN").unwrap_or(default.storage_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_from_str() {
        assert_eq!(EntryPoint::from_str("discovery"), Some(EntryPoint::Discovery));
        assert_eq!(EntryPoint::from_str("FULL"), Some(EntryPoint::Discovery));
        assert_eq!(EntryPoint::from_str(" validation "), Some(EntryPoint::Validation));
        assert_eq!(EntryPoint::from_str("generation"), Some(EntryPoint::Generation));
        assert_eq!(EntryPoint::from_str("agent5"), None);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.num_batches, 1);
        assert_eq!(config.candidates_per_batch, 30);
        assert_eq!(config.start_from, EntryPoint::Discovery);
        assert!(!config.reverse_order);
    }
}
