//! 日志系统
//!
//! 基于 tracing 生态初始化宿主日志：
//!
//! - 级别过滤（`RUST_LOG` 优先，其次是配置）
//! - 控制台输出（Pretty 或 JSON）
//! - 按时间轮转的文件输出（异步非阻塞）
//!
//! 模块级日志归属由每个模块执行上下文中的 span 提供（`module = 名称`），
//! 不需要为每个模块单独创建日志器。
//!
//! # 示例
//!
//! ```rust,no_run
//! use chips_plugin_host::utils::logger::{Logger, LoggerConfig, RotationStrategy};
//!
//! let config = LoggerConfig::builder()
//!     .level("debug")
//!     .file_output("./logs")
//!     .rotation(RotationStrategy::Hourly)
//!     .build();
//!
//! let _guard = Logger::try_init(config);
//! tracing::info!(module = "WorldEdit", "模块已加载");
//! ```

use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::core::config::LogConfig;
use crate::utils::{PluginError, Result};

/// 默认日志文件名前缀
const DEFAULT_FILE_PREFIX: &str = "chips-plugin-host";

// ============================================================================
// 日志轮转策略
// ============================================================================

/// 日志轮转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// 不轮转（单个日志文件）
    Never,
    /// 每小时轮转
    Hourly,
    /// 每天轮转（默认）
    #[default]
    Daily,
}

impl RotationStrategy {
    fn to_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }
}

impl FromStr for RotationStrategy {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "never" | "none" => Ok(RotationStrategy::Never),
            "hourly" | "hour" => Ok(RotationStrategy::Hourly),
            "daily" | "day" => Ok(RotationStrategy::Daily),
            other => Err(PluginError::InvalidConfigValue {
                key: "logging.rotation".to_string(),
                reason: format!("未知的轮转策略 '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationStrategy::Never => write!(f, "never"),
            RotationStrategy::Hourly => write!(f, "hourly"),
            RotationStrategy::Daily => write!(f, "daily"),
        }
    }
}

// ============================================================================
// 日志配置
// ============================================================================

/// 日志系统配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 默认日志级别
    pub level: String,

    /// 是否使用 JSON 格式输出
    pub json_format: bool,

    /// 是否输出到控制台
    pub console_output: bool,

    /// 文件输出目录（None 表示不输出到文件）
    pub file_output: Option<PathBuf>,

    /// 日志文件名前缀
    pub file_prefix: String,

    /// 日志轮转策略
    pub rotation: RotationStrategy,

    /// 是否显示目标模块
    pub show_target: bool,

    /// 是否显示线程 ID
    pub show_thread_ids: bool,

    /// 是否显示文件名和行号
    pub show_file_line: bool,

    /// 自定义过滤指令（EnvFilter 格式，逗号分隔）
    /// 例如："chips_plugin_host::module=debug"
    pub filter_directives: Option<String>,

    /// 是否启用 ANSI 颜色（仅控制台）
    pub ansi_colors: bool,

    /// 是否在 span 关闭时输出事件（可用于观察模块钩子耗时）
    pub span_close_events: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            rotation: RotationStrategy::Daily,
            show_target: true,
            show_thread_ids: false,
            show_file_line: false,
            filter_directives: None,
            ansi_colors: true,
            span_close_events: false,
        }
    }
}

impl LoggerConfig {
    /// 创建配置构建器
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::new()
    }

    /// 从宿主配置的 LogConfig 创建
    ///
    /// 无法识别的轮转策略回退为每天轮转。
    pub fn from_log_config(log_config: &LogConfig) -> Self {
        Self {
            level: log_config.level.clone(),
            json_format: log_config.json_format,
            file_output: if log_config.file_output {
                log_config.log_dir.clone()
            } else {
                None
            },
            rotation: log_config.rotation.parse().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// 日志配置构建器
#[derive(Debug, Default)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl LoggerConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置日志级别
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// 启用 JSON 格式输出
    pub fn json_format(mut self, enable: bool) -> Self {
        self.config.json_format = enable;
        self
    }

    /// 设置控制台输出
    pub fn console_output(mut self, enable: bool) -> Self {
        self.config.console_output = enable;
        self
    }

    /// 设置文件输出目录
    pub fn file_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.file_output = Some(dir.into());
        self
    }

    /// 设置日志文件前缀
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    /// 设置轮转策略
    pub fn rotation(mut self, strategy: RotationStrategy) -> Self {
        self.config.rotation = strategy;
        self
    }

    /// 显示线程 ID
    pub fn show_thread_ids(mut self, enable: bool) -> Self {
        self.config.show_thread_ids = enable;
        self
    }

    /// 显示文件名和行号
    pub fn show_file_line(mut self, enable: bool) -> Self {
        self.config.show_file_line = enable;
        self
    }

    /// 设置过滤指令
    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.config.filter_directives = Some(directives.into());
        self
    }

    /// 启用 ANSI 颜色
    pub fn ansi_colors(mut self, enable: bool) -> Self {
        self.config.ansi_colors = enable;
        self
    }

    /// 输出 span 关闭事件
    pub fn span_close_events(mut self, enable: bool) -> Self {
        self.config.span_close_events = enable;
        self
    }

    /// 构建配置
    pub fn build(self) -> LoggerConfig {
        self.config
    }
}

// ============================================================================
// 日志守卫
// ============================================================================

/// 日志系统守卫
///
/// 持有非阻塞写入器的 WorkerGuard；丢弃时刷新所有挂起的日志。
/// 必须保持存活直到宿主退出。
#[derive(Default)]
pub struct LogGuard {
    guards: Vec<WorkerGuard>,
}

impl LogGuard {
    /// 持有的写入器数量
    pub fn writers(&self) -> usize {
        self.guards.len()
    }
}

// ============================================================================
// 日志系统
// ============================================================================

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// 日志系统
pub struct Logger;

impl Logger {
    /// 初始化日志系统
    ///
    /// # Errors
    ///
    /// 日志系统已初始化（或已有其他全局订阅者）时返回 `InitFailed`
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if LOGGER_INITIALIZED.get().is_some() {
            return Err(PluginError::InitFailed(
                "日志系统已初始化，不能重复初始化".to_string(),
            ));
        }

        let env_filter = Self::create_env_filter(&config);
        let mut guard = LogGuard::default();

        let mut layers: Vec<BoxedLayer> = Vec::new();

        if config.console_output {
            let (writer, console_guard) = tracing_appender::non_blocking(io::stdout());
            guard.guards.push(console_guard);
            layers.push(Self::format_layer(&config, writer, config.ansi_colors));
        }

        if let Some(ref log_dir) = config.file_output {
            let appender = RollingFileAppender::new(
                config.rotation.to_rotation(),
                log_dir,
                format!("{}.log", config.file_prefix),
            );
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard.guards.push(file_guard);
            layers.push(Self::format_layer(&config, writer, false));
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layers)
            .try_init()
            .map_err(|e| PluginError::InitFailed(format!("日志系统初始化失败: {}", e)))?;

        let _ = LOGGER_INITIALIZED.set(());
        Ok(guard)
    }

    /// 尝试初始化日志系统（不会失败）
    ///
    /// 已初始化时返回空守卫，适用于测试或多次初始化的场景。
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_default()
    }

    /// 使用宿主配置初始化
    pub fn init_from(log_config: &LogConfig) -> Result<LogGuard> {
        Self::init(LoggerConfig::from_log_config(log_config))
    }

    /// 创建 EnvFilter
    ///
    /// 无法解析的过滤指令被忽略。
    fn create_env_filter(config: &LoggerConfig) -> EnvFilter {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.level));

        match config.filter_directives {
            Some(ref directives) => directives
                .split(',')
                .filter_map(|d| d.trim().parse().ok())
                .fold(filter, |f, directive| f.add_directive(directive)),
            None => filter,
        }
    }

    fn format_layer<W>(config: &LoggerConfig, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let span_events = if config.span_close_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_span_events(span_events);

        if config.json_format {
            layer.json().with_ansi(false).boxed()
        } else {
            layer.with_ansi(ansi).boxed()
        }
    }
}

/// 标准日志字段名称
pub mod fields {
    /// 模块名
    pub const MODULE: &str = "module";
    /// 失败分类
    pub const KIND: &str = "kind";
    /// 生命周期状态
    pub const STATE: &str = "state";
    /// 事件类型
    pub const EVENT_TYPE: &str = "event_type";
    /// 事件 ID
    pub const EVENT_ID: &str = "event_id";
    /// 错误描述
    pub const ERROR: &str = "error";
}
