use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub diff: DiffConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `SHAPEDIFF_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("SHAPEDIFF_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 命令行显式给出的路径优先于自动发现。
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => Self::discover(),
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 实体转几何的参数。
#[derive(Debug, Clone, Deserialize)]
pub struct ConversionConfig {
    /// 曲线展开的最大弦高。
    #[serde(default = "ConversionConfig::default_step_size")]
    pub step_size: f64,
    /// 坐标保留的小数位数。
    #[serde(default = "ConversionConfig::default_precision")]
    pub precision: u32,
    #[serde(default)]
    pub apply_transform: bool,
    /// 仿射系数 `[a, b, d, e, xoff, yoff]`。
    #[serde(default)]
    pub transform: Option<[f64; 6]>,
    #[serde(default = "ConversionConfig::default_degenerate_radius")]
    pub degenerate_radius: f64,
    #[serde(default = "ConversionConfig::default_degenerate_step")]
    pub degenerate_step: f64,
    #[serde(default = "ConversionConfig::default_max_block_depth")]
    pub max_block_depth: usize,
    #[serde(default)]
    pub fallbacks: FallbackConfig,
}

impl ConversionConfig {
    fn default_step_size() -> f64 {
        0.1
    }

    fn default_precision() -> u32 {
        10
    }

    fn default_degenerate_radius() -> f64 {
        0.1
    }

    fn default_degenerate_step() -> f64 {
        1e-6
    }

    fn default_max_block_depth() -> usize {
        64
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            step_size: Self::default_step_size(),
            precision: Self::default_precision(),
            apply_transform: false,
            transform: None,
            degenerate_radius: Self::default_degenerate_radius(),
            degenerate_step: Self::default_degenerate_step(),
            max_block_depth: Self::default_max_block_depth(),
            fallbacks: FallbackConfig::default(),
        }
    }
}

/// 转换失败后的回退层级开关。
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "FallbackConfig::enabled")]
    pub radius: bool,
    #[serde(default = "FallbackConfig::enabled")]
    pub flattening: bool,
    #[serde(default = "FallbackConfig::enabled")]
    pub vertices: bool,
}

impl FallbackConfig {
    fn enabled() -> bool {
        true
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            radius: true,
            flattening: true,
            vertices: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiffConfig {
    /// 比较前字段取整的小数位数。
    #[serde(default = "DiffConfig::default_precision")]
    pub precision: u32,
    #[serde(default = "DiffConfig::default_round_fields")]
    pub round_fields: bool,
    #[serde(default = "DiffConfig::default_sections")]
    pub sections: Vec<String>,
    /// 差异包络的膨胀距离。
    #[serde(default = "DiffConfig::default_dilation")]
    pub dilation: f64,
    /// 线与线求差时的缓冲宽度。
    #[serde(default = "DiffConfig::default_overlay_tolerance")]
    pub overlay_tolerance: f64,
    #[serde(default = "DiffConfig::default_strict_pairing")]
    pub strict_pairing: bool,
}

impl DiffConfig {
    fn default_precision() -> u32 {
        6
    }

    fn default_round_fields() -> bool {
        true
    }

    fn default_sections() -> Vec<String> {
        ["TABLES", "BLOCKS", "ENTITIES", "OBJECTS"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn default_dilation() -> f64 {
        10.0
    }

    fn default_overlay_tolerance() -> f64 {
        1e-4
    }

    fn default_strict_pairing() -> bool {
        true
    }

    /// 实际用于比较的取整精度；关闭取整时为 `None`。
    pub fn field_precision(&self) -> Option<u32> {
        self.round_fields.then_some(self.precision)
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            precision: Self::default_precision(),
            round_fields: Self::default_round_fields(),
            sections: Self::default_sections(),
            dilation: Self::default_dilation(),
            overlay_tolerance: Self::default_overlay_tolerance(),
            strict_pairing: Self::default_strict_pairing(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::discover().expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert!((cfg.conversion.step_size - 0.1).abs() < 1e-12);
        assert_eq!(cfg.conversion.precision, 10);
        assert!(!cfg.conversion.apply_transform);
        assert!(cfg.conversion.fallbacks.radius);
        assert_eq!(cfg.diff.field_precision(), Some(6));
        assert_eq!(cfg.diff.sections, ["TABLES", "BLOCKS", "ENTITIES", "OBJECTS"]);
        assert!(cfg.diff.strict_pairing);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [conversion]
            step_size = 0.5
            apply_transform = true
            transform = [2.0, 0.0, 0.0, 2.0, 100.0, 200.0]

            [conversion.fallbacks]
            vertices = false

            [diff]
            round_fields = false
            sections = ["ENTITIES"]
            strict_pairing = false
            "#
        )
        .unwrap();

        let cfg = AppConfig::load(Some(file.path())).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert!((cfg.conversion.step_size - 0.5).abs() < 1e-12);
        assert_eq!(cfg.conversion.precision, 10);
        assert_eq!(
            cfg.conversion.transform,
            Some([2.0, 0.0, 0.0, 2.0, 100.0, 200.0])
        );
        assert!(cfg.conversion.fallbacks.radius);
        assert!(!cfg.conversion.fallbacks.vertices);
        assert_eq!(cfg.diff.field_precision(), None);
        assert_eq!(cfg.diff.sections, ["ENTITIES"]);
        assert!((cfg.diff.dilation - 10.0).abs() < 1e-12);
        assert!(!cfg.diff.strict_pairing);
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[conversion]\nstep_size = \"fine\"").unwrap();
        match AppConfig::from_file(file.path()) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
