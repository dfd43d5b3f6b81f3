use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use shapediff_config::{AppConfig, ConfigError};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod pipeline;

/// DXF 实体转平面几何，并比较两个图纸版本的差异。
#[derive(Debug, Parser)]
#[command(name = "shapediff", version)]
struct Cli {
    /// 配置文件路径；缺省时按 SHAPEDIFF_CONFIG 与 ./config/default.toml 查找。
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 解析模型空间并按图层汇总几何。
    Convert {
        file: PathBuf,
        /// 导出行写入的 JSON 文件。
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// 比较两个版本：段级字段差异与实体几何差异。
    Diff {
        old: PathBuf,
        new: PathBuf,
        #[arg(long)]
        json: Option<PathBuf>,
        /// 比较全部已知段的原始记录，不计算几何。
        #[arg(long)]
        raw: bool,
    },
    /// 输出被模型空间插入的块及其插入点。
    Blocks {
        file: PathBuf,
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let (config, failure) = load_configuration(cli.config.as_deref());
    init_logging(&config);
    if let Some(err) = &failure {
        report_config_failure(err);
    }
    info!("启动 shapediff");

    let result = match &cli.command {
        Command::Convert { file, json } => pipeline::convert(file, json.as_deref(), &config),
        Command::Diff {
            old,
            new,
            json,
            raw,
        } => pipeline::diff(old, new, json.as_deref(), *raw, &config),
        Command::Blocks { file, json } => pipeline::blocks(file, json.as_deref(), &config),
    };
    if let Err(err) = result {
        error!(error = %format!("{err:#}"), "执行失败");
        std::process::exit(1);
    }
}

/// 加载配置；失败时返回内建默认值与错误，待日志初始化后再报告。
fn load_configuration(override_path: Option<&Path>) -> (AppConfig, Option<ConfigError>) {
    match AppConfig::load(override_path) {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn report_config_failure(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
        }
        ConfigError::Context { .. } => {
            warn!(error = %err, "加载配置失败，使用内建默认值");
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
