use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use boxforge::profile::{self, AppSettings};

#[derive(Parser)]
#[command(name = "boxforge", about = "订阅编译与路由配置归一化", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 把订阅文本编译成 sing-box 配置
    Convert {
        /// 订阅文件路径
        input: PathBuf,
        /// 输出路径，缺省打到 stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 对已有配置做幂等迁移，无变更不回写
    Normalize {
        file: PathBuf,
    },
    /// 把设置文件投影到配置上
    ApplySettings {
        file: PathBuf,
        /// 设置文件（kebab-case JSON），缺省用默认设置
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Convert { input, output } => {
            let text = fs::read_to_string(&input)
                .with_context(|| format!("read {}", input.display()))?;
            let conversion = boxforge::convert(&text)?;
            for diag in &conversion.diags.items {
                warn!("{diag}");
            }
            let encoded = profile::encode_json(&conversion.profile)?;
            match output {
                Some(path) => {
                    fs::write(&path, encoded)
                        .with_context(|| format!("write {}", path.display()))?;
                    info!(path = %path.display(), "config written");
                }
                None => println!("{encoded}"),
            }
        }
        Command::Normalize { file } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let outcome = profile::normalize_text(&text);
            if outcome.changed {
                fs::write(&file, outcome.text.as_ref())
                    .with_context(|| format!("write {}", file.display()))?;
                info!(path = %file.display(), "config migrated");
            } else {
                info!(path = %file.display(), "config already normalized");
            }
        }
        Command::ApplySettings { file, settings } => {
            let app_settings = match settings {
                Some(path) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("read {}", path.display()))?;
                    serde_json::from_str::<AppSettings>(&raw)
                        .with_context(|| format!("parse {}", path.display()))?
                }
                None => AppSettings::default(),
            };
            let text = fs::read_to_string(&file)
                .with_context(|| format!("read {}", file.display()))?;
            match profile::apply_text(&text, &app_settings) {
                Some(updated) => {
                    fs::write(&file, updated)
                        .with_context(|| format!("write {}", file.display()))?;
                    info!(path = %file.display(), "settings applied");
                }
                None => anyhow::bail!("{} is not a valid config document", file.display()),
            }
        }
    }

    Ok(())
}
