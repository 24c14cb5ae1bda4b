//! socio-shield 命令行入口
//!
//! 读取本地文件或抓取 URL，运行一次完整的审核管道，输出处理后的 HTML。

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use socio_shield::env::{core::LogLevel, EnvVar};
use socio_shield::moderation::config::{ConfigManager, ModerationConfig};
use socio_shield::moderation::core::{HeuristicClassifier, LayeredClassifier, OfflineClassifier};
use socio_shield::moderation::pipeline::Document;
use socio_shield::moderation::storage::{MemoryStore, RedbStore, SettingsStore};
use socio_shield::moderation::{ModerationPipeline, ModerationResult};
use socio_shield::parsers::html::dom;

/// Socio Shield CLI.
#[derive(Parser)]
#[command(name = "socio-shield")]
#[command(about = "Scan a web page, classify its text and images, and redact what is flagged")]
#[command(version)]
struct Cli {
    /// HTML file path or http(s) URL
    input: String,

    /// Analysis backend base URL
    #[arg(short, long)]
    backend: Option<String>,

    /// Write the moderated document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// On-disk settings store (redb file)
    #[arg(long)]
    store: Option<String>,

    /// Items per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Do not fall back to local image heuristics when the backend fails
    #[arg(long)]
    no_image_fallback: bool,

    /// Never contact the backend; only local heuristics apply
    #[arg(long)]
    offline: bool,

    /// Print the filter history as JSON after processing
    #[arg(long)]
    history: bool,

    /// Print the status report as JSON after processing
    #[arg(long)]
    status: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("处理失败: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = match std::env::var(LogLevel::NAME) {
        Ok(_) => EnvFilter::new(LogLevel::get_or_default("info".to_string())),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run(cli: Cli) -> ModerationResult<()> {
    let config = build_config(&cli)?;
    let input = read_input(&cli.input, &config).await?;
    let encoding = dom::detect_encoding(&input.data, input.charset.as_deref());
    tracing::debug!("文档编码: {}", encoding);
    let document = Document::from_bytes(&input.data, &encoding, input.url.as_deref());

    let pipeline = if cli.offline {
        let classifier = LayeredClassifier::new(
            HeuristicClassifier::from_config(&config)?,
            Box::new(OfflineClassifier),
            true,
        );
        let store: Box<dyn SettingsStore> = match &config.store_path {
            Some(path) => Box::new(RedbStore::open(shellexpand::tilde(path).into_owned())?),
            None => Box::new(MemoryStore::new()),
        };
        ModerationPipeline::new(config, document, Box::new(classifier), store)
    } else {
        let pipeline = ModerationPipeline::from_config(config, document)?;
        pipeline.check_backend().await;
        pipeline
    };

    let scan = pipeline.scan();
    tracing::info!(
        "扫描完成: 访问 {} 个元素，入队文本 {}，图片 {}",
        scan.visited,
        scan.text_enqueued,
        scan.images_enqueued
    );

    let drained = pipeline.drain().await;
    tracing::info!(
        "处理完成: {} 个批次，修改 {}，失败 {}",
        drained.batches,
        drained.redacted,
        drained.failed
    );

    let html = pipeline.document().serialize(&encoding)?;
    match &cli.output {
        Some(path) => fs::write(path, &html)?,
        None => io::stdout().write_all(&html)?,
    }

    if cli.history {
        println!("{}", serde_json::to_string_pretty(&pipeline.history())?);
    }
    if cli.status {
        println!("{}", serde_json::to_string_pretty(&pipeline.status())?);
    }

    Ok(())
}

fn build_config(cli: &Cli) -> ModerationResult<ModerationConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };

    let mut config = manager.config_with_backend(cli.backend.as_deref());
    if let Some(store) = &cli.store {
        config.store_path = Some(store.clone());
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if cli.no_image_fallback {
        config.image_fallback = false;
    }

    config.validate()?;
    Ok(config)
}

/// 读取到的输入
struct PageInput {
    data: Vec<u8>,
    url: Option<String>,
    /// 响应头声明的字符集
    charset: Option<String>,
}

/// 读取本地文件或抓取 URL
async fn read_input(input: &str, config: &ModerationConfig) -> ModerationResult<PageInput> {
    if input.starts_with("http://") || input.starts_with("https://") {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let response = client.get(input).send().await?.error_for_status()?;
        let final_url = response.url().to_string();
        let charset = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(dom::charset_from_content_type);
        let bytes = response.bytes().await?;
        tracing::debug!("已抓取 {} ({} 字节)", final_url, bytes.len());
        Ok(PageInput {
            data: bytes.to_vec(),
            url: Some(final_url),
            charset,
        })
    } else {
        let path = PathBuf::from(input);
        let data = fs::read(&path)?;
        let url = fs::canonicalize(&path)
            .ok()
            .and_then(|absolute| url::Url::from_file_path(absolute).ok())
            .map(|url| url.to_string());
        Ok(PageInput {
            data,
            url,
            charset: None,
        })
    }
}
