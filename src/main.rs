//! InkFlow - 章节生成命令行客户端
//!
//! 连接 InkFlow 后端，生成一章并在终端输出标题、正文与选项。

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use inkflow::application::generation::{GenerationFacade, GenerationView};
use inkflow::config::{load_config, load_config_from_path, print_config, AppConfig};
use inkflow::domain::generation::{GenerationRequest, GenerationStatus};
use inkflow::infrastructure::adapters::{GeneratedChapter, SseStreamTransport};

/// InkFlow chapter generator
#[derive(Parser, Debug)]
#[command(name = "inkflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 故事 ID
    story_id: String,

    /// 上一章节 ID（续写时必填）
    #[arg(long, value_name = "CHAPTER_ID", requires_all = ["choice_index", "choice_text"])]
    previous: Option<String>,

    /// 读者选择的选项索引
    #[arg(long, requires = "previous")]
    choice_index: Option<u32>,

    /// 读者选择的选项文本
    #[arg(long, requires = "previous")]
    choice_text: Option<String>,

    /// 使用非流式接口一次性生成
    #[arg(long)]
    no_stream: bool,

    /// 配置文件路径
    #[arg(short = 'c', long, env = "INKFLOW_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
}

/// 构造生成请求
fn build_request(cli: &Cli) -> anyhow::Result<GenerationRequest> {
    let request = match cli.previous.as_deref() {
        Some(previous) => GenerationRequest::continuation(
            &cli.story_id,
            previous,
            cli.choice_index,
            cli.choice_text.as_deref().unwrap_or_default(),
        )?,
        None => GenerationRequest::first(&cli.story_id)?,
    };
    Ok(request)
}

fn print_chapter(title: &str, content: &str, choices: &[&str], chapter_id: Option<&str>) {
    println!("\n# {}\n", title);
    println!("{}\n", content);
    for (index, choice) in choices.iter().enumerate() {
        println!("  [{}] {}", index, choice);
    }
    if let Some(chapter_id) = chapter_id {
        println!("\nchapter_id: {}", chapter_id);
    }
}

fn print_generated(generated: &GeneratedChapter) {
    let choices: Vec<&str> = generated.choices.iter().map(|c| c.text.as_str()).collect();
    print_chapter(
        generated.chapter.title.as_deref().unwrap_or_default(),
        generated.chapter.content.as_deref().unwrap_or_default(),
        &choices,
        generated.chapter.id.as_ref().map(|id| id.as_str()),
    );
}

fn init_tracing(config: &AppConfig) {
    let log_filter = format!("{},inkflow={}", config.log.level, config.log.level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = match &cli.config {
        Some(path) => load_config_from_path(Some(path.as_path())),
        None => load_config(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);
    tracing::info!("InkFlow - 章节生成客户端");
    print_config(&config);

    let transport = Arc::new(SseStreamTransport::new(config.api.transport_config())?);

    if cli.no_stream {
        let request = build_request(&cli)?;
        tracing::info!(story_id = %cli.story_id, "Generating chapter without streaming");
        let generated = transport
            .generate_chapter(&request)
            .await
            .map_err(|e| anyhow::anyhow!("Generation failed: {}", e))?;
        print_generated(&generated);
        return Ok(());
    }

    let facade = GenerationFacade::new(transport, config.generation.facade_config());

    if !facade.health_check().await {
        tracing::warn!(base_url = %config.api.base_url, "Story service health check failed");
    }

    // 进度日志
    let mut updates = facade.subscribe();
    let progress_task = tokio::spawn(async move {
        let mut last_progress = None;
        while updates.changed().await.is_ok() {
            let view = GenerationView::from_session(&updates.borrow_and_update().session);
            if last_progress != Some(view.progress_percentage) {
                last_progress = Some(view.progress_percentage);
                tracing::info!(
                    stage = %view.stage,
                    progress = view.progress_percentage,
                    "{}",
                    view.message
                );
            }
        }
    });

    let generation_id = match cli.previous.as_deref() {
        Some(previous) => {
            facade
                .continue_story(
                    &cli.story_id,
                    previous,
                    cli.choice_index,
                    cli.choice_text.as_deref().unwrap_or_default(),
                )
                .await?
        }
        None => facade.start_first_chapter(&cli.story_id).await?,
    };
    tracing::info!(generation_id = %generation_id, story_id = %cli.story_id, "Generation started");

    let outcome = tokio::select! {
        outcome = facade.wait_for_outcome() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            facade.stop();
            facade.snapshot()
        }
    };

    drop(facade);
    progress_task.abort();

    let session = &outcome.session;
    match session.status() {
        GenerationStatus::Complete => {
            let choices: Vec<&str> = session.choices().iter().map(|c| c.text.as_str()).collect();
            print_chapter(
                session.title(),
                session.content(),
                &choices,
                session.chapter_id().map(|id| id.as_str()),
            );
            Ok(())
        }
        GenerationStatus::Failed => match outcome.error() {
            Some(error) => Err(anyhow::anyhow!("Generation failed: {}", error)),
            None => Err(anyhow::anyhow!("Generation failed")),
        },
        status => {
            tracing::info!(status = ?status, "Generation stopped");
            Ok(())
        }
    }
}
