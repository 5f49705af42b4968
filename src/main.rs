//! pet-companion —— 在终端里和自己的虚拟宠物聊天
//!
//! ```bash
//! pet-companion --user alice --conversation /maps/city --pet-name Pip --pet-kind dragon
//! pet-companion --user alice --prompt "hi"
//! ```
//!
//! 模型通过 `COMPANION_MODEL_<ID>_{MODEL,BASEURL,APIKEY}` 环境变量配置（可放在 `.env` 中）。

use clap::Parser;
use pet_companion::agent::{ChatRequest, ChatResponse, Persona, ReplyOrchestrator};
use pet_companion::config::ContextConfig;
use pet_companion::error::{CompanionError, Result};
use pet_companion::llm::DefaultLlmClient;
use pet_companion::llm::config::Config;
use pet_companion::memory::{FileHistoryStore, FileProfileStore, FileSummaryStore};
use reqwest::Client;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pet-companion")]
#[command(about = "Chat with your virtual pet")]
struct Args {
    /// 用户 id
    #[arg(long, env = "COMPANION_USER")]
    user: String,

    /// 会话 id（页面路径，如 /maps/city）
    #[arg(long, default_value = "/my-pets")]
    conversation: String,

    #[arg(long)]
    pet_name: Option<String>,

    #[arg(long)]
    pet_kind: Option<String>,

    /// 历史 / 摘要 / 用户资料文件所在目录
    #[arg(long, default_value = "~/.pet-companion")]
    data_dir: PathBuf,

    /// 模型 id，对应 COMPANION_MODEL_<ID>_* 环境变量
    #[arg(long, env = "COMPANION_MODEL", default_value = "default")]
    model: String,

    /// 上下文策略 YAML；未指定时从环境变量读取
    #[arg(long)]
    config: Option<String>,

    /// 只发送一条消息并退出
    #[arg(long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pet_companion=info")),
        )
        .init();

    let args = Args::parse();

    let context_config = match &args.config {
        Some(path) => ContextConfig::load(path)?,
        None => ContextConfig::from_env()?,
    };
    let model = Config::from_env()?.get_model(&args.model)?;
    let llm = Arc::new(DefaultLlmClient::new(Arc::new(Client::new()), model));

    let mut persona = Persona::default();
    if let Some(name) = &args.pet_name {
        persona = persona.name(name);
    }
    if let Some(kind) = &args.pet_kind {
        persona = persona.kind(kind);
    }

    let orchestrator = ReplyOrchestrator::builder(context_config)
        .history(Arc::new(FileHistoryStore::new(args.data_dir.join("history.json"))?))
        .summaries(Arc::new(FileSummaryStore::new(args.data_dir.join("summaries.json"))?))
        .profiles(Arc::new(FileProfileStore::new(args.data_dir.join("profiles.json"))?))
        .generator(llm)
        .persona(persona)
        .build()?;

    if let Some(prompt) = &args.prompt {
        let request = ChatRequest::new(prompt, &args.conversation, &args.user);
        print_response(orchestrator.handle_as(&args.user, &request).await);
        return Ok(());
    }

    run_repl(&orchestrator, &args).await
}

fn print_response(response: ChatResponse) {
    match response {
        ChatResponse::Reply { reply } => println!("🐾 {reply}"),
        ChatResponse::Error { error, category } => eprintln!("❌ [{category:?}] {error}"),
    }
}

async fn run_repl(orchestrator: &ReplyOrchestrator, args: &Args) -> Result<()> {
    let mut editor = DefaultEditor::new().map_err(readline_error)?;

    println!("Chatting on {} (/reset, /summary, /quit)", args.conversation);
    println!();

    loop {
        match editor.readline(">>> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                editor.add_history_entry(trimmed).map_err(readline_error)?;

                match trimmed {
                    "/quit" | "/exit" => break,
                    "/reset" => {
                        orchestrator.reset(&args.user, &args.conversation).await?;
                        println!("🔄 conversation cleared");
                    }
                    "/summary" => {
                        match orchestrator
                            .current_summary(&args.user, &args.conversation)
                            .await?
                        {
                            Some(summary) => println!(
                                "📝 (up to turn {}) {}",
                                summary.cutpoint_sequence, summary.text
                            ),
                            None => println!("📝 no summary yet"),
                        }
                    }
                    prompt => {
                        let request = ChatRequest::new(prompt, &args.conversation, &args.user);
                        print_response(orchestrator.handle_as(&args.user, &request).await);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(readline_error(err)),
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn readline_error(err: ReadlineError) -> CompanionError {
    CompanionError::Other(format!("readline: {err}"))
}
