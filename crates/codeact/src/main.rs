//! A simple program demonstrates how to use `codeact` as a library.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::pin::pin;
use std::time::Duration;

use codeact::Settings;
use codeact::core::conversation::{Item, Role};
use codeact::core::{CodeAgentBuilder, Reply};
use codeact::tools::{ReadTextFileTool, WeatherTool, WebSearchTool};
use codeact_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };

    let config = OpenAIConfigBuilder::with_api_key(settings.api_key)
        .with_base_url(settings.base_url)
        .with_model(settings.model)
        .build();
    let model_provider = OpenAIProvider::new(config);

    let (item_tx, mut item_rx) = mpsc::unbounded_channel::<Item>();

    let root = env::current_dir().unwrap_or_default();
    let mut builder = CodeAgentBuilder::with_model_provider(model_provider)
        .with_tool(WeatherTool::new())
        .with_tool(WebSearchTool::default())
        .with_tool(ReadTextFileTool::new(root))
        .with_additional_authorized_imports(settings.authorized_imports)
        .with_verbose(settings.verbose)
        .on_transcript(move |item| {
            item_tx.send(item.clone()).ok();
        });
    if let Some(max_iters) = settings.max_iters {
        builder = builder.with_max_iters(max_iters);
    }
    let mut agent = builder.build();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line == "exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let mut reply = pin!(agent.reply(line));
        let mut progress_bar = None;

        let result = loop {
            // Create a new progress bar if it has been finished.
            progress_bar
                .get_or_insert_with(|| {
                    let progress_bar = ProgressBar::new_spinner();
                    progress_bar.set_style(progress_style.clone());
                    progress_bar.set_message("🤔 Thinking...");
                    progress_bar
                })
                .inc(1);

            select! {
                biased;
                Some(item) = item_rx.recv() => {
                    // Finish the progress bar before printing anything else.
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    print_item(&item);
                }
                result = &mut reply => {
                    break result;
                }
                _ = sleep(Duration::from_millis(100)) => {}
            }
        };

        if let Some(progress_bar) = progress_bar.take() {
            progress_bar.finish_and_clear();
        }
        while let Ok(item) = item_rx.try_recv() {
            print_item(&item);
        }

        match result {
            Ok(reply) => print_reply(&reply),
            Err(err) => {
                error!("reply failed: {err}");
                println!("{}❌ {}", BAR_CHAR.bright_red(), err.bright_red());
            }
        }
    }
}

fn print_item(item: &Item) {
    match item.role() {
        Role::Assistant => {
            println!("{}🤖 {}", BAR_CHAR.bright_cyan(), item.content().bright_white());
        }
        Role::User if item.name() != "user" => {
            println!("{}{}", BAR_CHAR.bright_black(), item.content().dimmed());
        }
        Role::System => {
            println!("{}⚠️  {}", BAR_CHAR.bright_yellow(), item.content());
        }
        Role::User => {}
    }
}

fn print_reply(reply: &Reply) {
    // The summary of an exhausted reply has been printed as a transcript.
    if reply.exhausted {
        return;
    }
    println!(
        "{}✅ {}: {}",
        BAR_CHAR.bright_green(),
        reply.name.bold(),
        reply.content.bright_white()
    );
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
