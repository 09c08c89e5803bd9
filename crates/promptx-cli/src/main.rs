use anyhow::{Context, Result};
use clap::Parser;
use cliclack::spinner;
use console::style;
use rustyline::error::ReadlineError;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use promptx::models::message::Message;
use promptx::plugins::configs::{OpenAiTextConfig, PluginConfig, OPENAI_HOST};
use promptx::plugins::openai::OpenAiTextPlugin;
use promptx::prompt::Prompt;
use promptx::templates::tera::TeraTemplate;

const INSTRUCTIONS: &str = "You are the assistant of a smart home with a single light.
Use the functions you are given to check or change the state of the light.
Keep your answers short.";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// OpenAI API Key (can also be set via OPENAI_API_KEY environment variable)
    #[arg(long)]
    api_key: Option<String>,

    /// API host, any OpenAI compatible server works (can also be set via OPENAI_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Model to use (can also be set via OPENAI_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Stream the reply as it is generated
    #[arg(short, long)]
    stream: bool,

    /// Load the instructions from a Tera template file
    #[arg(short, long)]
    template: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = text_config(&cli)?;
    let template = match &cli.template {
        Some(path) => TeraTemplate::from_file(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?,
        None => TeraTemplate::new(INSTRUCTIONS),
    };

    let light = Arc::new(AtomicBool::new(false));
    let prompt = lights(light.clone())
        .template(template)
        .plugin(OpenAiTextPlugin::new(config)?)
        .build();
    info!(prompt = %prompt.path(), "lights sample ready");

    println!(
        "Lights sample {}",
        style("- type \"exit\" to end the session, \"/history\" to show the conversation").dim()
    );
    println!();

    let mut editor = rustyline::DefaultEditor::new()?;
    loop {
        let line = match editor.readline("lights> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        match line {
            "exit" | "/exit" => break,
            "/history" => print_history(&prompt.history().await),
            "/clear" => {
                prompt.clear_history().await;
                println!("{}", style("history cleared").dim());
            }
            _ if cli.stream => {
                let mut on_chunk = |chunk: &str| {
                    print!("{chunk}");
                    io::stdout().flush().ok();
                };
                match prompt.text(line, Some(&mut on_chunk)).await {
                    Ok(_) => println!("\n"),
                    Err(e) => eprintln!("\n{} {e:#}", style("error:").red()),
                }
            }
            _ => {
                let spin = spinner();
                spin.start("awaiting reply");
                let reply = prompt.text(line, None).await;
                spin.stop("");
                match reply {
                    Ok(text) => println!("{text}\n"),
                    Err(e) => eprintln!("{} {e:#}", style("error:").red()),
                }
            }
        }
    }

    let state = if light.load(Ordering::SeqCst) { "on" } else { "off" };
    println!("{}", style(format!("The light is {state}. Bye!")).dim());
    Ok(())
}

fn lights(light: Arc<AtomicBool>) -> promptx::prompt::PromptBuilder {
    let on = light.clone();
    let off = light.clone();
    Prompt::builder("lights")
        .function("lights_on", "Turn the lights on", None, move |_| {
            let on = on.clone();
            async move {
                on.store(true, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
        .function("lights_off", "Turn the lights off", None, move |_| {
            let off = off.clone();
            async move {
                off.store(false, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
        .function(
            "get_light_status",
            "Get the light status, true when the light is on",
            None,
            move |_| {
                let light = light.clone();
                async move { anyhow::Ok(light.load(Ordering::SeqCst)) }
            },
        )
}

fn text_config(cli: &Cli) -> Result<OpenAiTextConfig> {
    let api_key = cli
        .api_key
        .clone()
        .or(OpenAiTextConfig::get_env("OPENAI_API_KEY", false, None)?)
        .context("API key must be provided via --api-key or OPENAI_API_KEY environment variable")?;
    let host = cli
        .host
        .clone()
        .or(OpenAiTextConfig::get_env("OPENAI_HOST", false, None)?)
        .unwrap_or_else(|| OPENAI_HOST.to_string());
    let model = cli
        .model
        .clone()
        .or(OpenAiTextConfig::get_env("OPENAI_MODEL", false, None)?)
        .unwrap_or_else(|| "gpt-4o".to_string());
    let stream = cli.stream
        || OpenAiTextConfig::get_env("OPENAI_STREAM", false, None)?
            .is_some_and(|s| s.eq_ignore_ascii_case("true"));

    let mut config = OpenAiTextConfig::new(host, api_key, model).with_stream(stream);
    if let Some(temperature) = OpenAiTextConfig::get_env("OPENAI_TEMPERATURE", false, None)? {
        config = config.with_temperature(
            temperature
                .parse()
                .context("OPENAI_TEMPERATURE must be a number")?,
        );
    }
    Ok(config)
}

fn print_history(history: &[Message]) {
    for message in history {
        let role = style(message.role().to_string()).bold();
        match message {
            Message::Model { function_calls, .. } if !function_calls.is_empty() => {
                for call in function_calls {
                    println!("{role}: {}({}) [{}]", call.name, call.arguments, call.id);
                }
            }
            Message::Function { function_id, .. } => {
                println!(
                    "{role}: {} [{function_id}]",
                    message.text().unwrap_or_default()
                );
            }
            _ => println!("{role}: {}", message.text().unwrap_or_default()),
        }
    }
    println!();
}
