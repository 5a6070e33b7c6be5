mod command;
mod helper;

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, bail};
use clap::Parser;
use colored::Colorize;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gemchat_application::{AppContext, PendingInput, SendOutcome};
use gemchat_core::conversation::{ConversationStore, GenerationSetting, Message, Sender};
use gemchat_core::credentials::{KNOWN_MODELS, display_model_name};
use gemchat_infrastructure::{ConfigService, GemchatPaths};
use gemchat_interaction::attachment_from_path;

use crate::command::{Command, HELP};
use crate::helper::CliHelper;

type Repl = Editor<CliHelper, DefaultHistory>;

/// gemchat - chat with Gemini models from the terminal
#[derive(Parser, Debug)]
#[command(name = "gemchat")]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory for config.toml, stored data and logs
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug)
    #[arg(short = 'd', long)]
    debug: bool,

    /// Enable trace logging
    #[arg(short, long)]
    verbose: bool,
}

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let paths = GemchatPaths::resolve(args.config_dir.clone())?;
    init_logging(&paths, &args)?;

    let config = ConfigService::new(paths.config_file()).load();
    let mut ctx = AppContext::from_paths(&paths, config);

    let mut rl: Repl = Editor::new()?;
    rl.set_helper(Some(CliHelper));

    println!("{}", "=== gemchat ===".bright_magenta().bold());
    println!("{}", "Type /help for commands, or 'quit' to exit.".bright_black());
    println!();

    if !ctx.start().await.is_ready() && !run_setup(&mut rl, &mut ctx).await? {
        return Ok(());
    }
    print_session(&ctx).await?;

    let mut draft = PendingInput::default();

    loop {
        let prompt = prompt_for(&ctx, &draft).await;
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                let command = match command::parse(trimmed) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{}", e.to_string().red());
                        continue;
                    }
                };

                match handle(command, &mut ctx, &mut draft, &mut rl).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => {
                        println!("{}", "Goodbye!".bright_green());
                        break;
                    }
                    Err(e) => eprintln!("{}", format!("Error: {e}").red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {err:?}").red());
                break;
            }
        }
    }

    Ok(())
}

/// Logs go to `logs/gemchat.log` so they never interleave with the chat.
fn init_logging(paths: &GemchatPaths, args: &Args) -> Result<()> {
    let default_filter = if args.verbose {
        "trace"
    } else if args.debug {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    std::fs::create_dir_all(paths.logs_dir())?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_file())?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    tracing::info!("[gemchat] Starting with config dir {}", paths.config_dir().display());
    Ok(())
}

/// Prompts until setup succeeds. Returns false when the user gives up.
async fn run_setup(rl: &mut Repl, ctx: &mut AppContext) -> Result<bool> {
    println!("{}", "Setup: enter your Gemini API key and default model.".bright_yellow());
    println!("{}", format!("Known models: {}", KNOWN_MODELS.join(", ")).bright_black());
    let default_model = ctx.config().model.default_model.clone();

    loop {
        let api_key = match read_setup_line(rl, "API key: ", "")? {
            Some(key) => key,
            None => return Ok(false),
        };
        let model = match read_setup_line(rl, "Model: ", &default_model)? {
            Some(model) => model,
            None => return Ok(false),
        };

        match ctx.complete_setup(&api_key, &model).await {
            Ok(()) => {
                println!("{}", format!("Ready: {}", model.trim()).bright_green());
                return Ok(true);
            }
            Err(e) if e.is_validation() => eprintln!("{}", e.to_string().yellow()),
            Err(e) => eprintln!("{}", format!("Setup failed: {e}").red()),
        }
    }
}

fn read_setup_line(rl: &mut Repl, prompt: &str, initial: &str) -> Result<Option<String>> {
    match rl.readline_with_initial(prompt, (initial, "")) {
        Ok(line) => Ok(Some(line)),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn prompt_for(ctx: &AppContext, draft: &PendingInput) -> String {
    let name = match ctx.store() {
        Ok(store) => store
            .lock()
            .await
            .active()
            .map(|c| c.name.clone())
            .unwrap_or_default(),
        Err(_) => "setup".to_string(),
    };

    let attachment = match &draft.image {
        Some(image) if draft.multimodal => format!(" +{}", image.file_name()),
        Some(image) => format!(" ({} as text)", image.file_name()),
        None => String::new(),
    };
    format!("[{name}{attachment}] >> ")
}

async fn handle(
    command: Command,
    ctx: &mut AppContext,
    draft: &mut PendingInput,
    rl: &mut Repl,
) -> Result<Flow> {
    match command {
        Command::Message(text) => {
            draft.text = text;
            send_draft(ctx, draft).await?;
        }
        Command::Send => {
            if draft.is_empty() {
                println!("{}", "Nothing to send. Type a message or attach an image.".yellow());
            } else {
                send_draft(ctx, draft).await?;
            }
        }
        Command::New(name) => {
            let id = ctx.new_conversation(name).await?;
            draft.clear();
            println!("{}", format!("Created {id}").bright_black());
        }
        Command::List => {
            let store = ctx.store()?;
            let store = store.lock().await;
            for (i, conversation) in store.conversations().enumerate() {
                let marker = if conversation.id == store.active_id() { "*" } else { " " };
                println!(
                    "{} {}. {} ({} messages) {}",
                    marker,
                    i + 1,
                    conversation.name,
                    conversation.history.len(),
                    conversation.id.bright_black()
                );
            }
        }
        Command::Switch(reference) => {
            let store = ctx.store()?;
            let mut store = store.lock().await;
            let id = resolve(&store, &reference)?;
            store.set_active(&id).await?;
            draft.clear();
            drop(store);
            print_session(ctx).await?;
        }
        Command::Rename(name) => {
            let store = ctx.store()?;
            let mut store = store.lock().await;
            let id = store.active_id().to_string();
            store.rename(&id, &name).await?;
        }
        Command::Delete(reference) => {
            let store = ctx.store()?;
            let mut store = store.lock().await;
            let id = match reference {
                Some(reference) => resolve(&store, &reference)?,
                None => store.active_id().to_string(),
            };
            let was_active = id == store.active_id();
            store.delete(&id).await?;
            if was_active {
                draft.clear();
            }
            println!("{}", format!("Deleted {id}").bright_black());
        }
        Command::Temperature(value) => {
            update_setting(ctx, GenerationSetting::Temperature(value)).await?;
        }
        Command::MaxOutputTokens(value) => {
            update_setting(ctx, GenerationSetting::MaxOutputTokens(value)).await?;
        }
        Command::Image(path) => {
            let attachment = attachment_from_path(&path)?;
            draft.attach_image(attachment);
            if !ctx.client().read().await.handle().is_some_and(|h| h.supports_vision()) {
                println!(
                    "{}",
                    "This model is text only; the image will be kept but not sent.".yellow()
                );
            }
        }
        Command::Multimodal(enabled) => {
            draft.multimodal = enabled;
        }
        Command::History => {
            let store = ctx.store()?;
            let store = store.lock().await;
            if let Some(conversation) = store.active() {
                let label = display_model_name(store.configured_model());
                for message in &conversation.history {
                    print_message(message, label);
                }
            }
        }
        Command::Model => {
            let client = ctx.client();
            let client = client.read().await;
            match client.model_name() {
                Some(model) => println!("{} {:?}", model, client.capabilities()),
                None => println!("{}", "No model configured".yellow()),
            }
        }
        Command::Reset => {
            ctx.reset_setup().await?;
            draft.clear();
            if !run_setup(rl, ctx).await? {
                return Ok(Flow::Quit);
            }
            print_session(ctx).await?;
        }
        Command::Help => println!("{}", HELP.bright_black()),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

async fn send_draft(ctx: &AppContext, draft: &mut PendingInput) -> Result<()> {
    let controller = ctx.controller()?;
    let store = ctx.store()?;
    let id = store.lock().await.active_id().to_string();

    println!("{}", "...".bright_black());
    let outcome = controller.submit(&id, draft).await?;
    if outcome == SendOutcome::Skipped {
        return Ok(());
    }

    let store = store.lock().await;
    let label = display_model_name(store.configured_model());
    if let Some(reply) = store.get(&id).and_then(|c| c.last_message()) {
        print_message(reply, label);
    }
    Ok(())
}

async fn update_setting(ctx: &AppContext, setting: GenerationSetting) -> Result<()> {
    let store = ctx.store()?;
    let mut store = store.lock().await;
    let id = store.active_id().to_string();
    store.update_generation_config(&id, setting).await?;
    if let Some(conversation) = store.get(&id) {
        let config = &conversation.generation_config;
        println!(
            "{}",
            format!(
                "temperature={} max_output_tokens={}",
                config.temperature, config.max_output_tokens
            )
            .bright_black()
        );
    }
    Ok(())
}

async fn print_session(ctx: &AppContext) -> Result<()> {
    let store = ctx.store()?;
    let store = store.lock().await;
    if let Some(conversation) = store.active() {
        println!(
            "{}",
            format!(
                "{} ({} messages, {})",
                conversation.name,
                conversation.history.len(),
                display_model_name(store.configured_model())
            )
            .bright_magenta()
        );
        if let Some(last) = conversation.last_message() {
            print_message(last, display_model_name(store.configured_model()));
        }
    }
    Ok(())
}

/// Accepts a conversation id or a 1-based position in `/list` order.
fn resolve(store: &ConversationStore, reference: &str) -> Result<String> {
    if let Ok(position) = reference.parse::<usize>() {
        if let Some(conversation) = position.checked_sub(1).and_then(|i| store.conversations().nth(i)) {
            return Ok(conversation.id.clone());
        }
    }
    if store.get(reference).is_some() {
        return Ok(reference.to_string());
    }
    bail!("No conversation '{reference}'")
}

fn print_message(message: &Message, model_label: &str) {
    match message.sender {
        Sender::User => {
            println!("{}", "[you]".green());
            if let Some(image) = &message.image {
                println!("{}", format!("(image: {})", image.file_name()).bright_black());
            }
            for line in message.content.lines() {
                println!("{}", line.green());
            }
        }
        Sender::Assistant => {
            println!("{}", format!("[{model_label}]").bright_magenta());
            let failed = message.content.starts_with("Error: Could not generate content.");
            for line in message.content.lines() {
                if failed {
                    println!("{}", line.red());
                } else {
                    println!("{}", line.bright_blue());
                }
            }
        }
    }
    println!();
}
