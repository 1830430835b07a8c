use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voxchain::cli::{Cli, Commands, ConfigAction};
use voxchain::config::Config;
use voxchain::frame::Frame;
use voxchain::output::{print_tally, spawn_renderer};
use voxchain::pipeline::{FrameSource, IterSource, Pipeline};
use voxchain::services::{LlmService, MockLlm, MockTts, TtsService};
use voxchain::stages::{ConversationContext, FrameLogger, LlmContextAggregator, LlmStage, TtsStage};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);
    tracing::debug!(version = %voxchain::version_string(), "starting");

    match cli.command {
        Commands::Say {
            text,
            no_aggregate,
            chunk_bytes,
        } => {
            config.validate()?;
            handle_say(&config, &text, !no_aggregate, chunk_bytes, cli.quiet, cli.verbose).await?;
        }
        Commands::Chat {
            utterances,
            reply,
            system,
        } => {
            config.validate()?;
            handle_chat(&config, &utterances, reply, system, cli.quiet, cli.verbose).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Path => {
                let path = cli.config.unwrap_or_else(Config::default_path);
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// RUST_LOG wins; otherwise the configured filter, raised by -v / -vv.
fn init_logging(config: &Config, verbose: u8) {
    let filter = match verbose {
        0 => config.logging.filter.clone(),
        1 => "voxchain=debug".to_string(),
        _ => "voxchain=trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs `pipeline` over `source`, rendering its output through a frame queue
/// sized by `pipeline.queue_capacity`, then prints the tally.
async fn run_rendered<Src: FrameSource>(
    config: &Config,
    pipeline: &mut Pipeline,
    source: Src,
    quiet: bool,
    show: fn(&Frame) -> bool,
) -> Result<()> {
    let (mut queue, renderer) = spawn_renderer(config.pipeline.queue_capacity, quiet, show);
    let result = pipeline.run_to_sink(source, &mut queue, false).await;
    drop(queue);
    let tally = renderer.await.context("renderer task failed")?;
    result?;
    print_tally(&tally);
    Ok(())
}

fn tts_stage(config: &Config, tts: Arc<dyn TtsService>, aggregate: bool) -> TtsStage {
    TtsStage::new(tts)
        .with_aggregate_sentences(aggregate)
        .with_chunk_bytes(config.pipeline.audio_chunk_bytes)
        .with_channels(config.pipeline.channels)
}

async fn handle_say(
    config: &Config,
    text: &str,
    aggregate: bool,
    chunk_bytes: Option<usize>,
    quiet: bool,
    verbose: u8,
) -> Result<()> {
    let tts: Arc<dyn TtsService> =
        Arc::new(MockTts::new().with_sample_rate(config.pipeline.sample_rate));
    let mut stage = tts_stage(config, tts, aggregate);
    if let Some(bytes) = chunk_bytes {
        stage = stage.with_chunk_bytes(bytes);
    }

    let mut pipeline = Pipeline::new(Vec::new()).with_name("say").with_stage(stage);
    if verbose > 0 {
        pipeline = pipeline.with_stage(FrameLogger::new("say"));
    }
    run_rendered(
        config,
        &mut pipeline,
        IterSource::new([Frame::text(text)]),
        quiet,
        |_| true,
    )
    .await
}

async fn handle_chat(
    config: &Config,
    utterances: &[String],
    reply: Option<String>,
    system: Option<String>,
    quiet: bool,
    verbose: u8,
) -> Result<()> {
    let prompt = system.unwrap_or_else(|| config.conversation.system_prompt.clone());
    let context = ConversationContext::with_system_prompt(prompt);
    let llm: Arc<dyn LlmService> = match reply {
        Some(text) => Arc::new(MockLlm::new().with_response(&text)),
        None => Arc::new(MockLlm::new().with_echo()),
    };
    let tts: Arc<dyn TtsService> =
        Arc::new(MockTts::new().with_sample_rate(config.pipeline.sample_rate));
    let bot = config.conversation.bot_participant_id.as_str();

    // One pipeline per turn; the context carries the history across turns.
    for utterance in utterances {
        if !quiet {
            println!("{} {}", "you>".bold(), utterance);
        }

        let mut pipeline = Pipeline::new(Vec::new())
            .with_name("chat")
            .with_stage(
                LlmContextAggregator::user(context.clone())
                    .with_complete_sentences(false)
                    .with_bot_participant(bot),
            )
            .with_stage(LlmStage::new(llm.clone(), context.clone()))
            .with_stage(LlmContextAggregator::assistant(context.clone()))
            .with_stage(tts_stage(config, tts.clone(), config.pipeline.aggregate_sentences));
        if verbose > 0 {
            pipeline = pipeline.with_stage(FrameLogger::new("chat"));
        }

        run_rendered(
            config,
            &mut pipeline,
            IterSource::new([Frame::transcription(utterance.as_str(), "user")]),
            quiet,
            |frame| !matches!(frame, Frame::Transcription { .. }),
        )
        .await?;
    }

    if !quiet {
        println!(
            "{}",
            format!("context: {} messages", context.len()).dimmed()
        );
    }
    Ok(())
}
