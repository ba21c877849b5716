//! `longform generate` — Stream a document and save it as Markdown.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use longform_config::AppConfig;
use longform_generator::{
    Artifact, ContinuationGenerator, DisplaySink, GenerationEvent, MaterialRequest, Session,
    Termination,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::GenerateArgs;

/// Providers that run locally and need no API key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "vllm", "llamacpp"];

pub async fn run(args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let provider_name = args
        .provider
        .clone()
        .unwrap_or_else(|| config.default_provider.clone());
    let provider_config = config.providers.get(&provider_name);
    let api_key = config.api_key_for(&provider_name).unwrap_or_default();

    if api_key.is_empty() && needs_api_key(&provider_name) {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{provider_name}'!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    {}", key_vars_for(&provider_name).join(", "));
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let model = args
        .model
        .clone()
        .or_else(|| provider_config.and_then(|p| p.default_model.clone()))
        .unwrap_or_else(|| config.default_model.clone());

    let router = longform_providers::router::build_from_config(&config);
    let provider = router
        .resolve(&provider_name, &api_key)
        .ok_or_else(|| format!("Unknown provider '{provider_name}'. Run `longform providers`."))?;

    let generator = ContinuationGenerator::from_config(provider, &model, &config)?;
    let mut budget = generator.budget().clone();
    if let Some(max_rounds) = args.max_rounds {
        budget = budget.with_max_rounds(max_rounds)?;
    }
    if let Some(window) = args.window {
        budget = budget.with_window_chars(window)?;
    }
    let generator = generator.with_budget(budget);

    let request = MaterialRequest::new(&args.topic, args.level, args.length);
    let instructions = request.instructions(generator.budget());
    let mut session = Session::new(&args.topic, request.seed());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current fragment");
            trigger.cancel();
        }
    });

    info!(
        topic = %args.topic,
        level = %args.level,
        provider = %provider_name,
        model = %model,
        "Generating"
    );

    let mut sink = StdoutSink::default();
    let result = generator
        .run(&mut session, &instructions, &mut sink, Some(&cancel))
        .await;
    println!();

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.artifact.output_dir.clone());
    let include_seed = args.include_seed || config.artifact.include_seed;
    let offset = config.artifact.utc_offset_hours;

    match result {
        Ok(generation) => {
            match generation.termination {
                Termination::Complete => eprintln!(
                    "✅ Complete after {} round(s), {} tokens",
                    generation.rounds_used, generation.usage.total_tokens
                ),
                Termination::TruncatedOutput => eprintln!(
                    "⚠️  Round limit reached after {} round(s); output may be truncated",
                    generation.rounds_used
                ),
                Termination::Cancelled => eprintln!(
                    "⚠️  Cancelled after {} round(s); saving partial output",
                    generation.rounds_used
                ),
            }
            if !args.no_save {
                let artifact = Artifact::from_generation(
                    &generation,
                    &session.topic,
                    offset,
                    include_seed,
                    Utc::now(),
                );
                let path = save_artifact(&artifact, &output_dir)?;
                eprintln!("📝 Saved {}", path.display());
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("❌ {failure}");
            if !args.no_save && !failure.partial_artifact.is_empty() {
                let content = if include_seed {
                    session.full_text()
                } else {
                    failure.partial_artifact.clone()
                };
                let artifact = Artifact::new(&session.topic, content, offset, Utc::now());
                let path = save_artifact(&artifact, &output_dir)?;
                eprintln!("📝 Saved partial output to {}", path.display());
            }
            Err(failure.into())
        }
    }
}

fn needs_api_key(provider: &str) -> bool {
    !(provider.starts_with("custom:") || KEYLESS_PROVIDERS.contains(&provider))
}

/// Environment variables that can supply `provider`'s key.
fn key_vars_for(provider: &str) -> Vec<&'static str> {
    std::iter::once("LONGFORM_API_KEY")
        .chain(longform_config::provider_key_var(provider))
        .collect()
}

/// Write `artifact` into `dir`, creating the directory if needed.
pub fn save_artifact(artifact: &Artifact, dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(&artifact.filename);
    std::fs::write(&path, &artifact.content)?;
    Ok(path)
}

/// Prints the new part of each round's text to stdout.
#[derive(Default)]
struct StdoutSink {
    shown: String,
}

impl StdoutSink {
    /// The part of `round_text` not yet printed.
    ///
    /// If the text no longer extends what was printed (a retried attempt),
    /// the whole text is printed again on a fresh line.
    fn advance(&mut self, round_text: &str) -> String {
        let fresh = match round_text.strip_prefix(self.shown.as_str()) {
            Some(rest) => rest.to_string(),
            None => format!("\n{round_text}"),
        };
        self.shown.clear();
        self.shown.push_str(round_text);
        fresh
    }
}

impl DisplaySink for StdoutSink {
    fn on_fragment(&mut self, round_text: &str) {
        let fresh = self.advance(round_text);
        if !fresh.is_empty() {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(fresh.as_bytes());
            let _ = out.flush();
        }
    }

    fn on_event(&mut self, event: &GenerationEvent) {
        match event {
            GenerationEvent::RoundStarted { .. } => self.shown.clear(),
            GenerationEvent::Retrying {
                attempt, delay_ms, ..
            } => {
                eprintln!("\n⚠️  Attempt {attempt} failed, retrying in {delay_ms} ms");
                self.shown.clear();
            }
            GenerationEvent::RoundFinished { .. } | GenerationEvent::Finished { .. } => {}
        }
    }
}
