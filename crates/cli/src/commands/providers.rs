//! `longform providers` — List supported LLM providers.

use longform_config::AppConfig;
use longform_providers::router::{BUILTIN_PROVIDERS, build_from_config, default_base_url};

pub async fn run(models: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("🤖 Supported LLM Providers");
    println!("==========================");
    println!();
    println!("  Built-in providers:");
    for name in BUILTIN_PROVIDERS {
        println!("    {name:<12} {}", default_base_url(name));
    }
    println!();
    println!("  Custom endpoints:");
    println!("    Any OpenAI-compatible API works with --provider custom:<base url>,");
    println!("    or in config.toml:");
    println!("    [providers.openai]");
    println!("    api_url = \"https://your-custom-endpoint.com/v1\"");
    println!("    api_key = \"your-key\"");
    println!();
    println!("  Environment variables:");
    println!("    LONGFORM_API_KEY, OPENROUTER_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY");
    println!("    LONGFORM_PROVIDER, LONGFORM_MODEL");

    if models {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        let router = build_from_config(&config);
        let provider = router
            .default()
            .ok_or("No default provider configured")?;

        println!();
        println!("  Models served by '{}':", config.default_provider);
        match provider.list_models().await {
            Ok(list) if list.is_empty() => println!("    (provider did not report any models)"),
            Ok(list) => {
                for model in list {
                    println!("    {model}");
                }
            }
            Err(e) => println!("    ❌ {e}"),
        }
    }

    Ok(())
}
