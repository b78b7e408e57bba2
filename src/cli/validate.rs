use crate::cli::ValidateArgs;
use crate::config::BusBackend;
use crate::utils::redaction::redact_connection_string;
use crate::Config;
use anyhow::{anyhow, Context, Result};
use secrecy::ExposeSecret;

pub async fn execute(args: &ValidateArgs) -> Result<()> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    config.validate().map_err(|e| anyhow!(e))?;

    println!("Configuration {} is valid.", args.config.display());
    let mut names: Vec<&String> = config.services.keys().collect();
    names.sort();
    for name in names {
        let service = &config.services[name];
        let ttl = service.default_ttl(&config.global);
        match service.bus.backend {
            BusBackend::None => {
                println!("  {:<24} ttl={:>6}s  bus=none", name, ttl.as_secs());
            }
            BusBackend::Redis => {
                let target = service
                    .bus
                    .redis
                    .as_ref()
                    .map(|redis| redact_connection_string(redis.connection_string.expose_secret()))
                    .unwrap_or_default();
                println!(
                    "  {:<24} ttl={:>6}s  bus=redis  channel={}  target={}",
                    name,
                    ttl.as_secs(),
                    service.bus.resolve_channel_name(name),
                    target
                );
            }
        }
    }
    Ok(())
}
