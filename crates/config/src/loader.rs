use std::{fmt::Write, path::Path, sync::OnceLock};

use anyhow::bail;
use indoc::indoc;
use regex::{Captures, Regex};
use serde::Deserialize;
use toml::Value;

use crate::{Config, error::Error};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path).map_err(Error::ConfigOpen)?;
    let mut raw_config: Value = toml::from_str(&content).map_err(Error::ConfigParse)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_has_channels(&config)?;
    validate_backups(&config)?;
    validate_provider_kinds(&config)?;

    for warning in dangling_provider_channels(&config) {
        log::warn!("{warning}");
    }

    Ok(config)
}

pub(crate) fn validate_has_channels(config: &Config) -> anyhow::Result<()> {
    if config.channels.is_empty() {
        bail!(indoc! {r#"
            No channels configured. At least one upstream channel is required.

            Example configuration:

              [channels.openai]
              type = "openai"
              secret = "{{ env.OPENAI_API_KEY }}"
        "#});
    }

    if !config.channels.contains_key(&config.fallback.provider) {
        bail!(
            "Fallback provider '{}' does not name a configured channel",
            config.fallback.provider
        );
    }

    Ok(())
}

pub(crate) fn validate_backups(config: &Config) -> anyhow::Result<()> {
    for (name, channel) in &config.channels {
        let Some(backup) = channel.backup.as_deref() else {
            continue;
        };

        if backup == name {
            bail!("Channel '{name}' cannot use itself as its backup");
        }

        if !config.channels.contains_key(backup) {
            bail!("Channel '{name}' names an unknown backup channel '{backup}'");
        }
    }

    Ok(())
}

/// The channel decides which backend serves a provider, so a provider must agree with it.
pub(crate) fn validate_provider_kinds(config: &Config) -> anyhow::Result<()> {
    let fallback = &config.fallback;

    let fallback_channel = config.channels.get(&fallback.provider);

    if let Some(channel) = fallback_channel.filter(|channel| channel.kind != fallback.kind) {
        bail!(
            "Fallback provider '{}' is declared as '{}' but its channel is '{}'",
            fallback.provider,
            fallback.kind,
            channel.kind
        );
    }

    for (model, model_config) in &config.models {
        for provider in &model_config.providers {
            let Some(channel) = config.channels.get(provider.channel_id()) else {
                continue;
            };

            if channel.kind != provider.kind {
                bail!(
                    "Provider '{}' of model '{model}' is declared as '{}' but channel '{}' is '{}'",
                    provider.id,
                    provider.kind,
                    provider.channel_id(),
                    channel.kind
                );
            }
        }
    }

    Ok(())
}

/// Providers pointing at missing channels are served through failover at request time,
/// so they only produce warnings.
pub(crate) fn dangling_provider_channels(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    for (model, model_config) in &config.models {
        if model_config.providers.is_empty() {
            warnings.push(format!(
                "Model '{model}' has no providers and will be served by the fallback provider"
            ));
        }

        for provider in &model_config.providers {
            let channel = provider.channel_id();

            if !config.channels.contains_key(channel) {
                warnings.push(format!(
                    "Provider '{}' of model '{model}' references unknown channel '{channel}'",
                    provider.id
                ));
            }
        }
    }

    warnings
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("environment pattern is a valid regex")
    })
}

fn expand_env(input: &str) -> Result<String, String> {
    let mut missing = None;

    let expanded = env_pattern().replace_all(input, |captures: &Captures<'_>| {
        let name = &captures[1];

        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(format!("environment variable '{name}' is not set")),
        None => Ok(expanded.into_owned()),
    }
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> crate::Result<()> {
    match value {
        Value::String(s) => match expand_env(s) {
            Ok(out) => *s = out,
            Err(reason) => {
                let mut p = String::new();

                for segment in path.iter() {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => {
                            let _ = write!(p, "[{i}]");
                        }
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                return Err(Error::EnvVarSubstitution { path: p, reason });
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}
