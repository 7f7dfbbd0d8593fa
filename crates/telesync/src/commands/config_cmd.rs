//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ProfileEntry {
    name: String,
    default: bool,
    status_url: String,
    stream_url: Option<String>,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Status URL")]
    status_url: String,
    #[tabled(rename = "Stream URL")]
    stream_url: String,
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_file(global);

    match &args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Config(e.into()))?
                }
                format => output::render_single(format, &cfg, |_| String::new(), |_| String::new()),
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            let cfg = starter_config(global.status_url.as_deref(), global.stream_url.as_deref())?;
            config::save_config_to(&cfg, &path)?;
            tracing::info!(path = %path.display(), "wrote config");
            output::print_output(
                &format!("Wrote {}", path.display()),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            let active = config::active_profile_name(global, &cfg);
            let entries: Vec<ProfileEntry> = cfg
                .profiles
                .iter()
                .map(|(name, profile)| ProfileEntry {
                    name: name.clone(),
                    default: *name == active,
                    status_url: profile.status_url.clone(),
                    stream_url: profile.stream_url.clone(),
                })
                .collect();

            let out = output::render_list(
                global.output,
                &entries,
                |e| ProfileRow {
                    marker: if e.default { "*" } else { "" },
                    name: e.name.clone(),
                    status_url: e.status_url.clone(),
                    stream_url: e.stream_url.clone().unwrap_or_else(|| "(pull only)".into()),
                },
                |e| e.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

/// `Config::example()` with the given endpoints checked and applied.
fn starter_config(status_url: Option<&str>, stream_url: Option<&str>) -> Result<Config, CliError> {
    let mut cfg = Config::example();
    let Some(profile) = cfg.profiles.get_mut("default") else {
        return Ok(cfg);
    };

    if let Some(raw) = status_url {
        telesync_config::parse_url("status_url", raw, &["http", "https"])?;
        profile.status_url = raw.to_owned();
    }
    if let Some(raw) = stream_url {
        telesync_config::parse_url("stream_url", raw, &["ws", "wss"])?;
        profile.stream_url = Some(raw.to_owned());
    }
    Ok(cfg)
}
