use std::path::PathBuf;
use std::sync::Arc;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::{error, info};

use crate::config::io::ConfigIO;
use crate::config::types::{Config, SequenceScope, ShadeSettings};
use crate::device::btle::BtleTransport;
use crate::device::codec::Command;
use crate::device::constants::DEFAULT_BEEP_COUNT;
use crate::device::registry::ShadeRegistry;
use crate::device::session::ConnectionSession;
use crate::device::transport::Transport;
use crate::device::types::SessionEvent;
use crate::error::{AppRunError, ConfigError, SessionError};

#[derive(Parser, Debug)]
#[command(name = "powerview-remote", version, about = "Control PowerView shades over bluetooth")]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 32 hex character home key
    #[arg(long, global = true, env = "POWERVIEW_ENCRYPTION_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Only consider shades whose name starts with this
    #[arg(long, global = true, env = "POWERVIEW_SHADE_PREFIX")]
    pub prefix: Option<String>,

    /// Log packets and protocol details
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Address of a shade to control, may be repeated. Without it the first matching shade is used
    #[arg(long = "device", value_name = "ADDR")]
    pub devices: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Look for a shade and print its identity
    Scan,
    /// Move shades to a position (0 = closed, 100 = open)
    Set {
        #[arg(allow_negative_numbers = true)]
        percent: i32,
        #[command(flatten)]
        devices: DeviceArgs,
    },
    /// Make shades beep
    Identify {
        #[arg(long, default_value_t = DEFAULT_BEEP_COUNT)]
        beeps: u8,
        #[command(flatten)]
        devices: DeviceArgs,
    },
    /// Stop shades that are moving
    Stop {
        #[command(flatten)]
        devices: DeviceArgs,
    },
    /// Print status notifications until interrupted
    Watch {
        #[command(flatten)]
        devices: DeviceArgs,
    },
    /// Inspect or change the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        encryption_key: Option<String>,
        #[arg(long)]
        shade_prefix: Option<String>,
        #[arg(long, value_enum)]
        sequence_scope: Option<SequenceScope>,
    },
}

fn update_status(message: &str) {
    println!("{}", message);
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(Some(identity), state) => update_status(&format!("{}: {}", identity.name, state)),
        SessionEvent::StateChanged(None, state) => update_status(&format!("shade: {}", state)),
        SessionEvent::Status(identity, sample) => update_status(&format!(
            "{}: position {:.0}% (status 0x{:02x})",
            identity.name, sample.position_percent, sample.status_code,
        )),
        SessionEvent::LinkLost(identity, _) => update_status(&format!("{}: connection lost", identity.name)),
        // already in the log
        SessionEvent::Diagnostic(..) => {},
    }
}

/// Scan for and connect every requested shade. Shades that fail are reported and left out.
pub async fn connect_shades<T: Transport>(
    transport: &Arc<T>,
    settings: &ShadeSettings,
    devices: &DeviceArgs,
    events: &UnboundedSender<SessionEvent>,
) -> ShadeRegistry<T> {
    let mut registry = ShadeRegistry::new();

    let addresses: Vec<Option<&str>> = if devices.devices.is_empty() {
        vec![None]
    } else {
        devices.devices.iter().map(|address| Some(address.as_str())).collect()
    };

    for address in addresses {
        let mut session = ConnectionSession::new(
            transport.clone(),
            settings.cipher.clone(),
            settings.codec_for_session(),
            settings.filter(address),
        );
        session.add_event_sender(events.clone());

        update_status("Scanning for shades...");
        let identity = match session.scan().await {
            Ok(identity) => identity,
            Err(err) if err.is_benign() => {
                update_status("No shades found or cancelled");
                continue;
            },
            Err(err) => {
                update_status(&format!("Error: {}", err));
                continue;
            },
        };

        if registry.contains(&identity) {
            update_status(&format!("{} already added", identity.name));
            session.disconnect().await;
            continue;
        }

        update_status(&format!("Connecting to {}...", identity.name));
        if let Err(err) = session.connect().await {
            update_status(&format!("Connection failed: {}", err));
            continue;
        }

        match registry.add(identity.clone(), session) {
            Ok(()) => update_status(&format!("{} connected", identity.name)),
            Err((err, mut session)) => {
                update_status(&err.to_string());
                session.disconnect().await;
            },
        }
    }

    registry
}

async fn run_broadcast<T: Transport>(registry: &mut ShadeRegistry<T>, command: Command) -> Result<(), AppRunError> {
    if registry.is_empty() {
        return Err(SessionError::NotConnected.into());
    }

    update_status(&format!("Sending {}...", command));
    let outcomes = registry.broadcast(&command).await;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => update_status(&format!("{}: command sent", outcome.identity.name)),
            Err(err) => {
                failed += 1;
                update_status(&format!("{}: error: {}", outcome.identity.name, err));
            },
        }
    }

    if outcomes.is_empty() {
        return Err(SessionError::NotConnected.into());
    }
    if failed > 0 {
        return Err(AppRunError::CommandFailed { failed, total: outcomes.len() });
    }
    Ok(())
}

async fn run_watch<T: Transport>(registry: &mut ShadeRegistry<T>, receiver: &mut UnboundedReceiver<SessionEvent>) {
    update_status("Watching, press Ctrl-C to stop");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!("Failed to listen for Ctrl-C: {}", err);
                }
                break;
            },
            event = receiver.next() => match event {
                Some(event) => {
                    print_event(&event);
                    registry.handle_event(&event).await;
                },
                None => break,
            },
        }
    }
}

async fn run_config(action: &ConfigCommand, config_io: &ConfigIO, mut config: Config) -> Result<(), AppRunError> {
    match action {
        ConfigCommand::Show => {
            update_status(&format!("# {}", config_io.path().to_string_lossy()));
            let json = serde_json::to_string_pretty(&config.redacted()).map_err(ConfigError::from)?;
            update_status(&json);
        },
        ConfigCommand::Set { encryption_key, shade_prefix, sequence_scope } => {
            config.apply_overrides(encryption_key.clone(), shade_prefix.clone());
            if let Some(scope) = sequence_scope {
                config.sequence_scope = *scope;
            }
            if config.encryption_key.is_some() {
                // refuse to persist a key that would fail at start up
                config.validate()?;
            }
            config_io.save(&config).await?;
            update_status("Config saved");
        },
    }

    Ok(())
}

pub async fn run(cli: Cli) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(cli.config.clone())?;
    // only one instance may talk to the shades at a time
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let mut config = config_io.read().await?;

    if let CliCommand::Config { action } = &cli.command {
        return run_config(action, &config_io, config).await;
    }

    config.apply_overrides(cli.key.clone(), cli.prefix.clone());
    let settings = config.validate()?;
    info!("Config valid, shade prefix {:?}, sequence scope {:?}", settings.shade_prefix, settings.sequence_scope);

    let transport = Arc::new(BtleTransport::new().await?);
    let (events, mut receiver) = unbounded::<SessionEvent>();

    let (command, devices) = match cli.command {
        CliCommand::Scan => {
            let mut session = ConnectionSession::new(
                transport.clone(),
                settings.cipher.clone(),
                settings.codec_for_session(),
                settings.filter(None),
            );
            update_status("Scanning for shades...");
            let result = session.scan().await;
            session.disconnect().await;

            return match result {
                Ok(identity) => {
                    update_status(&format!("Found: {}", identity));
                    Ok(())
                },
                Err(err) if err.is_benign() => {
                    update_status("No shades found. Make sure your shade is nearby.");
                    Ok(())
                },
                Err(err) => Err(err.into()),
            };
        },
        CliCommand::Watch { devices } => {
            let mut registry = connect_shades(&transport, &settings, &devices, &events).await;
            if registry.is_empty() {
                return Err(SessionError::NotConnected.into());
            }
            run_watch(&mut registry, &mut receiver).await;
            registry.teardown_all().await;
            return Ok(());
        },
        CliCommand::Set { percent, devices } => (Command::SetPosition(percent), devices),
        CliCommand::Identify { beeps, devices } => (Command::Identify(beeps), devices),
        CliCommand::Stop { devices } => (Command::Stop, devices),
        CliCommand::Config { .. } => return Ok(()),
    };

    let mut registry = connect_shades(&transport, &settings, &devices, &events).await;
    let result = run_broadcast(&mut registry, command).await;
    registry.teardown_all().await;

    while let Ok(Some(event)) = receiver.try_next() {
        print_event(&event);
    }

    result
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_set_with_devices() {
        let cli = Cli::try_parse_from([
            "powerview-remote", "--key", "00112233445566778899aabbccddeeff",
            "set", "-5", "--device", "AA:BB", "--device", "CC:DD",
        ]).unwrap();

        assert_eq!(cli.key.as_deref(), Some("00112233445566778899aabbccddeeff"));
        match cli.command {
            CliCommand::Set { percent, devices } => {
                assert_eq!(percent, -5);
                assert_eq!(devices.devices, vec!["AA:BB", "CC:DD"]);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn identify_defaults_to_three_beeps() {
        let cli = Cli::try_parse_from(["powerview-remote", "identify"]).unwrap();
        assert!(matches!(cli.command, CliCommand::Identify { beeps: 3, .. }));
    }

    #[test]
    fn config_set_accepts_scope() {
        let cli = Cli::try_parse_from(["powerview-remote", "config", "set", "--sequence-scope", "shared"]).unwrap();
        assert!(matches!(
            cli.command,
            CliCommand::Config { action: ConfigCommand::Set { sequence_scope: Some(SequenceScope::Shared), .. } }
        ));
    }
}
