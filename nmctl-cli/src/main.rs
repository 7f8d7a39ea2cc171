//! `nmctl`: Wi-Fi, Ethernet and VPN control from the terminal.

mod output;
mod prompt;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use log::debug;
use nmctl::{ConnectionRequest, Manager, NetworkState, VpnConfigUpdate};

/// How long `connect` commands wait for NetworkManager to settle.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Parser, Debug)]
#[command(name = "nmctl")]
#[command(version, about = "Control Wi-Fi, Ethernet and VPN connections through NetworkManager")]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current state
    Status,
    /// Print every state change and answer credential prompts
    Watch,
    #[command(subcommand)]
    Wifi(WifiCommand),
    #[command(subcommand)]
    Ethernet(EthernetCommand),
    #[command(subcommand)]
    Vpn(VpnCommand),
    /// Prefer a medium: auto, wifi or ethernet
    Prefer { preference: String },
}

#[derive(Subcommand, Debug)]
enum WifiCommand {
    /// List visible networks
    List {
        /// Request a scan first
        #[arg(long)]
        rescan: bool,
    },
    Connect {
        ssid: String,
        #[arg(short, long)]
        password: Option<String>,
        /// Makes the network enterprise (802.1X)
        #[arg(short, long)]
        username: Option<String>,
        #[arg(long)]
        hidden: bool,
        #[arg(long)]
        device: Option<String>,
    },
    Disconnect {
        #[arg(long)]
        device: Option<String>,
    },
    /// Delete the saved profile for a network
    Forget { ssid: String },
    On,
    Off,
    Toggle,
    /// Every access point of a network
    Details { ssid: String },
    Autoconnect {
        ssid: String,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand, Debug)]
enum EthernetCommand {
    /// Activate the wired link, optionally with a specific profile
    Connect { uuid: Option<String> },
    Disconnect,
    /// List saved wired profiles
    List,
    Details { uuid: String },
}

#[derive(Subcommand, Debug)]
enum VpnCommand {
    /// List saved VPN profiles
    List,
    /// List active VPN connections
    Active,
    Up {
        /// Profile name or UUID
        name: String,
        /// Leave other active VPNs up
        #[arg(long)]
        keep_others: bool,
    },
    /// Bring a VPN down, or every VPN without a name
    Down { name: Option<String> },
    /// Import a provider file (.ovpn, .conf, ...)
    Import {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    Delete { name: String },
    /// Show a profile without its secrets
    Show { name: String },
    Rename { uuid: String, name: String },
    Credentials {
        uuid: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// Store the password in the profile instead of for one activation
        #[arg(long)]
        save: bool,
    },
    ClearCredentials { name: String },
    /// Installed VPN plugins
    Plugins,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let manager = Manager::new()
        .await
        .context("failed to reach NetworkManager")?;
    let json = args.json;

    let result = match args.command {
        Command::Status => output::state(&manager.state(), json),
        Command::Watch => watch(&manager, json).await,
        Command::Wifi(cmd) => wifi(&manager, cmd, json).await,
        Command::Ethernet(cmd) => ethernet(&manager, cmd, json).await,
        Command::Vpn(cmd) => vpn(&manager, cmd, json).await,
        Command::Prefer { preference } => {
            manager.set_preference(&preference).await?;
            println!("Preference set to {preference}");
            Ok(())
        }
    };

    manager.shutdown();
    result
}

async fn watch(manager: &Manager, json: bool) -> anyhow::Result<()> {
    let responder = prompt::spawn_responder(manager);
    // The first update is the current state.
    let mut updates = manager.subscribe();

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(state) => output::state(&state, json)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    responder.abort();
    Ok(())
}

/// Waits until `in_progress` turns false, then fails if an error was
/// published.
async fn wait_for_attempt(
    manager: &Manager,
    in_progress: impl Fn(&NetworkState) -> bool,
) -> anyhow::Result<()> {
    let mut updates = manager.subscribe();
    let mut state = manager.state();

    let settled = tokio::time::timeout(ATTEMPT_TIMEOUT, async {
        while in_progress(&state) {
            match updates.recv().await {
                Some(next) => state = next,
                None => break,
            }
        }
    })
    .await;

    if settled.is_err() {
        bail!("still connecting after {}s", ATTEMPT_TIMEOUT.as_secs());
    }
    if !state.last_error.is_empty() {
        bail!("{}", state.last_error);
    }
    Ok(())
}

async fn wifi(manager: &Manager, cmd: WifiCommand, json: bool) -> anyhow::Result<()> {
    match cmd {
        WifiCommand::List { rescan } => {
            if rescan {
                manager.scan_wifi(None).await?;
                // Results arrive as AccessPoints signals.
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
            output::networks(&manager.state().wifi_networks, json)?;
        }
        WifiCommand::Connect {
            ssid,
            password,
            username,
            hidden,
            device,
        } => {
            let request = ConnectionRequest {
                password,
                username,
                hidden,
                device,
                ..ConnectionRequest::new(ssid.clone())
            };
            manager.connect_wifi(&request).await?;
            wait_for_attempt(manager, |s| s.is_connecting).await?;
            println!("Connected to {ssid}");
        }
        WifiCommand::Disconnect { device } => manager.disconnect_wifi(device.as_deref()).await?,
        WifiCommand::Forget { ssid } => {
            manager.forget_wifi(&ssid).await?;
            println!("Forgot {ssid}");
        }
        WifiCommand::On => manager.set_wifi_enabled(true).await?,
        WifiCommand::Off => manager.set_wifi_enabled(false).await?,
        WifiCommand::Toggle => {
            let enabled = manager.toggle_wifi().await?;
            println!("Wi-Fi {}", if enabled { "on" } else { "off" });
        }
        WifiCommand::Details { ssid } => {
            output::json(&manager.wifi_network_details(&ssid).await?)?;
        }
        WifiCommand::Autoconnect { ssid, enabled } => {
            manager.set_wifi_autoconnect(&ssid, enabled).await?;
        }
    }
    Ok(())
}

async fn ethernet(manager: &Manager, cmd: EthernetCommand, json: bool) -> anyhow::Result<()> {
    match cmd {
        EthernetCommand::Connect { uuid: Some(uuid) } => {
            manager.connect_ethernet_profile(&uuid).await?;
        }
        EthernetCommand::Connect { uuid: None } => manager.connect_ethernet().await?,
        EthernetCommand::Disconnect => manager.disconnect_ethernet().await?,
        EthernetCommand::List => {
            output::wired_connections(&manager.list_wired_connections().await, json)?;
        }
        EthernetCommand::Details { uuid } => {
            output::json(&manager.wired_network_details(&uuid).await?)?;
        }
    }
    Ok(())
}

async fn vpn(manager: &Manager, cmd: VpnCommand, json: bool) -> anyhow::Result<()> {
    match cmd {
        VpnCommand::List => output::vpn_profiles(&manager.list_vpn_profiles().await, json)?,
        VpnCommand::Active => output::json(&manager.list_active_vpn().await)?,
        VpnCommand::Up { name, keep_others } => {
            let responder = prompt::spawn_responder(manager);
            let result = async {
                manager.connect_vpn(&name, !keep_others).await?;
                wait_for_attempt(manager, |s| s.is_connecting_vpn).await
            }
            .await;
            responder.abort();
            result?;
            println!("VPN {name} is up");
        }
        VpnCommand::Down { name: Some(name) } => manager.disconnect_vpn(&name).await?,
        VpnCommand::Down { name: None } => manager.disconnect_all_vpn().await?,
        VpnCommand::Import { file, name } => {
            let result = manager.import_vpn(&file, name.as_deref()).await?;
            if !result.success {
                bail!("import failed:\n{}", result.error);
            }
            debug!("Imported {} as {}", file.display(), result.uuid);
            println!("Imported {} ({})", result.name, result.uuid);
        }
        VpnCommand::Delete { name } => manager.delete_vpn(&name).await?,
        VpnCommand::Show { name } => output::json(&manager.vpn_config(&name).await?)?,
        VpnCommand::Rename { uuid, name } => {
            let update = VpnConfigUpdate {
                name: Some(name),
                ..Default::default()
            };
            manager.update_vpn_config(&uuid, update).await?;
        }
        VpnCommand::Credentials {
            uuid,
            username,
            password,
            save,
        } => {
            manager
                .set_vpn_credentials(&uuid, &username, &password, save)
                .await?;
        }
        VpnCommand::ClearCredentials { name } => manager.clear_vpn_credentials(&name).await?,
        VpnCommand::Plugins => output::json(&manager.list_vpn_plugins())?,
    }
    Ok(())
}
