//! `rendezvous` — a command-line driver for the Rendezvous client core.
//!
//! Push-notification plumbing and the HTTP transport's own
//! authentication-header shaping stay out of scope here; this binary
//! only wires `clap` subcommands onto `rv_core::Device`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use clap::{Parser, Subcommand};

use rv_core::{AdminClient, ClientConfig, ClientData, Device, DeviceEvent};
use rv_proto::Role;
use rv_transport::{HttpServerTransport, ServerTransport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rendezvous client core CLI", long_about = None)]
struct Cli {
    /// Path to the local `ClientData` blob. Defaults to `./rendezvous.dat`.
    #[arg(long, global = true, default_value = "rendezvous.dat")]
    data_file: PathBuf,

    /// Server base URL, overriding `RENDEZVOUS_SERVER_URL`.
    #[arg(long, global = true)]
    server_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a brand-new user and device, writing `data_file`.
    Register {
        name: String,
        pin: u32,
        #[arg(long, default_value_t = 50)]
        prekeys: usize,
        #[arg(long, default_value_t = 10)]
        topic_keys: usize,
    },
    /// Publish more signed prekeys for this device.
    UploadPrekeys { count: usize },
    /// Mint and distribute topic keys to this user's other devices.
    UploadTopicKeys { count: usize },
    /// Create a topic with the caller as admin plus the given members.
    /// Each member is `<base64-signing-key>:<admin|participant|observer>`.
    CreateTopic { members: Vec<String> },
    /// Post a metadata-only update to a topic.
    Send {
        topic_id: String,
        #[arg(long)]
        metadata: String,
    },
    /// Poll `device/messages` once and print every delivered event.
    GetMessages,
    /// Admin operations: token rotation, server reset, user allow-listing.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Rotate the admin token.
    Renew,
    /// Wipe the server and reset the local admin token to zero.
    Reset,
    /// Allow a username to register, returning its pin.
    Allow { username: String },
}

fn build_transport(server_url: Option<String>) -> Result<Arc<dyn ServerTransport>> {
    let mut config = ClientConfig::from_env();
    if let Some(url) = server_url {
        config.server_url = url;
    }
    let transport = HttpServerTransport::new(config.server_url, config.request_timeout)
        .context("failed to build HTTP transport")?;
    Ok(Arc::new(transport))
}

fn load_device(data_file: &PathBuf, transport: Arc<dyn ServerTransport>) -> Result<Device> {
    let bytes = std::fs::read(data_file)
        .with_context(|| format!("reading {}", data_file.display()))?;
    let data = ClientData::decode(&bytes)?;
    Ok(Device::import_data(transport, data)?)
}

fn save_device(data_file: &PathBuf, device: &Device) -> Result<()> {
    let data = device.export_data();
    std::fs::write(data_file, data.encode()?)
        .with_context(|| format!("writing {}", data_file.display()))?;
    Ok(())
}

fn print_event(event: DeviceEvent) {
    match event {
        DeviceEvent::UserDeviceAdded(d) => println!("user-device-added: {}", d.device_public_key.to_b64()),
        DeviceEvent::UserDeviceChanged(d) => println!("user-device-changed: {}", d.device_public_key.to_b64()),
        DeviceEvent::UserDeviceRemoved(key) => println!("user-device-removed: {}", key.to_b64()),
        DeviceEvent::TopicAdded { topic_id } => println!("topic-added: {}", URL_SAFE_NO_PAD.encode(topic_id)),
        DeviceEvent::TopicUpdated { topic_id } => println!("topic-updated: {}", URL_SAFE_NO_PAD.encode(topic_id)),
        DeviceEvent::UpdateReceived { topic_id, update, verified } => println!(
            "update-received: topic={} chain_index={} verified={} metadata_len={}",
            URL_SAFE_NO_PAD.encode(topic_id),
            update.chain_index,
            verified,
            update.metadata.len()
        ),
        DeviceEvent::UpdateVerifiedLate { topic_id, update } => println!(
            "update-verified-late: topic={} chain_index={}",
            URL_SAFE_NO_PAD.encode(topic_id),
            update.chain_index
        ),
        DeviceEvent::ChainStateReceived { topic_id, chain_index, sender } => println!(
            "chain-state-received: topic={} chain_index={} sender={}",
            URL_SAFE_NO_PAD.encode(topic_id),
            chain_index,
            sender.to_b64()
        ),
        DeviceEvent::InvalidChain { topic_id, chain_index } => println!(
            "invalid-chain: topic={} chain_index={}",
            URL_SAFE_NO_PAD.encode(topic_id),
            chain_index
        ),
    }
}

fn parse_member(spec: &str) -> Result<(rv_crypto::SigningPublicKey, Role)> {
    let (key_b64, role) = spec
        .split_once(':')
        .ok_or_else(|| anyhow!("member spec must be `<key>:<role>`, got `{spec}`"))?;
    let key = rv_crypto::SigningPublicKey::from_b64(key_b64)?;
    let role = match role {
        "admin" => Role::Admin,
        "participant" => Role::Participant,
        "observer" => Role::Observer,
        other => return Err(anyhow!("unknown role `{other}`")),
    };
    Ok((key, role))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let transport = build_transport(cli.server_url)?;

    match cli.command {
        Commands::Register { name, pin, prekeys, topic_keys } => {
            let config = ClientConfig::from_env();
            let device = Device::register(transport, config, name, pin, prekeys, topic_keys).await?;
            save_device(&cli.data_file, &device)?;
            println!("registered user {}", device.user_public_key().to_b64());
        }
        Commands::UploadPrekeys { count } => {
            let mut device = load_device(&cli.data_file, transport)?;
            device.upload_prekeys(count).await?;
            save_device(&cli.data_file, &device)?;
            println!("uploaded {count} prekeys");
        }
        Commands::UploadTopicKeys { count } => {
            let mut device = load_device(&cli.data_file, transport)?;
            device.upload_topic_keys(count).await?;
            save_device(&cli.data_file, &device)?;
            println!("uploaded {count} topic keys");
        }
        Commands::CreateTopic { members } => {
            let mut device = load_device(&cli.data_file, transport)?;
            let parsed: Result<Vec<_>> = members.iter().map(|m| parse_member(m)).collect();
            let topic_id = device.create_topic(&parsed?).await?;
            save_device(&cli.data_file, &device)?;
            println!("created topic {}", URL_SAFE_NO_PAD.encode(topic_id));
        }
        Commands::Send { topic_id, metadata } => {
            let device = load_device(&cli.data_file, transport)?;
            let topic_id_bytes: [u8; 12] = URL_SAFE_NO_PAD
                .decode(&topic_id)?
                .try_into()
                .map_err(|_| anyhow!("topic id must decode to 12 bytes"))?;
            let chain_state = device.upload(topic_id_bytes, &[], metadata.as_bytes()).await?;
            println!("sent: chain_index={}", chain_state.chain_index);
        }
        Commands::GetMessages => {
            let mut device = load_device(&cli.data_file, transport)?;
            device.set_event_handler(Box::new(print_event));
            device.get_messages().await?;
            save_device(&cli.data_file, &device)?;
        }
        Commands::Admin { action } => {
            let mut admin = AdminClient::new(transport);
            match action {
                AdminAction::Renew => {
                    let token = admin.update_admin_token().await?;
                    println!("new admin token: {}", URL_SAFE_NO_PAD.encode(token));
                }
                AdminAction::Reset => {
                    admin.reset_development_server().await?;
                    println!("server reset");
                }
                AdminAction::Allow { username } => {
                    let allowed = admin.allow(&username).await?;
                    println!("pin={} expiry={}", allowed.pin, allowed.expiry);
                }
            }
        }
    }

    Ok(())
}
