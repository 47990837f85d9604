//! Tessera command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Create a keychain and store a value
//! export TESSERA_PASSWORD='correct horse'
//! tessera --db vault.redb keychain init --user alice
//! tessera --db vault.redb keychain set --user alice github.com hunter2
//! tessera --db vault.redb keychain get --user alice github.com
//!
//! # Two in-process clients exchanging messages
//! tessera demo
//! ```

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use tessera_client::{
    BlobStore, ChatClient, ClientConfig, MemoryBlobStore, MemoryDirectory, MemoryRelay,
    RedbBlobStore, Relay, StoredBlob,
};
use tessera_core::{
    Envelope, EscrowAuthority, Environment, Keychain, MessengerConfig, SystemEnv, TrustPolicy,
};
use tessera_crypto::{AuthoritySigner, KeyPair};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tessera keychain and messaging tool
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Password-derived keychain and end-to-end messaging")]
#[command(version)]
struct Args {
    /// Keychain database file
    #[arg(long, default_value = "tessera.redb", global = true)]
    db: String,

    /// Keychain password
    #[arg(long, env = "TESSERA_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Operate on a stored keychain
    Keychain {
        /// Keychain owner
        #[arg(short, long)]
        user: String,

        #[command(subcommand)]
        action: KeychainAction,
    },
    /// Run a two-party exchange over an in-process relay
    Demo,
}

#[derive(Subcommand, Debug)]
enum KeychainAction {
    /// Create an empty keychain
    Init,
    /// Store a value
    Set {
        /// Entry name
        name: String,
        /// Entry value
        value: String,
    },
    /// Print a value
    Get {
        /// Entry name
        name: String,
    },
    /// Delete a value
    Remove {
        /// Entry name
        name: String,
    },
    /// Check the password and the stored digest
    Verify,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    match args.command {
        Command::Keychain { user, action } => {
            let password = args
                .password
                .ok_or("a password is required: pass --password or set TESSERA_PASSWORD")?;
            let store = RedbBlobStore::open(&args.db)?;
            run_keychain(&store, &user, &password, action)
        },
        Command::Demo => run_demo(),
    }
}

fn run_keychain(
    store: &RedbBlobStore,
    user: &str,
    password: &str,
    action: KeychainAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut out = io::stdout();

    if matches!(action, KeychainAction::Init) {
        if store.load(user)?.is_some() {
            return Err(format!("keychain for '{user}' already exists").into());
        }
        let keychain = Keychain::init(SystemEnv::new(), password)?;
        save(store, user, &keychain)?;
        writeln!(out, "created keychain for '{user}'")?;
        return Ok(());
    }

    let stored = store.load(user)?.ok_or_else(|| format!("no keychain for '{user}'"))?;
    let mut keychain =
        Keychain::load(SystemEnv::new(), password, &stored.blob, Some(&stored.digest))?;

    match action {
        KeychainAction::Init => {},
        KeychainAction::Set { name, value } => {
            keychain.set(&name, &value)?;
            save(store, user, &keychain)?;
            tracing::info!(entries = keychain.len(), "value stored");
        },
        KeychainAction::Get { name } => match keychain.get(&name)? {
            Some(value) => writeln!(out, "{value}")?,
            None => return Err(format!("no entry named '{name}'").into()),
        },
        KeychainAction::Remove { name } => {
            if keychain.remove(&name)? {
                save(store, user, &keychain)?;
                writeln!(out, "removed '{name}'")?;
            } else {
                writeln!(out, "no entry named '{name}'")?;
            }
        },
        KeychainAction::Verify => {
            writeln!(out, "ok: {} entries, digest {}", keychain.len(), stored.digest)?;
        },
    }

    Ok(())
}

fn save(
    store: &RedbBlobStore,
    user: &str,
    keychain: &Keychain<SystemEnv>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (blob, digest) = keychain.dump()?;
    store.store(user, &StoredBlob { blob, digest })?;
    Ok(())
}

fn run_demo() -> Result<(), Box<dyn std::error::Error>> {
    let env = SystemEnv::new();
    let signer = AuthoritySigner::from_secret_bytes(&env.random_array());
    let escrow = EscrowAuthority::new(KeyPair::from_secret_bytes(env.random_array()));

    let mut messenger = MessengerConfig::new(signer.authority_key(), *escrow.public_key());
    messenger.trust_policy = TrustPolicy::RequireSignature;
    let config = ClientConfig::new(messenger);

    let directory = MemoryDirectory::with_authority(signer);
    let relay = MemoryRelay::new();

    let register = |user: &str| {
        ChatClient::register(
            env,
            MemoryBlobStore::new(),
            directory.clone(),
            relay.clone(),
            user,
            "demo password",
            config.clone(),
        )
    };
    let mut alice = register("alice")?;
    let mut bob = register("bob")?;

    alice.send("bob", "Hi Bob, this is Alice.")?;
    alice.send("bob", "Did the keys line up?")?;

    let mut out = io::stdout();

    // The escrow holder reads traffic without either party's keys.
    let queued = relay.drain("bob")?;
    for delivery in &queued {
        let envelope = Envelope::from_json(&delivery.payload)?;
        writeln!(out, "escrow  <- {}: {}", delivery.sender, escrow.decrypt(&envelope)?)?;
        relay.deliver(&delivery.sender, "bob", delivery.payload.clone())?;
    }

    for message in bob.poll()? {
        writeln!(out, "bob     <- {}: {}", message.sender, message.outcome?)?;
    }

    bob.send("alice", "They did. Ratchet stepped.")?;
    for message in alice.poll()? {
        writeln!(out, "alice   <- {}: {}", message.sender, message.outcome?)?;
    }

    tracing::info!(
        alice = ?alice.messenger().session_state("bob"),
        bob = ?bob.messenger().session_state("alice"),
        "demo complete"
    );

    Ok(())
}
