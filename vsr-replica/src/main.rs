//! vsr-replica: standalone replica process for one room-shard cluster.

use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use mio::Token;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_mio::v1_0::Signals;
use tracing::{error, info, warn};

use vsr_core::crypto::ed25519_keypair_from_seed;
use vsr_core::io::Dispatcher;
use vsr_core::protocol::{Command, ChatMessage, TransportHeader, HEADER_SIZE};
use vsr_core::replica::ReplicaCore;
use vsr_core::transport::Transport;

mod config;
mod error;

use config::Args;
use error::ProcessError;

const SIGNAL_TOKEN: Token = Token(usize::MAX - 1);
const POLL_TIMEOUT_MS: u64 = 100;

fn main() -> Result<(), ProcessError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let log_level = args.log_level.clone();
    let wal_path = PathBuf::from(&args.wal_path);
    let max_entries = args.max_entries;
    let cluster_config = args.into_cluster_config();
    cluster_config.validate()?;

    info!(
        replica_id = cluster_config.replica_id,
        cluster_id = cluster_config.cluster_id,
        log_level,
        "starting replica"
    );

    let own_public_key = ed25519_keypair_from_seed(&cluster_config.secret_key).public();
    let peer_public_keys = cluster_config.peer_public_keys(own_public_key);
    let bind_host = cluster_config.bind_host;
    let bind_port = cluster_config.bind_port;
    let mut transport = Transport::new(
        cluster_config.cluster_id,
        cluster_config.replica_id,
        cluster_config.secret_key,
        peer_public_keys,
    );

    let mut replica = ReplicaCore::open(cluster_config, &wal_path, max_entries)?;

    let mut dispatcher = Dispatcher::bind(bind_host, bind_port)?;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    dispatcher
        .registry()
        .register(&mut signals, SIGNAL_TOKEN, mio::Interest::READABLE)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    info!(bind_host = ?bind_host, bind_port, "replica listening");

    while !shutdown.load(Ordering::Relaxed) {
        let ready = dispatcher.run(POLL_TIMEOUT_MS)?;
        for token in ready {
            if token == SIGNAL_TOKEN {
                for signal in signals.pending() {
                    warn!(signal, "received shutdown signal");
                    shutdown.store(true, Ordering::Relaxed);
                }
                continue;
            }
            match service_connection(&mut dispatcher, &mut replica, &mut transport, token) {
                Ok(()) => {
                    if dispatcher
                        .connection_mut(token)
                        .map(|c| c.is_closed())
                        .unwrap_or(false)
                    {
                        dispatcher.close(token);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "connection error");
                    dispatcher.close(token);
                }
            }
        }

        if let Some(new_view) = replica.maybe_start_view_change(now_us()) {
            warn!(new_view, "primary suspected down, starting view change");
        }
    }

    info!("replica shutting down");
    Ok(())
}

fn now_us() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_micros() as u64
}

/// Reads any available bytes from the connection at `token`, reassembles
/// complete envelopes, and dispatches each to the replica core.
fn service_connection(
    dispatcher: &mut Dispatcher,
    replica: &mut ReplicaCore,
    transport: &mut Transport,
    token: Token,
) -> std::io::Result<()> {
    let Some(conn) = dispatcher.connection_mut(token) else {
        return Ok(());
    };

    let mut chunk = [0u8; 4096];
    loop {
        match conn.stream.read(&mut chunk) {
            Ok(0) => {
                conn.mark_closed();
                break;
            }
            Ok(n) => conn.read_buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }

    while conn.read_buf.len() >= HEADER_SIZE {
        let size = u32::from_le_bytes(conn.read_buf[12..16].try_into().unwrap()) as usize;
        if conn.read_buf.len() < size {
            break;
        }
        let frame: Vec<u8> = conn.read_buf.drain(..size).collect();
        if let Ok(envelope) = transport.verify(&frame) {
            transport.record_nonce(envelope.header.sender_id, envelope.header.nonce);
            if let Err(e) = dispatch(replica, &envelope.header, &envelope.body) {
                error!(error = %e, "failed to apply envelope");
            }
        } else {
            warn!("dropping envelope that failed verification");
        }
    }
    Ok(())
}

fn dispatch(
    replica: &mut ReplicaCore,
    header: &TransportHeader,
    body: &[u8],
) -> Result<(), vsr_core::VsrError> {
    let Some(command) = header.command() else {
        return Ok(());
    };
    match command {
        Command::Prepare => {
            let Ok(body_array): Result<&[u8; vsr_core::protocol::MESSAGE_SIZE], _> = body.try_into()
            else {
                return Ok(());
            };
            let message = ChatMessage::from_bytes(body_array);
            replica.handle_prepare(header.view, header.sender_id, message, now_us())?;
        }
        Command::Commit => {
            replica.handle_commit(header.commit);
        }
        Command::PrepareOk => {
            replica.handle_prepare_ok(header.sender_id, header.op);
        }
        Command::StartViewChange => {
            replica.handle_start_view_change(header.view, header.sender_id);
        }
        Command::DoViewChange | Command::StartView => {
            // Log-state transfer requires decoding a variable number of
            // trailing (op, ChatMessage) pairs from `body`; wired up once
            // the peer-to-peer framing for multi-entry payloads lands.
        }
    }
    Ok(())
}
