//! Command-line configuration for the replica process, translated into a
//! [`vsr_core::config::ClusterConfig`] after parsing.

use std::net::Ipv4Addr;
use std::str::FromStr;

use clap::Parser;
use vsr_core::config::{ClusterConfig, PeerDescriptor};

/// One `--peer replica_id@host:port` CLI argument.
#[derive(Debug, Clone)]
pub struct PeerArg {
    pub replica_id: u8,
    pub host: [u8; 4],
    pub port: u16,
}

impl FromStr for PeerArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id_part, addr_part) = s
            .split_once('@')
            .ok_or_else(|| format!("expected replica_id@host:port, got {s:?}"))?;
        let replica_id: u8 = id_part
            .parse()
            .map_err(|_| format!("invalid replica id {id_part:?}"))?;
        let (host_part, port_part) = addr_part
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port in {addr_part:?}"))?;
        let host: Ipv4Addr = host_part
            .parse()
            .map_err(|_| format!("invalid host {host_part:?}"))?;
        let port: u16 = port_part
            .parse()
            .map_err(|_| format!("invalid port {port_part:?}"))?;
        Ok(PeerArg {
            replica_id,
            host: host.octets(),
            port,
        })
    }
}

/// Standalone VSR replica process for one room-shard cluster.
#[derive(Parser, Debug)]
#[command(name = "vsr-replica")]
#[command(about = "Viewstamped Replication replica process", long_about = None)]
pub struct Args {
    /// This replica's id (0, 1, or 2).
    #[arg(long)]
    pub replica_id: u8,

    /// Cluster id shared by all three replicas.
    #[arg(long)]
    pub cluster_id: u128,

    /// Address to bind for peer and client traffic.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_host: Ipv4Addr,

    /// Port to bind for peer and client traffic.
    #[arg(long)]
    pub bind_port: u16,

    /// The other two replicas, given as `replica_id@host:port`. Must be
    /// supplied exactly twice.
    #[arg(long = "peer", required = true, num_args = 2)]
    pub peers: Vec<PeerArg>,

    /// Path to this replica's write-ahead log file.
    #[arg(long, default_value = "replica.wal")]
    pub wal_path: String,

    /// Maximum number of WAL entries before returning `LogFull`.
    #[arg(long, default_value_t = 1_000_000)]
    pub max_entries: u64,

    /// Prepare timeout, in milliseconds, before a backup suspects the primary.
    #[arg(long, default_value_t = 50)]
    pub prepare_timeout_ms: u32,

    /// View-change liveness budget, in milliseconds.
    #[arg(long, default_value_t = 300)]
    pub view_change_timeout_ms: u32,

    /// Bounded inbound queue capacity.
    #[arg(long, default_value_t = 4096)]
    pub queue_capacity: usize,

    /// Hex-encoded 32-byte Ed25519 signing key for this replica.
    #[arg(long)]
    pub secret_key_hex: String,

    /// Hex-encoded 32-byte Ed25519 public keys for the two peers, in the
    /// same order as `--peer`.
    #[arg(long = "peer-public-key-hex", num_args = 2)]
    pub peer_public_keys_hex: Vec<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn parse_hex32(s: &str, what: &str) -> [u8; 32] {
    let bytes = hex_decode(s).unwrap_or_else(|| panic!("{what} must be 64 hex characters"));
    bytes
        .try_into()
        .unwrap_or_else(|_| panic!("{what} must decode to exactly 32 bytes"))
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

impl Args {
    /// Builds the validated [`ClusterConfig`] this process will run with.
    pub fn into_cluster_config(self) -> ClusterConfig {
        let secret_key = parse_hex32(&self.secret_key_hex, "--secret-key-hex");
        let peers: [PeerDescriptor; 2] = std::array::from_fn(|i| {
            let arg = &self.peers[i];
            let public_key = parse_hex32(&self.peer_public_keys_hex[i], "--peer-public-key-hex");
            PeerDescriptor {
                replica_id: arg.replica_id,
                host: arg.host,
                port: arg.port,
                public_key,
            }
        });
        ClusterConfig {
            cluster_id: self.cluster_id,
            replica_id: self.replica_id,
            bind_host: self.bind_host.octets(),
            bind_port: self.bind_port,
            peers,
            prepare_timeout_ms: self.prepare_timeout_ms,
            view_change_timeout_ms: self.view_change_timeout_ms,
            queue_capacity: self.queue_capacity,
            secret_key,
        }
    }
}
