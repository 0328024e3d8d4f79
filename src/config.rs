//! Node configuration: a YAML file plus defaults.
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::consts;
use crate::error::Error;
use crate::error::Result;

lazy_static::lazy_static! {
    static ref DEFAULT_STORE_ROOT: String = default_store_location(".ringkv", "data");
}

fn default_store_location<P>(prefix: P, path: P) -> String
where P: AsRef<std::path::Path> {
    let home_dir = env::var_os("HOME").map(PathBuf::from);
    let expect = match home_dir {
        Some(dir) => dir.join(prefix).join(path),
        None => std::path::Path::new("data").join(prefix).join(path),
    };
    expect.to_str().unwrap().to_string()
}

/// Expand a leading `~` to the home directory.
pub fn expand_home<P>(path: P) -> PathBuf
where P: AsRef<std::path::Path> {
    match path.as_ref().strip_prefix("~") {
        Ok(stripped) => {
            let home_dir = env::var_os("HOME").map(PathBuf::from);
            match home_dir {
                Some(mut p) => {
                    p.push(stripped);
                    p
                }
                None => path.as_ref().to_owned(),
            }
        }
        Err(_) => path.as_ref().to_owned(),
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Listen address of the rpc endpoint.
    pub bind: String,
    /// Host name other peers dial; the bind host when absent. Feeds the
    /// node id derivation, so it must be stable across restarts.
    #[serde(default)]
    pub external_host: Option<String>,
    /// `host:port` of the node to attach through. Absent means found a
    /// ring of one.
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub ring: RingConfig,
    #[serde(default)]
    pub periods: PeriodConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RingConfig {
    /// Successor list length.
    #[serde(default = "default_successor_list_max")]
    pub successor_list_max: usize,
    /// Finger table size; capped by the 64-bit id space.
    #[serde(default = "default_finger_bits")]
    pub finger_bits: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeriodConfig {
    #[serde(default = "default_stabilize_successors_ms")]
    pub stabilize_successors_ms: u64,
    #[serde(default = "default_stabilize_predecessor_ms")]
    pub stabilize_predecessor_ms: u64,
    #[serde(default = "default_fix_fingers_ms")]
    pub fix_fingers_ms: u64,
    #[serde(default = "default_rejoin_ms")]
    pub rejoin_ms: u64,
    #[serde(default = "default_replicate_ms")]
    pub replicate_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

/// Store backend selection.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Root directory of the file backend.
    #[serde(default = "default_store_root")]
    pub path: String,
}

fn default_successor_list_max() -> usize {
    consts::SUCCESSOR_LIST_MAX
}

fn default_finger_bits() -> usize {
    consts::FINGER_BITS
}

fn default_stabilize_successors_ms() -> u64 {
    consts::STABILIZE_SUCCESSORS_MS
}

fn default_stabilize_predecessor_ms() -> u64 {
    consts::STABILIZE_PREDECESSOR_MS
}

fn default_fix_fingers_ms() -> u64 {
    consts::FIX_FINGERS_MS
}

fn default_rejoin_ms() -> u64 {
    consts::REJOIN_MS
}

fn default_replicate_ms() -> u64 {
    consts::REPLICATE_MS
}

fn default_retry_budget() -> u32 {
    consts::RETRY_BUDGET
}

fn default_rpc_timeout_ms() -> u64 {
    consts::RPC_TIMEOUT_MS
}

fn default_backend() -> BackendKind {
    BackendKind::Memory
}

fn default_store_root() -> String {
    DEFAULT_STORE_ROOT.clone()
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            successor_list_max: default_successor_list_max(),
            finger_bits: default_finger_bits(),
        }
    }
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            stabilize_successors_ms: default_stabilize_successors_ms(),
            stabilize_predecessor_ms: default_stabilize_predecessor_ms(),
            fix_fingers_ms: default_fix_fingers_ms(),
            rejoin_ms: default_rejoin_ms(),
            replicate_ms: default_replicate_ms(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            retry_budget: default_retry_budget(),
            timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_root(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: consts::DEFAULT_BIND_ADDRESS.to_string(),
            external_host: None,
            seed: None,
            ring: RingConfig::default(),
            periods: PeriodConfig::default(),
            rpc: RpcConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path);
        if let Some(parent) = path.parent() {
            if !parent.is_dir() {
                fs::create_dir_all(parent).map_err(|e| Error::WriteConfig(e.to_string()))?;
            }
        }
        let f = fs::File::create(path.as_path()).map_err(|e| Error::WriteConfig(e.to_string()))?;
        let writer = io::BufWriter::new(f);
        serde_yaml::to_writer(writer, self).map_err(|e| Error::WriteConfig(e.to_string()))?;
        Ok(path.to_string_lossy().into_owned())
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path);
        tracing::debug!(path = %path.display(), "reading config");
        let f = fs::File::open(path).map_err(|e| Error::OpenConfig(e.to_string()))?;
        let reader = io::BufReader::new(f);
        serde_yaml::from_reader(reader).map_err(|e| Error::ParseConfig(e.to_string()))
    }
}
