//! Locating the daemon's RPC socket.
//!
//! Resolution order for a configured path:
//! 1. The path itself, if it is a socket
//! 2. `<path>/lightning-rpc` (a network directory)
//! 3. `<path>/bitcoin/lightning-rpc` (a data directory; deprecated)
//! 4. The path unchanged, left for the reconnect loop to keep trying

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use crate::error::ClientError;

/// File name of the daemon's RPC socket.
pub const RPC_FILE_NAME: &str = "lightning-rpc";

/// Network subdirectory used when only the data directory is given.
const MAINNET_DIR: &str = "bitcoin";

/// Default location of the daemon's data directory.
///
/// Resolution order:
/// 1. `$LIGHTNING_DIR`
/// 2. `~/.lightning`
/// 3. `/tmp/.lightning` (fallback)
pub fn default_rpc_path() -> PathBuf {
    if let Some(dir) = std::env::var_os("LIGHTNING_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".lightning");
    }

    PathBuf::from("/tmp/.lightning")
}

/// Resolve a configured path to the socket to connect to.
///
/// # Errors
///
/// Returns `ClientError::InvalidPath` if `rpc_path` is relative.
pub fn resolve_rpc_path(rpc_path: &Path) -> Result<PathBuf, ClientError> {
    if !rpc_path.is_absolute() {
        return Err(ClientError::InvalidPath {
            path: rpc_path.to_path_buf(),
            reason: "the rpc path must be absolute",
        });
    }

    if is_socket(rpc_path) {
        return Ok(rpc_path.to_path_buf());
    }

    let network_socket = rpc_path.join(RPC_FILE_NAME);
    if network_socket.exists() {
        return Ok(network_socket);
    }

    let mainnet_socket = rpc_path.join(MAINNET_DIR).join(RPC_FILE_NAME);
    if mainnet_socket.exists() {
        tracing::warn!(
            "{} is missing, using the bitcoin mainnet subdirectory at {} instead",
            network_socket.display(),
            mainnet_socket.display()
        );
        tracing::warn!(
            "specifying the main lightning data directory is deprecated, \
             please specify the network directory explicitly"
        );
        return Ok(mainnet_socket);
    }

    Ok(rpc_path.to_path_buf())
}

fn is_socket(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false)
}
