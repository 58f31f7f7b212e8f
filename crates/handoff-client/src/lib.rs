//! Client side of the shared handoff store
//!
//! Connection patterns, in the order [`StorageCoordinator`] tries them:
//!
//! 1. **Explicit standalone**: `HANDOFF_SERVER=none` skips discovery and
//!    uses the process-local store.
//! 2. **Explicit server**: `HANDOFF_SERVER=<url>` talks to that server only.
//! 3. **Auto-connect**: scan the port range for a running server, or start
//!    one in the background on the first free port and wait for it.
//! 4. **Standalone fallback**: when auto-connect finds nothing, use the
//!    process-local store until a later retry succeeds.
//!
//! Server detection is HTTP-based:
//! - `GET /` answers with the server's identity -> compatible server running
//! - connection refused, timeout or a foreign answer -> nothing usable there

pub mod autoconnect;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod launcher;
pub mod remote;

pub use autoconnect::{AutoConnect, AutoConnectResult, ServerDiscovery};
pub use config::{ConnectionConfig, ServerSetting};
pub use coordinator::{
    DiscoveryCache, DiscoveryContext, StorageCoordinator, StorageHandle, StorageMode,
};
pub use discovery::{find_free_port, probe_port, scan_for_server, scan_ports, SCAN_BATCH_SIZE};
pub use launcher::{ProcessLauncher, ServerLauncher};
pub use remote::{ReconnectFn, RemoteClient};
