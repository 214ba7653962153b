// Veilnet core — peer directory and onion-circuit relay layer
//
// What lives here: signed router contacts and their wire format, the
// directory of verified peers with its trust tiers and connection policy,
// the relay message codec with circuit dispatch, and the execution
// contexts that serialize all of it onto dedicated threads.

pub mod contact;
pub mod directory;
pub mod exec;
pub mod identity;
pub mod net;
pub mod relay;
pub mod time;
pub mod wire;

/// Initialize tracing output (idempotent). `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

pub use contact::{
    ContactError, RouterContact, VerifyOptions, CONTACT_LIFETIME_MS, CONTACT_VERSION,
    MAX_CONTACT_SIZE,
};
pub use directory::{Directory, DirectoryConfig, Role};
pub use exec::{DiskExecutor, DiskHandle, ExecContext, ExecError, ExecHandle};
pub use identity::{Distance, Keypair, PathId, RouterId, PATH_ID_LEN, ROUTER_ID_LEN};
pub use relay::{
    CircuitHop, CircuitTable, ProtocolError, RelayFrame, RelayMessage, NONCE_LEN,
    RELAY_PROTO_VERSION,
};
pub use time::now_ms;
