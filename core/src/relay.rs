// Path-relay message protocol — frame codec and circuit dispatch
//
// Upstream and downstream circuit traffic share one wire shape; the
// direction tag decides which dispatch index resolves the live circuit.
// Unresolvable frames are dropped without any response: absence usually
// means the circuit already expired, and answering would let an adversary
// probe for live paths.

use crate::identity::{PathId, RouterId, PATH_ID_LEN};
use crate::wire::{DictReader, DictWriter, Value, WireError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Relay protocol version, compared for exact equality
pub const RELAY_PROTO_VERSION: u64 = 0;

/// Length of the per-frame tunnel nonce
pub const NONCE_LEN: usize = 32;

const KEY_DIRECTION: &[u8] = b"a";
const KEY_PATH_ID: &[u8] = b"p";
const KEY_VERSION: &[u8] = b"v";
const KEY_PAYLOAD: &[u8] = b"x";
const KEY_NONCE: &[u8] = b"y";

const TAG_UPSTREAM: &[u8] = b"u";
const TAG_DOWNSTREAM: &[u8] = b"d";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed relay message: {0}")]
    Wire(#[from] WireError),
    #[error("missing field '{0}'")]
    MissingField(char),
    #[error("duplicate field '{0}'")]
    DuplicateField(char),
    #[error("invalid field '{0}'")]
    InvalidField(char),
    #[error("unknown direction tag")]
    UnknownDirection,
    #[error("protocol version {0} not supported")]
    VersionMismatch(u64),
}

/// The shared body of an upstream/downstream relay message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    pub path_id: PathId,
    pub nonce: [u8; NONCE_LEN],
    /// Opaque encrypted cell; this layer never interprets it
    pub payload: Vec<u8>,
}

/// A circuit-traffic message, tagged by direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Forward traffic, flowing away from the originator
    Upstream(RelayFrame),
    /// Return traffic, flowing back toward the originator
    Downstream(RelayFrame),
}

impl RelayMessage {
    pub fn frame(&self) -> &RelayFrame {
        match self {
            RelayMessage::Upstream(frame) | RelayMessage::Downstream(frame) => frame,
        }
    }

    fn direction_tag(&self) -> &'static str {
        match self {
            RelayMessage::Upstream(_) => "u",
            RelayMessage::Downstream(_) => "d",
        }
    }

    /// Canonical encoding: keys in ascending order, no padding, no defaults
    pub fn encode(&self) -> Vec<u8> {
        let frame = self.frame();
        let mut writer = DictWriter::new();
        writer
            .append_str("a", self.direction_tag())
            .append_bytes("p", frame.path_id.as_bytes())
            .append_int("v", RELAY_PROTO_VERSION)
            .append_bytes("x", &frame.payload)
            .append_bytes("y", &frame.nonce);
        writer.finish()
    }

    /// Decode a relay message.
    ///
    /// Fields are accepted in any order; unrecognized fields are ignored;
    /// a missing or duplicated required field, or a version that is not an
    /// exact match, fails the whole message.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = DictReader::new(bytes)?;

        let mut upstream: Option<bool> = None;
        let mut path_id: Option<PathId> = None;
        let mut version: Option<u64> = None;
        let mut payload: Option<Vec<u8>> = None;
        let mut nonce: Option<[u8; NONCE_LEN]> = None;

        while let Some(entry) = reader.next_entry()? {
            match (entry.key, entry.value) {
                (KEY_DIRECTION, Value::Bytes(raw)) => {
                    if upstream.is_some() {
                        return Err(ProtocolError::DuplicateField('a'));
                    }
                    upstream = Some(match raw {
                        TAG_UPSTREAM => true,
                        TAG_DOWNSTREAM => false,
                        _ => return Err(ProtocolError::UnknownDirection),
                    });
                }
                (KEY_PATH_ID, Value::Bytes(raw)) => {
                    if path_id.is_some() {
                        return Err(ProtocolError::DuplicateField('p'));
                    }
                    let id: [u8; PATH_ID_LEN] =
                        raw.try_into().map_err(|_| ProtocolError::InvalidField('p'))?;
                    path_id = Some(PathId::from_bytes(id));
                }
                (KEY_VERSION, Value::Int(value)) => {
                    if version.is_some() {
                        return Err(ProtocolError::DuplicateField('v'));
                    }
                    if value != RELAY_PROTO_VERSION {
                        return Err(ProtocolError::VersionMismatch(value));
                    }
                    version = Some(value);
                }
                (KEY_PAYLOAD, Value::Bytes(raw)) => {
                    if payload.is_some() {
                        return Err(ProtocolError::DuplicateField('x'));
                    }
                    payload = Some(raw.to_vec());
                }
                (KEY_NONCE, Value::Bytes(raw)) => {
                    if nonce.is_some() {
                        return Err(ProtocolError::DuplicateField('y'));
                    }
                    let n: [u8; NONCE_LEN] =
                        raw.try_into().map_err(|_| ProtocolError::InvalidField('y'))?;
                    nonce = Some(n);
                }
                (key @ (KEY_DIRECTION | KEY_PATH_ID | KEY_VERSION | KEY_PAYLOAD | KEY_NONCE), _) => {
                    return Err(ProtocolError::InvalidField(key[0] as char));
                }
                _ => {} // unrecognized field, ignore
            }
        }

        version.ok_or(ProtocolError::MissingField('v'))?;
        let frame = RelayFrame {
            path_id: path_id.ok_or(ProtocolError::MissingField('p'))?,
            nonce: nonce.ok_or(ProtocolError::MissingField('y'))?,
            payload: payload.ok_or(ProtocolError::MissingField('x'))?,
        };
        match upstream.ok_or(ProtocolError::MissingField('a'))? {
            true => Ok(RelayMessage::Upstream(frame)),
            false => Ok(RelayMessage::Downstream(frame)),
        }
    }
}

/// Live circuit state at one hop.
///
/// Implementations own the per-hop crypto and forwarding; this layer only
/// routes frames to them.
pub trait CircuitHop: Send + Sync {
    fn handle_upstream(&self, payload: &[u8], nonce: &[u8; NONCE_LEN]);
    fn handle_downstream(&self, payload: &[u8], nonce: &[u8; NONCE_LEN]);
}

/// Dispatch tables for live circuits at this hop.
///
/// The downstream index is keyed by the hop forward traffic arrives *from*;
/// the upstream index by the hop return traffic arrives from.
#[derive(Default)]
pub struct CircuitTable {
    by_downstream: HashMap<(RouterId, PathId), Arc<dyn CircuitHop>>,
    by_upstream: HashMap<(RouterId, PathId), Arc<dyn CircuitHop>>,
}

impl CircuitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the hop reached when `peer` sends us upstream traffic on
    /// `path_id`
    pub fn insert_downstream(&mut self, peer: RouterId, path_id: PathId, hop: Arc<dyn CircuitHop>) {
        self.by_downstream.insert((peer, path_id), hop);
    }

    /// Register the hop reached when `peer` sends us downstream traffic on
    /// `path_id`
    pub fn insert_upstream(&mut self, peer: RouterId, path_id: PathId, hop: Arc<dyn CircuitHop>) {
        self.by_upstream.insert((peer, path_id), hop);
    }

    /// Drop all state for a circuit segment
    pub fn remove(&mut self, peer: &RouterId, path_id: &PathId) {
        self.by_downstream.remove(&(*peer, *path_id));
        self.by_upstream.remove(&(*peer, *path_id));
    }

    pub fn is_empty(&self) -> bool {
        self.by_downstream.is_empty() && self.by_upstream.is_empty()
    }

    /// Route a decoded message from `peer` to its live circuit.
    ///
    /// A message with no matching circuit is dropped silently: the circuit
    /// most likely expired, and signaling failure would leak liveness.
    pub fn dispatch(&self, peer: &RouterId, message: &RelayMessage) {
        match message {
            RelayMessage::Upstream(frame) => {
                match self.by_downstream.get(&(*peer, frame.path_id)) {
                    Some(hop) => hop.handle_upstream(&frame.payload, &frame.nonce),
                    None => {
                        tracing::trace!(peer = %peer, path = %frame.path_id, "dropping upstream frame for unknown circuit");
                    }
                }
            }
            RelayMessage::Downstream(frame) => {
                match self.by_upstream.get(&(*peer, frame.path_id)) {
                    Some(hop) => hop.handle_downstream(&frame.payload, &frame.nonce),
                    None => {
                        tracing::trace!(peer = %peer, path = %frame.path_id, "dropping downstream frame for unknown circuit");
                    }
                }
            }
        }
    }
}
