// Signed router contacts — parsing, verification, signing
//
// A contact is the self-contained, signature-verifiable description of a
// router's reachable address and validity window. Construction is
// all-or-nothing: a contact either fully verifies or it does not exist.

use crate::identity::{Keypair, RouterId, ROUTER_ID_LEN};
use crate::net;
use crate::wire::{DictReader, DictWriter, Value, WireError};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use thiserror::Error;

/// Hard cap on a serialized contact; oversize input is a read failure,
/// never a partial record.
pub const MAX_CONTACT_SIZE: usize = 1024;

/// How long a contact stays valid after its own creation timestamp
pub const CONTACT_LIFETIME_MS: u64 = 6 * 60 * 60 * 1000;

/// Contact format version, compared for exact equality
pub const CONTACT_VERSION: u64 = 0;

const KEY_ADDR: &[u8] = b"a";
const KEY_IDENT: &[u8] = b"i";
const KEY_TIMESTAMP: &[u8] = b"t";
const KEY_VERSION: &[u8] = b"v";
const KEY_SIGNATURE: &[u8] = b"~";

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("malformed contact: {0}")]
    Wire(#[from] WireError),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("duplicate field '{0}'")]
    DuplicateField(&'static str),
    #[error("invalid field '{0}'")]
    InvalidField(&'static str),
    #[error("contact version {0} not supported")]
    VersionMismatch(u64),
    #[error("invalid signature length {0}, expected 64")]
    BadSignatureLength(usize),
    #[error("signature field must be the final entry")]
    SignatureNotLast,
    #[error("signature verification failed")]
    BadSignature,
    #[error("contact expired (created {0} ms)")]
    Expired(u64),
    #[error("bogon address rejected: {0}")]
    Bogon(IpAddr),
    #[error("contact file too large ({0} bytes)")]
    Oversize(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Verification policy knobs.
///
/// `block_bogons` is the explicit form of the original compile-time bogon
/// switch; tests and operators of closed overlays can turn it off.
#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions {
    pub block_bogons: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self { block_bogons: true }
    }
}

/// A verified, immutable router contact.
///
/// Retains the exact canonical payload it was parsed from so it can be
/// re-verified or persisted later without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterContact {
    router_id: RouterId,
    addr: SocketAddr,
    timestamp: u64,
    version: u64,
    signature: [u8; 64],
    payload: Vec<u8>,
}

fn field_name(key: &[u8]) -> &'static str {
    match key {
        KEY_ADDR => "a",
        KEY_IDENT => "i",
        KEY_TIMESTAMP => "t",
        KEY_VERSION => "v",
        KEY_SIGNATURE => "~",
        _ => "?",
    }
}

struct ParsedContact {
    router_id: RouterId,
    addr: SocketAddr,
    timestamp: u64,
    version: u64,
    signature: [u8; 64],
    sig_key_start: usize,
}

impl RouterContact {
    /// Parse and verify a contact received from the network.
    ///
    /// Strict entry point: an already-expired contact is rejected outright.
    pub fn from_wire(bytes: &[u8], opts: &VerifyOptions, now: u64) -> Result<Self, ContactError> {
        Self::verify_impl(bytes, true, opts, now)
    }

    /// Read and verify a contact file.
    ///
    /// Enforces `MAX_CONTACT_SIZE`; oversize or truncated files fail as a
    /// whole. Expired contacts are accepted here — startup loads them and
    /// the periodic tick sweeps them — so a node that was offline past the
    /// lifetime window still remembers whom to ask for fresh records.
    pub fn read_from_file(
        path: &Path,
        opts: &VerifyOptions,
        now: u64,
    ) -> Result<Self, ContactError> {
        // check the length up front so an oversize file is never buffered
        let len = std::fs::metadata(path)?.len();
        if len > MAX_CONTACT_SIZE as u64 {
            return Err(ContactError::Oversize(len as usize));
        }
        let bytes = std::fs::read(path)?;
        if bytes.len() > MAX_CONTACT_SIZE {
            return Err(ContactError::Oversize(bytes.len()));
        }
        Self::verify_impl(&bytes, false, opts, now)
    }

    /// Re-run full verification over the retained payload.
    ///
    /// `reject_expired` is caller-supplied: freshness policy for a cached
    /// contact differs from first-seen policy, so the strictness is an
    /// explicit parameter rather than a baked-in default.
    pub fn reverify(
        &self,
        reject_expired: bool,
        opts: &VerifyOptions,
        now: u64,
    ) -> Result<(), ContactError> {
        Self::verify_impl(&self.payload, reject_expired, opts, now).map(|_| ())
    }

    /// Build and sign a fresh contact for this node's own identity
    pub fn sign_new(
        keys: &Keypair,
        addr: SocketAddr,
        timestamp: u64,
        opts: &VerifyOptions,
    ) -> Result<Self, ContactError> {
        if opts.block_bogons && net::is_bogon(addr.ip()) {
            return Err(ContactError::Bogon(addr.ip()));
        }
        let router_id = keys.router_id();

        let mut writer = DictWriter::new();
        writer
            .append_str("a", &addr.to_string())
            .append_bytes("i", router_id.as_bytes())
            .append_int("t", timestamp)
            .append_int("v", CONTACT_VERSION);

        let signature = keys.sign(&writer.clone().finish());
        writer.append_bytes("~", &signature);

        Ok(Self {
            router_id,
            addr,
            timestamp,
            version: CONTACT_VERSION,
            signature,
            payload: writer.finish(),
        })
    }

    fn verify_impl(
        bytes: &[u8],
        reject_expired: bool,
        opts: &VerifyOptions,
        now: u64,
    ) -> Result<Self, ContactError> {
        let parsed = Self::decode(bytes)?;

        if reject_expired && now >= parsed.timestamp.saturating_add(CONTACT_LIFETIME_MS) {
            return Err(ContactError::Expired(parsed.timestamp));
        }
        if opts.block_bogons && net::is_bogon(parsed.addr.ip()) {
            return Err(ContactError::Bogon(parsed.addr.ip()));
        }

        // The signed message is the canonical encoding with the signature
        // entry spliced out; '~' sorts last, so that is the prefix before
        // its key plus the closing 'e'.
        let mut message = bytes[..parsed.sig_key_start].to_vec();
        message.push(b'e');

        let verifying_key = VerifyingKey::from_bytes(parsed.router_id.as_bytes())
            .map_err(|_| ContactError::InvalidField("i"))?;
        verifying_key
            .verify(&message, &Signature::from_bytes(&parsed.signature))
            .map_err(|_| ContactError::BadSignature)?;

        Ok(Self {
            router_id: parsed.router_id,
            addr: parsed.addr,
            timestamp: parsed.timestamp,
            version: parsed.version,
            signature: parsed.signature,
            payload: bytes.to_vec(),
        })
    }

    fn decode(bytes: &[u8]) -> Result<ParsedContact, ContactError> {
        let mut reader = DictReader::new(bytes)?;

        let mut addr: Option<SocketAddr> = None;
        let mut router_id: Option<RouterId> = None;
        let mut timestamp: Option<u64> = None;
        let mut version: Option<u64> = None;
        let mut signature: Option<([u8; 64], usize)> = None;

        while let Some(entry) = reader.next_entry()? {
            if signature.is_some() {
                return Err(ContactError::SignatureNotLast);
            }
            match (entry.key, entry.value) {
                (KEY_ADDR, Value::Bytes(raw)) => {
                    if addr.is_some() {
                        return Err(ContactError::DuplicateField("a"));
                    }
                    let text = std::str::from_utf8(raw)
                        .map_err(|_| ContactError::InvalidField("a"))?;
                    addr = Some(text.parse().map_err(|_| ContactError::InvalidField("a"))?);
                }
                (KEY_IDENT, Value::Bytes(raw)) => {
                    if router_id.is_some() {
                        return Err(ContactError::DuplicateField("i"));
                    }
                    let id: [u8; ROUTER_ID_LEN] =
                        raw.try_into().map_err(|_| ContactError::InvalidField("i"))?;
                    router_id = Some(RouterId::from_bytes(id));
                }
                (KEY_TIMESTAMP, Value::Int(value)) => {
                    if timestamp.is_some() {
                        return Err(ContactError::DuplicateField("t"));
                    }
                    timestamp = Some(value);
                }
                (KEY_VERSION, Value::Int(value)) => {
                    if version.is_some() {
                        return Err(ContactError::DuplicateField("v"));
                    }
                    if value != CONTACT_VERSION {
                        return Err(ContactError::VersionMismatch(value));
                    }
                    version = Some(value);
                }
                (KEY_SIGNATURE, Value::Bytes(raw)) => {
                    if raw.len() != 64 {
                        return Err(ContactError::BadSignatureLength(raw.len()));
                    }
                    let mut sig = [0u8; 64];
                    sig.copy_from_slice(raw);
                    signature = Some((sig, entry.key_start));
                }
                (key @ (KEY_ADDR | KEY_IDENT | KEY_TIMESTAMP | KEY_VERSION | KEY_SIGNATURE), _) => {
                    return Err(ContactError::InvalidField(field_name(key)));
                }
                // unknown fields are skipped but remain part of the
                // signed region via the raw-byte splice
                _ => {}
            }
        }

        let (signature, sig_key_start) =
            signature.ok_or(ContactError::MissingField("~"))?;
        Ok(ParsedContact {
            router_id: router_id.ok_or(ContactError::MissingField("i"))?,
            addr: addr.ok_or(ContactError::MissingField("a"))?,
            timestamp: timestamp.ok_or(ContactError::MissingField("t"))?,
            version: version.ok_or(ContactError::MissingField("v"))?,
            signature,
            sig_key_start,
        })
    }

    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Creation timestamp in unix milliseconds
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    pub fn expires_at(&self) -> u64 {
        self.timestamp.saturating_add(CONTACT_LIFETIME_MS)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at()
    }

    /// The exact canonical payload this contact was parsed from
    pub fn encode(&self) -> &[u8] {
        &self.payload
    }
}
