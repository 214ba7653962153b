// Router directory — the peer database
//
// In-memory map of identity → verified contact plus the trust-tier sets
// that drive connection policy. All mutation is expected to run inside one
// execution context (see `exec`); nothing in here takes a lock. Disk I/O
// happens off-path through the disk executor and is fire-and-forget: the
// in-memory state is authoritative, the on-disk mirror eventually catches
// up at the next flush.

use crate::contact::{RouterContact, VerifyOptions};
use crate::exec::DiskHandle;
use crate::identity::RouterId;
use crate::time::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extension of one-contact-per-file storage under the root directory
pub const CONTACT_FILE_EXT: &str = "signed";

/// Default period between scheduled full flushes
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Which policy table applies to this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Edge node originating circuits
    Client,
    /// Registered relay carrying third-party traffic
    Relay,
}

/// Operator configuration for the directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Storage root for contact files; `None` keeps the directory
    /// memory-only
    pub root: Option<PathBuf>,
    pub role: Role,
    /// Operator-restricted allowed first hops; empty means unrestricted
    pub pinned_edges: Vec<RouterId>,
    /// Reject contacts announcing private/reserved addresses
    pub block_bogons: bool,
    pub flush_interval_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            root: None,
            role: Role::Client,
            pinned_edges: Vec::new(),
            block_bogons: true,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

struct Entry {
    rc: Arc<RouterContact>,
    /// Local acceptance time, distinct from the contact's own timestamp.
    /// Set once at insertion.
    inserted_at: u64,
}

struct Persist {
    root: PathBuf,
    disk: DiskHandle,
}

/// The router directory
pub struct Directory {
    entries: HashMap<RouterId, Entry>,
    role: Role,
    verify: VerifyOptions,
    flush_interval_ms: u64,
    next_flush_at: u64,
    persist: Option<Persist>,

    bootstraps: HashMap<RouterId, Arc<RouterContact>>,

    // trust tiers, replaced wholesale by the external reputation feed
    whitelist: HashSet<RouterId>,
    greylist: HashSet<RouterId>,
    greenlist: HashSet<RouterId>,
    registered: HashSet<RouterId>,
    pinned_edges: HashSet<RouterId>,
}

impl Directory {
    pub fn new(config: &DirectoryConfig, disk: DiskHandle) -> Self {
        Self {
            entries: HashMap::new(),
            role: config.role,
            verify: VerifyOptions {
                block_bogons: config.block_bogons,
            },
            flush_interval_ms: config.flush_interval_ms,
            next_flush_at: 0,
            persist: config.root.clone().map(|root| Persist { root, disk }),
            bootstraps: HashMap::new(),
            whitelist: HashSet::new(),
            greylist: HashSet::new(),
            greenlist: HashSet::new(),
            registered: HashSet::new(),
            pinned_edges: config.pinned_edges.iter().copied().collect(),
        }
    }

    /// Memory-only directory, used by tests and single-shot tools
    pub fn in_memory(role: Role) -> Self {
        Self {
            entries: HashMap::new(),
            role,
            verify: VerifyOptions::default(),
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            next_flush_at: 0,
            persist: None,
            bootstraps: HashMap::new(),
            whitelist: HashSet::new(),
            greylist: HashSet::new(),
            greenlist: HashSet::new(),
            registered: HashSet::new(),
            pinned_edges: HashSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // LOOKUPS
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has(&self, id: &RouterId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &RouterId) -> Option<Arc<RouterContact>> {
        self.entries.get(id).map(|entry| entry.rc.clone())
    }

    /// The `min(n, len)` contacts closest to `key` under the XOR metric,
    /// in non-decreasing distance order with ties broken by identity.
    pub fn closest_to(&self, key: &RouterId, n: usize) -> Vec<Arc<RouterContact>> {
        let mut ranked: Vec<_> = self
            .entries
            .iter()
            .map(|(id, entry)| (key.distance(id), *id, entry.rc.clone()))
            .collect();
        ranked.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        ranked.truncate(n);
        ranked.into_iter().map(|(_, _, rc)| rc).collect()
    }

    /// Scan entries in cryptographically shuffled order and return the
    /// first contact the predicate accepts.
    ///
    /// The shuffle removes the positional bias a fixed-order scan would
    /// give long-lived entries.
    pub fn random_matching(
        &self,
        predicate: impl Fn(&RouterContact) -> bool,
    ) -> Option<Arc<RouterContact>> {
        use rand::seq::SliceRandom;
        let mut candidates: Vec<&Entry> = self.entries.values().collect();
        candidates.shuffle(&mut rand::rngs::OsRng);
        candidates
            .into_iter()
            .find(|entry| predicate(&entry.rc))
            .map(|entry| entry.rc.clone())
    }

    /// A uniformly random member of the whitelist, if any
    pub fn random_whitelisted(&self) -> Option<RouterId> {
        use rand::seq::IteratorRandom;
        self.whitelist.iter().choose(&mut rand::rngs::OsRng).copied()
    }

    pub fn visit_all(&self, mut visit: impl FnMut(&RouterContact)) {
        for entry in self.entries.values() {
            visit(&entry.rc);
        }
    }

    pub fn visit_inserted_before(&self, mut visit: impl FnMut(&RouterContact), cutoff: u64) {
        for entry in self.entries.values() {
            if entry.inserted_at < cutoff {
                visit(&entry.rc);
            }
        }
    }

    // ------------------------------------------------------------------
    // MUTATION
    // ------------------------------------------------------------------

    /// Unconditional upsert; schedules asynchronous persistence
    pub fn put(&mut self, rc: RouterContact) {
        let rc = Arc::new(rc);
        self.schedule_write(&rc);
        self.entries.insert(
            rc.router_id(),
            Entry {
                rc,
                inserted_at: now_ms(),
            },
        );
    }

    /// Upsert only if absent or strictly newer by the contact's own
    /// timestamp. Returns whether the contact was stored.
    pub fn put_if_newer(&mut self, rc: RouterContact) -> bool {
        if let Some(existing) = self.entries.get(&rc.router_id()) {
            if rc.timestamp() <= existing.rc.timestamp() {
                return false;
            }
        }
        self.put(rc);
        true
    }

    /// Delete an entry and schedule deletion of its file
    pub fn remove(&mut self, id: &RouterId) -> bool {
        if self.entries.remove(id).is_none() {
            return false;
        }
        self.schedule_remove_files(vec![*id]);
        true
    }

    /// Delete every entry not in `keep` whose `inserted_at` is strictly
    /// before `cutoff`; all file deletions go out as one disk operation.
    pub fn remove_stale(&mut self, keep: &HashSet<RouterId>, cutoff: u64) {
        let stale: Vec<RouterId> = self
            .entries
            .iter()
            .filter(|(id, entry)| !keep.contains(id) && entry.inserted_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.entries.remove(id);
        }
        self.schedule_remove_files(stale);
    }

    /// Generalized sweep: delete every entry whose contact the predicate
    /// accepts, batching the file deletions.
    pub fn remove_if(&mut self, predicate: impl Fn(&RouterContact) -> bool) {
        let removed: Vec<RouterId> = self
            .entries
            .iter()
            .filter(|(_, entry)| predicate(&entry.rc))
            .map(|(id, _)| *id)
            .collect();
        for id in &removed {
            self.entries.remove(id);
        }
        self.schedule_remove_files(removed);
    }

    /// Periodic maintenance: sweep expired contacts and trigger the
    /// scheduled flush
    pub fn tick(&mut self, now: u64) {
        self.remove_if(|rc| rc.is_expired(now));

        if self.next_flush_at == 0 {
            self.next_flush_at = now + self.flush_interval_ms;
        } else if now >= self.next_flush_at {
            self.next_flush_at = now + self.flush_interval_ms;
            self.schedule_flush();
        }
    }

    // ------------------------------------------------------------------
    // TRUST TIERS & POLICY
    // ------------------------------------------------------------------

    /// Replace the funded/decommissioned/understaked tiers in one shot.
    ///
    /// The registered set is recomputed as the union of the three; the
    /// directory never infers membership on its own.
    pub fn set_trust_tiers(
        &mut self,
        whitelist: Vec<RouterId>,
        greylist: Vec<RouterId>,
        greenlist: Vec<RouterId>,
    ) {
        let whitelist: HashSet<_> = whitelist.into_iter().collect();
        let greylist: HashSet<_> = greylist.into_iter().collect();
        let greenlist: HashSet<_> = greenlist.into_iter().collect();

        self.registered = whitelist
            .iter()
            .chain(&greylist)
            .chain(&greenlist)
            .copied()
            .collect();
        self.whitelist = whitelist;
        self.greylist = greylist;
        self.greenlist = greenlist;
    }

    pub fn set_pinned_edges(&mut self, edges: impl IntoIterator<Item = RouterId>) {
        self.pinned_edges = edges.into_iter().collect();
    }

    pub fn set_bootstraps(&mut self, contacts: Vec<RouterContact>) {
        self.bootstraps = contacts
            .into_iter()
            .map(|rc| (rc.router_id(), Arc::new(rc)))
            .collect();
    }

    pub fn whitelist(&self) -> &HashSet<RouterId> {
        &self.whitelist
    }

    pub fn greylist(&self) -> &HashSet<RouterId> {
        &self.greylist
    }

    pub fn greenlist(&self) -> &HashSet<RouterId> {
        &self.greenlist
    }

    pub fn registered(&self) -> &HashSet<RouterId> {
        &self.registered
    }

    pub fn pinned_edges(&self) -> &HashSet<RouterId> {
        &self.pinned_edges
    }

    pub fn is_bootstrap(&self, id: &RouterId) -> bool {
        self.bootstraps.contains_key(id)
    }

    // client: if pinned edges were configured, only those and the
    // bootstrap nodes are allowed; otherwise anyone is.
    //
    // relay: outgoing connections only to registered, funded relays
    // (whitelist and greylist).
    pub fn connection_allowed(&self, id: &RouterId) -> bool {
        match self.role {
            Role::Client => self.client_edge_allowed(id),
            Role::Relay => self.whitelist.contains(id) || self.greylist.contains(id),
        }
    }

    // client: same as connection_allowed.
    //
    // relay: paths are only built through active, non-decommissioned
    // relays (whitelist only).
    pub fn path_build_allowed(&self, id: &RouterId) -> bool {
        match self.role {
            Role::Client => self.client_edge_allowed(id),
            Role::Relay => self.whitelist.contains(id),
        }
    }

    // first hops are a client-side restriction; relays are not limited by
    // this policy.
    pub fn first_hop_allowed(&self, id: &RouterId) -> bool {
        match self.role {
            Role::Client => self.client_edge_allowed(id),
            Role::Relay => true,
        }
    }

    fn client_edge_allowed(&self, id: &RouterId) -> bool {
        self.pinned_edges.is_empty()
            || self.pinned_edges.contains(id)
            || self.bootstraps.contains_key(id)
    }

    // ------------------------------------------------------------------
    // PERSISTENCE
    // ------------------------------------------------------------------

    /// Synchronous startup scan of the storage root.
    ///
    /// Every file is parsed and verified independently; a failing file is
    /// logged and skipped, never aborting the scan. Returns how many
    /// contacts were loaded.
    pub fn load_from_disk(&mut self, now: u64) -> anyhow::Result<usize> {
        let Some(persist) = &self.persist else {
            return Ok(0);
        };
        std::fs::create_dir_all(&persist.root)?;

        let mut loaded = 0usize;
        for dirent in std::fs::read_dir(&persist.root)? {
            let path = match dirent {
                Ok(d) => d.path(),
                Err(e) => {
                    tracing::warn!("unreadable directory entry: {e}");
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some(CONTACT_FILE_EXT) {
                continue;
            }
            match RouterContact::read_from_file(&path, &self.verify, now) {
                Ok(rc) => {
                    self.entries.insert(
                        rc.router_id(),
                        Entry {
                            rc: Arc::new(rc),
                            inserted_at: now,
                        },
                    );
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!("skipping contact file {}: {e}", path.display());
                }
            }
        }
        tracing::info!("loaded {loaded} router contacts from disk");
        Ok(loaded)
    }

    /// Synchronous full dump, for deterministic snapshots such as
    /// shutdown
    pub fn save_to_disk(&self) -> anyhow::Result<()> {
        let Some(persist) = &self.persist else {
            return Ok(());
        };
        std::fs::create_dir_all(&persist.root)?;
        for entry in self.entries.values() {
            let path = contact_path(&persist.root, &entry.rc.router_id());
            if let Err(e) = std::fs::write(&path, entry.rc.encode()) {
                tracing::error!("failed to write {}: {e}", path.display());
            }
        }
        Ok(())
    }

    fn schedule_write(&self, rc: &Arc<RouterContact>) {
        let Some(persist) = &self.persist else {
            return;
        };
        let path = contact_path(&persist.root, &rc.router_id());
        let payload = rc.encode().to_vec();
        persist.disk.submit(move || {
            if let Err(e) = std::fs::write(&path, &payload) {
                tracing::error!("failed to write {}: {e}", path.display());
            }
        });
    }

    fn schedule_remove_files(&self, ids: Vec<RouterId>) {
        if ids.is_empty() {
            return;
        }
        let Some(persist) = &self.persist else {
            return;
        };
        let paths: Vec<PathBuf> = ids
            .iter()
            .map(|id| contact_path(&persist.root, id))
            .collect();
        persist.disk.submit(move || {
            for path in paths {
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::error!("failed to remove {}: {e}", path.display()),
                }
            }
        });
    }

    fn schedule_flush(&self) {
        let Some(persist) = &self.persist else {
            return;
        };
        let files: Vec<(PathBuf, Vec<u8>)> = self
            .entries
            .values()
            .map(|entry| {
                (
                    contact_path(&persist.root, &entry.rc.router_id()),
                    entry.rc.encode().to_vec(),
                )
            })
            .collect();
        persist.disk.submit(move || {
            for (path, payload) in files {
                if let Err(e) = std::fs::write(&path, &payload) {
                    tracing::error!("failed to write {}: {e}", path.display());
                }
            }
        });
    }
}

/// Filename of a contact given its identity: `<hex>.signed` under the root
fn contact_path(root: &Path, id: &RouterId) -> PathBuf {
    root.join(format!("{}.{CONTACT_FILE_EXT}", id.to_hex()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::CONTACT_LIFETIME_MS;
    use crate::identity::Keypair;

    const NOW: u64 = 1_700_000_000_000;

    fn contact_at(timestamp: u64) -> RouterContact {
        let keys = Keypair::generate();
        signed(&keys, timestamp)
    }

    fn signed(keys: &Keypair, timestamp: u64) -> RouterContact {
        RouterContact::sign_new(
            keys,
            "8.8.8.8:1090".parse().unwrap(),
            timestamp,
            &VerifyOptions::default(),
        )
        .unwrap()
    }

    fn id(n: u8) -> RouterId {
        let mut bytes = [0u8; 32];
        bytes[0] = n;
        RouterId::from_bytes(bytes)
    }

    #[test]
    fn test_put_get_has() {
        let mut dir = Directory::in_memory(Role::Client);
        let rc = contact_at(NOW);
        let rid = rc.router_id();

        assert!(!dir.has(&rid));
        dir.put(rc.clone());
        assert!(dir.has(&rid));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(&rid).unwrap().encode(), rc.encode());
    }

    #[test]
    fn test_put_replaces_by_identity() {
        let mut dir = Directory::in_memory(Role::Client);
        let keys = Keypair::generate();

        dir.put(signed(&keys, NOW));
        dir.put(signed(&keys, NOW + 5));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(&keys.router_id()).unwrap().timestamp(), NOW + 5);
    }

    #[test]
    fn test_put_if_newer_is_monotonic() {
        let mut dir = Directory::in_memory(Role::Client);
        let keys = Keypair::generate();
        let rid = keys.router_id();

        assert!(dir.put_if_newer(signed(&keys, NOW)));
        assert!(dir.put_if_newer(signed(&keys, NOW + 10)));
        assert_eq!(dir.get(&rid).unwrap().timestamp(), NOW + 10);

        // older contact is a no-op
        assert!(!dir.put_if_newer(signed(&keys, NOW)));
        assert_eq!(dir.get(&rid).unwrap().timestamp(), NOW + 10);

        // equal timestamp is not strictly newer
        assert!(!dir.put_if_newer(signed(&keys, NOW + 10)));
    }

    #[test]
    fn test_remove() {
        let mut dir = Directory::in_memory(Role::Client);
        let rc = contact_at(NOW);
        let rid = rc.router_id();

        dir.put(rc);
        assert!(dir.remove(&rid));
        assert!(!dir.has(&rid));
        assert!(!dir.remove(&rid));
    }

    #[test]
    fn test_remove_stale_keeps_kept_and_recent() {
        let mut dir = Directory::in_memory(Role::Client);
        let keep_rc = contact_at(NOW);
        let stale_rc = contact_at(NOW);
        let kept_id = keep_rc.router_id();
        let stale_id = stale_rc.router_id();

        dir.put(keep_rc);
        dir.put(stale_rc);

        // cutoff in the future: everything not in keep is stale
        let keep: HashSet<_> = [kept_id].into_iter().collect();
        dir.remove_stale(&keep, now_ms() + 1000);

        assert!(dir.has(&kept_id));
        assert!(!dir.has(&stale_id));
    }

    #[test]
    fn test_remove_stale_respects_cutoff() {
        let mut dir = Directory::in_memory(Role::Client);
        let rc = contact_at(NOW);
        let rid = rc.router_id();
        dir.put(rc);

        // cutoff before insertion: nothing qualifies
        dir.remove_stale(&HashSet::new(), 0);
        assert!(dir.has(&rid));
    }

    #[test]
    fn test_remove_stale_on_empty_directory() {
        let mut dir = Directory::in_memory(Role::Client);
        dir.remove_stale(&HashSet::new(), u64::MAX);
        assert!(dir.is_empty());
    }

    #[test]
    fn test_remove_if_predicate() {
        let mut dir = Directory::in_memory(Role::Client);
        let old = contact_at(NOW);
        let new = contact_at(NOW + 100);
        let old_id = old.router_id();
        let new_id = new.router_id();
        dir.put(old);
        dir.put(new);

        dir.remove_if(|rc| rc.timestamp() == NOW);
        assert!(!dir.has(&old_id));
        assert!(dir.has(&new_id));
    }

    #[test]
    fn test_closest_to_orders_and_caps() {
        let mut dir = Directory::in_memory(Role::Client);
        let mut all = Vec::new();
        for _ in 0..12 {
            let rc = contact_at(NOW);
            all.push(rc.router_id());
            dir.put(rc);
        }
        let key = id(0x55);

        let five = dir.closest_to(&key, 5);
        assert_eq!(five.len(), 5);
        for pair in five.windows(2) {
            assert!(
                key.distance(&pair[0].router_id()) <= key.distance(&pair[1].router_id()),
                "results must be in non-decreasing distance order"
            );
        }

        // no duplicate identities
        let ids: HashSet<_> = five.iter().map(|rc| rc.router_id()).collect();
        assert_eq!(ids.len(), 5);

        // asking for more than we have returns everything
        assert_eq!(dir.closest_to(&key, 100).len(), 12);
    }

    #[test]
    fn test_closest_to_is_deterministic() {
        let mut dir = Directory::in_memory(Role::Client);
        for _ in 0..8 {
            dir.put(contact_at(NOW));
        }
        let key = id(0x11);
        let a: Vec<_> = dir.closest_to(&key, 8).iter().map(|rc| rc.router_id()).collect();
        let b: Vec<_> = dir.closest_to(&key, 8).iter().map(|rc| rc.router_id()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_matching() {
        let mut dir = Directory::in_memory(Role::Client);
        let target = contact_at(NOW + 7);
        let target_id = target.router_id();
        dir.put(target);
        for _ in 0..5 {
            dir.put(contact_at(NOW));
        }

        let found = dir.random_matching(|rc| rc.timestamp() == NOW + 7).unwrap();
        assert_eq!(found.router_id(), target_id);

        assert!(dir.random_matching(|_| false).is_none());
    }

    #[test]
    fn test_visit_inserted_before() {
        let mut dir = Directory::in_memory(Role::Client);
        dir.put(contact_at(NOW));
        dir.put(contact_at(NOW));

        let mut before = 0;
        dir.visit_inserted_before(|_| before += 1, now_ms() + 1000);
        assert_eq!(before, 2);

        let mut after = 0;
        dir.visit_inserted_before(|_| after += 1, 0);
        assert_eq!(after, 0);
    }

    #[test]
    fn test_tick_sweeps_expired() {
        let mut dir = Directory::in_memory(Role::Client);
        let fresh = contact_at(NOW);
        let expired = contact_at(NOW - CONTACT_LIFETIME_MS - 1);
        let fresh_id = fresh.router_id();
        let expired_id = expired.router_id();
        dir.put(fresh);
        dir.put(expired);

        dir.tick(NOW);
        assert!(dir.has(&fresh_id));
        assert!(!dir.has(&expired_id));
    }

    #[test]
    fn test_trust_tiers_replace_wholesale() {
        let mut dir = Directory::in_memory(Role::Relay);
        dir.set_trust_tiers(vec![id(1)], vec![id(2)], vec![id(3)]);

        assert!(dir.whitelist().contains(&id(1)));
        assert!(dir.greylist().contains(&id(2)));
        assert!(dir.greenlist().contains(&id(3)));
        let expected: HashSet<_> = [id(1), id(2), id(3)].into_iter().collect();
        assert_eq!(dir.registered(), &expected);

        // the next snapshot replaces, never merges
        dir.set_trust_tiers(vec![id(4)], vec![], vec![]);
        assert!(!dir.whitelist().contains(&id(1)));
        let expected: HashSet<_> = [id(4)].into_iter().collect();
        assert_eq!(dir.registered(), &expected);
    }

    #[test]
    fn test_relay_policy() {
        let mut dir = Directory::in_memory(Role::Relay);
        dir.set_trust_tiers(vec![id(1)], vec![id(2)], vec![id(3)]);

        // connections: whitelist ∪ greylist
        assert!(dir.connection_allowed(&id(1)));
        assert!(dir.connection_allowed(&id(2)));
        assert!(!dir.connection_allowed(&id(3)));
        assert!(!dir.connection_allowed(&id(9)));

        // path building: whitelist only
        assert!(dir.path_build_allowed(&id(1)));
        assert!(!dir.path_build_allowed(&id(2)));

        // first hops are not restricted for relays
        assert!(dir.first_hop_allowed(&id(9)));
    }

    #[test]
    fn test_client_policy_unrestricted_without_pins() {
        let dir = Directory::in_memory(Role::Client);
        for n in 0..10 {
            assert!(dir.first_hop_allowed(&id(n)));
            assert!(dir.connection_allowed(&id(n)));
            assert!(dir.path_build_allowed(&id(n)));
        }
    }

    #[test]
    fn test_client_policy_with_pinned_edges() {
        let mut dir = Directory::in_memory(Role::Client);
        let boot = contact_at(NOW);
        let boot_id = boot.router_id();
        dir.set_bootstraps(vec![boot]);
        dir.set_pinned_edges([id(1)]);

        assert!(dir.first_hop_allowed(&id(1)));
        // bootstraps are always allowed first hops, pinned or not
        assert!(dir.first_hop_allowed(&boot_id));
        assert!(!dir.first_hop_allowed(&id(2)));
        assert!(!dir.connection_allowed(&id(2)));
    }

    #[test]
    fn test_random_whitelisted() {
        let mut dir = Directory::in_memory(Role::Relay);
        assert!(dir.random_whitelisted().is_none());
        dir.set_trust_tiers(vec![id(1), id(2)], vec![], vec![]);
        let picked = dir.random_whitelisted().unwrap();
        assert!(picked == id(1) || picked == id(2));
    }

    proptest::proptest! {
        // key generation per entry keeps these cases expensive, so run few
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(16))]

        #[test]
        fn test_closest_to_shape_holds_for_arbitrary_sets(
            count in 0usize..10,
            n in 0usize..16,
            seed in proptest::prelude::any::<u8>(),
        ) {
            let mut dir = Directory::in_memory(Role::Client);
            for _ in 0..count {
                dir.put(contact_at(NOW));
            }
            let key = id(seed);

            let result = dir.closest_to(&key, n);
            proptest::prop_assert_eq!(result.len(), n.min(count));
            for pair in result.windows(2) {
                proptest::prop_assert!(
                    key.distance(&pair[0].router_id()) <= key.distance(&pair[1].router_id())
                );
            }
            let unique: HashSet<_> = result.iter().map(|rc| rc.router_id()).collect();
            proptest::prop_assert_eq!(unique.len(), result.len());
        }

        #[test]
        fn test_remove_stale_deletes_exactly_the_unkept(
            count in 0usize..8,
            keep_mask in proptest::prelude::any::<u8>(),
        ) {
            let mut dir = Directory::in_memory(Role::Client);
            let mut ids = Vec::new();
            for _ in 0..count {
                let rc = contact_at(NOW);
                ids.push(rc.router_id());
                dir.put(rc);
            }
            let keep: HashSet<RouterId> = ids
                .iter()
                .enumerate()
                .filter(|(i, _)| keep_mask & (1 << i) != 0)
                .map(|(_, id)| *id)
                .collect();

            dir.remove_stale(&keep, now_ms() + 1000);

            for rc_id in &ids {
                proptest::prop_assert_eq!(dir.has(rc_id), keep.contains(rc_id));
            }
            proptest::prop_assert_eq!(dir.len(), keep.len());
        }
    }
}
