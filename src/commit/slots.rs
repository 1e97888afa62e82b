//! Persistence slot rotation.
//!
//! Four logical configuration slots live behind the opaque
//! [`Storage`](crate::ports::Storage) port: `active`, `staged`, `lkg`
//! and `factory`. Slot contents are the canonical JSON bytes of an
//! envelope, so a rejected commit can be proven byte-identical before
//! and after.
//!
//! Promotion order matters for crash safety: the new active is written
//! first (all-or-nothing), and only then is the displaced active
//! copied into LKG. A failure at the second step rolls the active
//! write back, so a failed commit leaves both slots as they were.

use log::{info, warn};

use crate::config::ConfigEnvelope;
use crate::error::{Result, StorageError};
use crate::ports::{Slot, Storage};

pub struct SlotStore<S> {
    storage: S,
}

impl<S: Storage> SlotStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// First-boot initialization: seed missing `active` and `factory`
    /// slots with factory defaults. Returns the active envelope.
    pub fn bootstrap(&mut self) -> Result<ConfigEnvelope> {
        let active = match self.read_envelope(Slot::Active) {
            Ok(envelope) => envelope,
            Err(_) => {
                info!("no active configuration; seeding factory defaults");
                let factory = ConfigEnvelope::factory();
                self.storage
                    .write_atomic(Slot::Active, &factory.to_slot_bytes())?;
                factory
            }
        };
        if self.storage.read(Slot::Factory).is_err() {
            self.storage.rotate(Slot::Active, Slot::Factory)?;
        }
        Ok(active)
    }

    pub fn read_envelope(&self, slot: Slot) -> Result<ConfigEnvelope> {
        let bytes = self.storage.read(slot)?;
        ConfigEnvelope::from_slot_bytes(&bytes)
            .map_err(|_| crate::error::Error::Storage(StorageError::Corrupted))
    }

    /// Raw slot bytes, for byte-identity checks.
    pub fn read_bytes(&self, slot: Slot) -> Result<Vec<u8>> {
        Ok(self.storage.read(slot)?)
    }

    pub fn write_staged(&mut self, envelope: &ConfigEnvelope) -> Result<()> {
        self.storage
            .write_atomic(Slot::Staged, &envelope.to_slot_bytes())?;
        Ok(())
    }

    /// Promote a validated candidate: `active → lkg`, candidate →
    /// active. Any failure leaves both slots unchanged.
    pub fn promote(&mut self, candidate: &ConfigEnvelope) -> Result<()> {
        let old_active = self.storage.read(Slot::Active)?;
        self.storage
            .write_atomic(Slot::Active, &candidate.to_slot_bytes())?;
        if let Err(e) = self.storage.write_atomic(Slot::Lkg, &old_active) {
            warn!("LKG rotation failed ({e}); rolling active back");
            if self.storage.write_atomic(Slot::Active, &old_active).is_err() {
                return Err(crate::error::Error::Internal(
                    "active rollback failed after LKG rotation failure",
                ));
            }
            return Err(e.into());
        }
        info!("configuration '{}' promoted to active", candidate.config_id);
        Ok(())
    }

    /// Direct access for co-located records (fault ledger).
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory storage with fault injection on chosen slots.
    #[derive(Default)]
    struct MemStorage {
        slots: HashMap<u8, Vec<u8>>,
        fail_writes_to: Option<Slot>,
    }

    impl Storage for MemStorage {
        fn read(&self, slot: Slot) -> std::result::Result<Vec<u8>, StorageError> {
            self.slots
                .get(&(slot as u8))
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        fn write_atomic(
            &mut self,
            slot: Slot,
            bytes: &[u8],
        ) -> std::result::Result<(), StorageError> {
            if self.fail_writes_to == Some(slot) {
                return Err(StorageError::IoError);
            }
            self.slots.insert(slot as u8, bytes.to_vec());
            Ok(())
        }

        fn rotate(&mut self, src: Slot, dst: Slot) -> std::result::Result<(), StorageError> {
            let bytes = self.read(src)?;
            self.write_atomic(dst, &bytes)
        }
    }

    fn candidate(id: &str) -> ConfigEnvelope {
        ConfigEnvelope {
            config_id: id.to_string(),
            ..ConfigEnvelope::factory()
        }
    }

    #[test]
    fn bootstrap_seeds_active_and_factory() {
        let mut store = SlotStore::new(MemStorage::default());
        let active = store.bootstrap().unwrap();
        assert_eq!(active.config_id, "factory");
        assert!(store.read_envelope(Slot::Factory).is_ok());
    }

    #[test]
    fn promote_rotates_active_into_lkg() {
        let mut store = SlotStore::new(MemStorage::default());
        store.bootstrap().unwrap();

        store.promote(&candidate("v1")).unwrap();
        assert_eq!(store.read_envelope(Slot::Active).unwrap().config_id, "v1");
        assert_eq!(
            store.read_envelope(Slot::Lkg).unwrap().config_id,
            "factory"
        );

        store.promote(&candidate("v2")).unwrap();
        assert_eq!(store.read_envelope(Slot::Active).unwrap().config_id, "v2");
        assert_eq!(store.read_envelope(Slot::Lkg).unwrap().config_id, "v1");
    }

    #[test]
    fn failed_active_write_changes_nothing() {
        let mut store = SlotStore::new(MemStorage::default());
        store.bootstrap().unwrap();
        store.promote(&candidate("v1")).unwrap();

        let active_before = store.read_bytes(Slot::Active).unwrap();
        let lkg_before = store.read_bytes(Slot::Lkg).unwrap();

        store.storage_mut().fail_writes_to = Some(Slot::Active);
        assert!(store.promote(&candidate("v2")).is_err());

        store.storage_mut().fail_writes_to = None;
        assert_eq!(store.read_bytes(Slot::Active).unwrap(), active_before);
        assert_eq!(store.read_bytes(Slot::Lkg).unwrap(), lkg_before);
    }

    #[test]
    fn failed_lkg_write_rolls_active_back() {
        let mut store = SlotStore::new(MemStorage::default());
        store.bootstrap().unwrap();
        store.promote(&candidate("v1")).unwrap();

        let active_before = store.read_bytes(Slot::Active).unwrap();
        let lkg_before = store.read_bytes(Slot::Lkg).unwrap();

        store.storage_mut().fail_writes_to = Some(Slot::Lkg);
        assert!(store.promote(&candidate("v2")).is_err());

        store.storage_mut().fail_writes_to = None;
        assert_eq!(store.read_bytes(Slot::Active).unwrap(), active_before);
        assert_eq!(store.read_bytes(Slot::Lkg).unwrap(), lkg_before);
    }

    #[test]
    fn staged_slot_round_trips() {
        let mut store = SlotStore::new(MemStorage::default());
        let env = candidate("draft");
        store.write_staged(&env).unwrap();
        assert_eq!(store.read_envelope(Slot::Staged).unwrap(), env);
    }
}
