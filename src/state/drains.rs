use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Notify;
use uuid::Uuid;

/// Live progressive-closing loops in this process, one per festival at most.
#[derive(Default)]
pub struct DrainRegistry {
    live: DashMap<Uuid, Arc<Notify>>,
}

/// Exclusive right to run the drain of one festival. Released on drop.
pub struct DrainSlot {
    festival_id: Uuid,
    interrupt: Arc<Notify>,
    registry: Arc<DrainRegistry>,
}

impl DrainRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the drain slot; `None` when a drain for this festival is already live.
    pub fn claim(self: &Arc<Self>, festival_id: Uuid) -> Option<DrainSlot> {
        match self.live.entry(festival_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let interrupt = Arc::new(Notify::new());
                vacant.insert(interrupt.clone());
                Some(DrainSlot {
                    festival_id,
                    interrupt,
                    registry: self.clone(),
                })
            }
        }
    }

    /// Ask the live drain to stop waiting. Returns `false` when no drain is live.
    pub fn interrupt(&self, festival_id: Uuid) -> bool {
        match self.live.get(&festival_id) {
            Some(interrupt) => {
                // notify_one stores a permit, so an interrupt sent between two polls is
                // not lost.
                interrupt.notify_one();
                true
            }
            None => false,
        }
    }

    /// Whether a closing loop runs for the festival.
    pub fn is_live(&self, festival_id: Uuid) -> bool {
        self.live.contains_key(&festival_id)
    }

    /// Number of live closing loops.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl DrainSlot {
    /// Festival this slot drains.
    pub fn festival_id(&self) -> Uuid {
        self.festival_id
    }

    /// Resolves once [`DrainRegistry::interrupt`] is called for this festival.
    pub async fn interrupted(&self) {
        self.interrupt.notified().await;
    }
}

impl Drop for DrainSlot {
    fn drop(&mut self) {
        self.registry
            .live
            .remove_if(&self.festival_id, |_, live| Arc::ptr_eq(live, &self.interrupt));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_refused_until_release() {
        let registry = Arc::new(DrainRegistry::new());
        let id = Uuid::new_v4();

        let slot = registry.claim(id).unwrap();
        assert!(registry.claim(id).is_none());
        assert!(registry.is_live(id));

        drop(slot);
        assert!(!registry.is_live(id));
        assert!(registry.claim(id).is_some());
    }

    #[tokio::test]
    async fn interrupt_before_wait_is_kept() {
        let registry = Arc::new(DrainRegistry::new());
        let id = Uuid::new_v4();
        let slot = registry.claim(id).unwrap();

        assert!(registry.interrupt(id));
        slot.interrupted().await;
        assert!(!registry.interrupt(Uuid::new_v4()));
    }
}
