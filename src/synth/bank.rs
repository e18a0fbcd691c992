use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::sim::entity::SourceRef;
use crate::sim::step::SourceDirectory;

/// Multi-slot sample store. Acquisition and decoding happen elsewhere; this
/// side only holds decoded mono buffers and hands out weak references.
/// Invalidating a slot bumps its generation, so stale handles resolve to
/// nothing and their entities fall back to synthesis.
#[derive(Debug)]
pub struct SampleBank {
    slots: Vec<Slot>,
    assign_cursor: AtomicUsize,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    buffer: Option<Arc<[f32]>>,
}

impl SampleBank {
    pub fn with_slots(n: usize) -> Self {
        Self {
            slots: (0..n.max(1)).map(|_| Slot::default()).collect(),
            assign_cursor: AtomicUsize::new(0),
        }
    }

    /// Install a decoded buffer into `slot`, invalidating prior handles.
    pub fn load(&mut self, slot: usize, samples: Arc<[f32]>) -> Option<SourceRef> {
        let s = self.slots.get_mut(slot)?;
        s.generation += 1;
        s.buffer = Some(samples);
        Some(SourceRef {
            slot,
            generation: s.generation,
        })
    }

    pub fn invalidate(&mut self, slot: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.generation += 1;
            s.buffer = None;
        }
    }

    pub fn resolve(&self, r: SourceRef) -> Option<Arc<[f32]>> {
        let s = self.slots.get(r.slot)?;
        if s.generation != r.generation {
            return None;
        }
        s.buffer.clone()
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.buffer.is_some()).count()
    }
}

impl SourceDirectory for SampleBank {
    /// Hand out occupied slots round-robin so a population spreads across
    /// whatever is loaded.
    fn assign(&self) -> Option<SourceRef> {
        let occupied: Vec<(usize, u64)> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.buffer.is_some())
            .map(|(i, s)| (i, s.generation))
            .collect();
        if occupied.is_empty() {
            return None;
        }
        let k = self.assign_cursor.fetch_add(1, Ordering::Relaxed) % occupied.len();
        let (slot, generation) = occupied[k];
        Some(SourceRef { slot, generation })
    }

    fn validate(&self, r: SourceRef) -> bool {
        self.slots
            .get(r.slot)
            .is_some_and(|s| s.generation == r.generation && s.buffer.is_some())
    }
}
