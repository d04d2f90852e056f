//! Generation-stamped arena.
//!
//! Nodes refer to each other by [`Slot`] rather than by pointer. Freeing a
//! slot bumps its generation, so any slot handed out earlier stops resolving
//! instead of silently pointing at whatever reuses the storage.

use serde::{Deserialize, Serialize};

/// Index into an [`Arena`], stamped with the generation it was issued at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32, next_free: Option<u32> },
}

/// Storage with stable, death-detecting handles.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Store a value and return its slot.
    pub fn insert(&mut self, value: T) -> Slot {
        self.len += 1;
        if let Some(index) = self.free_head {
            if let Some(&Entry::Free {
                generation,
                next_free,
            }) = self.entries.get(index as usize)
            {
                self.entries[index as usize] = Entry::Occupied { generation, value };
                self.free_head = next_free;
                return Slot { index, generation };
            }
        }

        let index = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });
        Slot {
            index,
            generation: 0,
        }
    }

    /// Remove the value at `slot`. Stale slots return `None`.
    pub fn remove(&mut self, slot: Slot) -> Option<T> {
        let entry = self.entries.get_mut(slot.index as usize)?;
        match entry {
            Entry::Occupied { generation, .. } if *generation == slot.generation => {
                let next = Entry::Free {
                    generation: generation.wrapping_add(1),
                    next_free: self.free_head,
                };
                let old = std::mem::replace(entry, next);
                self.free_head = Some(slot.index);
                self.len -= 1;
                match old {
                    Entry::Occupied { value, .. } => Some(value),
                    Entry::Free { .. } => None,
                }
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, slot: Slot) -> Option<&T> {
        match self.entries.get(slot.index as usize)? {
            Entry::Occupied { generation, value } if *generation == slot.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        match self.entries.get_mut(slot.index as usize)? {
            Entry::Occupied { generation, value } if *generation == slot.generation => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, slot: Slot) -> bool {
        self.get(slot).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live entries in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    Slot {
                        index: i as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Free { .. } => None,
            })
    }

    /// Live entries in storage order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Slot, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    Slot {
                        index: i as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Entry::Free { .. } => None,
            })
    }

    /// Drop every entry. Outstanding slots all become stale.
    pub fn clear(&mut self) {
        let slots: Vec<Slot> = self.iter().map(|(slot, _)| slot).collect();
        for slot in slots {
            self.remove(slot);
        }
    }
}
