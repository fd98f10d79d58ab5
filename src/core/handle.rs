//! Opaque handles and the generation-checked arena behind them.
//!
//! A handle is a slot index plus the generation of the value that occupied
//! the slot when the handle was issued. Removing a value bumps the slot's
//! generation, so a handle to a destroyed value is recognised as stale and
//! can never alias whatever is stored in the slot later.

use std::fmt;

/// Index/generation pair shared by every handle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    /// The handle that never refers to anything.
    pub const INVALID: Self = Self {
        index: 0,
        generation: 0,
    };

    /// Pack into a single integer (generation in the high half).
    pub fn to_u64(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Unpack from [`RawHandle::to_u64`].
    pub fn from_u64(raw: u64) -> Self {
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }

    /// Whether this is the reserved invalid handle.
    pub fn is_invalid(self) -> bool {
        self.generation == 0
    }
}

macro_rules! define_handle {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(RawHandle);

        impl $name {
            /// The handle that never refers to anything.
            pub const INVALID: Self = Self(RawHandle::INVALID);

            /// Pack into a single integer.
            pub fn to_u64(self) -> u64 {
                self.0.to_u64()
            }

            /// Rebuild from [`Self::to_u64`].
            pub fn from_u64(raw: u64) -> Self {
                Self(RawHandle::from_u64(raw))
            }

            /// Whether this is the reserved invalid handle.
            pub fn is_invalid(self) -> bool {
                self.0.is_invalid()
            }

            pub(crate) fn raw(self) -> RawHandle {
                self.0
            }
        }

        impl From<RawHandle> for $name {
            fn from(raw: RawHandle) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}.{}"), self.0.index, self.0.generation)
            }
        }
    };
}

define_handle!(
    /// Handle to a connection.
    ConnectionHandle,
    "conn"
);
define_handle!(
    /// Handle to a listen socket.
    ListenSocketHandle,
    "listen"
);
define_handle!(
    /// Handle to a poll group.
    PollGroupHandle,
    "pollgroup"
);

/// What a handle refers to right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleStatus {
    /// The value the handle was issued for is still stored.
    Live,
    /// The handle was issued by this arena but its value has been removed.
    Stale,
    /// The handle was never issued by this arena.
    Unknown,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage keyed by [`RawHandle`].
#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Store a value and return a handle that is unique for the arena's lifetime.
    pub(crate) fn insert(&mut self, value: T) -> RawHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return RawHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        RawHandle {
            index,
            generation: 1,
        }
    }

    /// Remove a live value. The slot's generation moves on so the handle goes stale.
    pub(crate) fn remove(&mut self, handle: RawHandle) -> Option<T> {
        if self.status(handle) != HandleStatus::Live {
            return None;
        }
        let slot = &mut self.slots[handle.index as usize];
        let value = slot.value.take();

        // A slot whose generation would wrap is retired instead of recycled.
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(handle.index);
            }
            None => slot.generation = u32::MAX,
        }
        value
    }

    pub(crate) fn status(&self, handle: RawHandle) -> HandleStatus {
        if handle.is_invalid() {
            return HandleStatus::Unknown;
        }
        let Some(slot) = self.slots.get(handle.index as usize) else {
            return HandleStatus::Unknown;
        };
        if slot.generation == handle.generation && slot.value.is_some() {
            HandleStatus::Live
        } else if handle.generation < slot.generation
            || (slot.generation == handle.generation && slot.value.is_none())
        {
            HandleStatus::Stale
        } else {
            HandleStatus::Unknown
        }
    }

    pub(crate) fn get(&self, handle: RawHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation || handle.is_invalid() {
            return None;
        }
        slot.value.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: RawHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation || handle.is_invalid() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Handles of every live value, in slot order.
    pub(crate) fn handles(&self) -> Vec<RawHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| RawHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (RawHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    RawHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_ne!(a, b);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.handles().len(), 2);
    }

    #[test]
    fn test_stale_handle_never_aliases_reused_slot() {
        let mut arena = Arena::new();
        let old = arena.insert(1);
        assert_eq!(arena.remove(old), Some(1));

        let new = arena.insert(2);
        assert_ne!(old, new);
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(new), Some(&2));
        assert_eq!(arena.status(old), HandleStatus::Stale);
        assert_eq!(arena.status(new), HandleStatus::Live);
    }

    #[test]
    fn test_status_unknown() {
        let mut arena: Arena<u8> = Arena::new();
        assert_eq!(arena.status(RawHandle::INVALID), HandleStatus::Unknown);

        let h = arena.insert(7);
        let bogus = RawHandle {
            index: 42,
            generation: 1,
        };
        assert_eq!(arena.status(bogus), HandleStatus::Unknown);

        let future = RawHandle {
            index: h.index,
            generation: h.generation + 5,
        };
        assert_eq!(arena.status(future), HandleStatus::Unknown);
    }

    #[test]
    fn test_double_remove() {
        let mut arena = Arena::new();
        let h = arena.insert('x');
        assert_eq!(arena.remove(h), Some('x'));
        assert_eq!(arena.remove(h), None);
        assert!(arena.handles().is_empty());
    }

    #[test]
    fn test_raw_roundtrip_and_invalid() {
        let h = RawHandle {
            index: 3,
            generation: 9,
        };
        assert_eq!(RawHandle::from_u64(h.to_u64()), h);
        assert!(RawHandle::INVALID.is_invalid());
        assert_eq!(RawHandle::INVALID.to_u64(), 0);
        assert!(ConnectionHandle::INVALID.is_invalid());
    }

    #[test]
    fn test_handles_and_iter() {
        let mut arena = Arena::new();
        let a = arena.insert(10);
        let b = arena.insert(20);
        arena.remove(a);

        assert_eq!(arena.handles(), vec![b]);
        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![20]);
    }

    #[test]
    fn test_display() {
        let h = ConnectionHandle::from(RawHandle {
            index: 2,
            generation: 1,
        });
        assert_eq!(h.to_string(), "conn#2.1");
    }
}
