// src/table.rs
use crate::conn::Conn;

/// Which of the two loop sets a live connection currently belongs to.
/// The sets partition the live connections: disjoint, union == live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Readiness already known satisfied; awaiting servicing.
    Ready,
    /// Awaiting an external readiness event or a timeout.
    Blocked,
}

struct Slot {
    conn: Conn,
    membership: Option<Membership>, // None == free slot
    next_free: i32,                 // -1 terminates the free list
}

/// Slab-backed connection table. Allocation and deallocation are O(1) via an
/// intrusive free list; indices are stable for the lifetime of an entry, so
/// iteration by index snapshot is robust to removal and promotion mid-pass.
pub struct ConnTable {
    slots: Box<[Slot]>,
    head_free: i32,
    ready: usize,
    blocked: usize,
    high_water: usize,
}

impl ConnTable {
    /// Allocate the slot array strictly once at loop startup.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Slot {
                conn: Conn::new(-1),
                membership: None,
                next_free: if i == capacity - 1 { -1 } else { (i + 1) as i32 },
            });
        }
        Self {
            slots: slots.into_boxed_slice(),
            head_free: if capacity == 0 { -1 } else { 0 },
            ready: 0,
            blocked: 0,
            high_water: 0,
        }
    }

    /// Insert a connection into the given set. Returns its index, or `None`
    /// when the table is out of capacity.
    pub fn insert(&mut self, conn: Conn, membership: Membership) -> Option<usize> {
        if self.head_free == -1 {
            return None;
        }
        let idx = self.head_free as usize;
        let slot = &mut self.slots[idx];
        self.head_free = slot.next_free;
        slot.conn = conn;
        slot.membership = Some(membership);
        match membership {
            Membership::Ready => self.ready += 1,
            Membership::Blocked => self.blocked += 1,
        }
        if idx + 1 > self.high_water {
            self.high_water = idx + 1;
        }
        Some(idx)
    }

    /// Remove a connection, returning it for teardown. Double removal is a no-op.
    pub fn remove(&mut self, idx: usize) -> Option<Conn> {
        let slot = self.slots.get_mut(idx)?;
        let membership = slot.membership.take()?;
        match membership {
            Membership::Ready => self.ready -= 1,
            Membership::Blocked => self.blocked -= 1,
        }
        slot.next_free = self.head_free;
        self.head_free = idx as i32;
        Some(std::mem::replace(&mut slot.conn, Conn::new(-1)))
    }

    pub fn get(&self, idx: usize) -> Option<&Conn> {
        let slot = self.slots.get(idx)?;
        if slot.membership.is_some() {
            Some(&slot.conn)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Conn> {
        let slot = self.slots.get_mut(idx)?;
        if slot.membership.is_some() {
            Some(&mut slot.conn)
        } else {
            None
        }
    }

    pub fn membership(&self, idx: usize) -> Option<Membership> {
        self.slots.get(idx).and_then(|s| s.membership)
    }

    /// Move a blocked connection into the Ready set.
    pub fn ready_request(&mut self, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            if slot.membership == Some(Membership::Blocked) {
                slot.membership = Some(Membership::Ready);
                self.blocked -= 1;
                self.ready += 1;
            }
        }
    }

    /// Move a ready connection back into the Blocked set (needs more I/O).
    pub fn block_request(&mut self, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx) {
            if slot.membership == Some(Membership::Ready) {
                slot.membership = Some(Membership::Blocked);
                self.ready -= 1;
                self.blocked += 1;
            }
        }
    }

    pub fn ready_count(&self) -> usize {
        self.ready
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked
    }

    pub fn len(&self) -> usize {
        self.ready + self.blocked
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Snapshot of blocked indices. Taken up front so a sweep pass can
    /// promote or remove entries without invalidating its own iteration.
    pub fn blocked_indices(&self) -> Vec<usize> {
        self.indices_in(Membership::Blocked)
    }

    /// Snapshot of ready indices, for the request processor.
    pub fn ready_indices(&self) -> Vec<usize> {
        self.indices_in(Membership::Ready)
    }

    fn indices_in(&self, which: Membership) -> Vec<usize> {
        (0..self.high_water)
            .filter(|&i| self.slots[i].membership == Some(which))
            .collect()
    }
}
