//! Array-backed binary heap ordered by a caller-supplied comparator.
//!
//! The heap has no notion of "min" or "max": the comparator `above(a, b)`
//! answers whether `a` must sit above `b`. It must describe a strict total
//! order (tie-breaks included), otherwise equal elements may come out in
//! any order.

use std::fmt;

/// A binary heap over `T` ordered by `above`.
pub struct PriorityHeap<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    items: Vec<T>,
    above: F,
}

impl<T, F> PriorityHeap<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    /// Build a heap from an unordered collection. Heapifies bottom-up in O(n).
    pub fn new(above: F, initial: impl IntoIterator<Item = T>) -> Self {
        let mut heap = Self {
            items: initial.into_iter().collect(),
            above,
        };
        for i in (0..heap.items.len() / 2).rev() {
            heap.sift_down(i);
        }
        heap
    }

    /// Create an empty heap.
    pub fn empty(above: F) -> Self {
        Self {
            items: Vec::new(),
            above,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The element that the next `pop` would return.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Read-only view of the backing storage, in heap order.
    pub fn current(&self) -> &[T] {
        &self.items
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the root. `None` on an empty heap.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let out = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(out)
    }

    /// Take every element out, leaving the heap empty. Order is unspecified.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if (self.above)(&self.items[parent], &self.items[i]) {
                return;
            }
            self.items.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut best = i;
            if left < len && (self.above)(&self.items[left], &self.items[best]) {
                best = left;
            }
            if right < len && (self.above)(&self.items[right], &self.items[best]) {
                best = right;
            }
            if best == i {
                return;
            }
            self.items.swap(i, best);
            i = best;
        }
    }
}

impl<T: fmt::Debug, F> fmt::Debug for PriorityHeap<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityHeap")
            .field("items", &self.items)
            .finish()
    }
}
