// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use civet_err::{Error, Result};

/// Fixed-capacity circular buffer of customer indices.
///
/// Queues never own customer data; the driver owns the customer records and
/// lines hold positions into that sequence.
pub struct Ring {
    items: Box<[usize]>,
    front: usize,
    rear: usize,
    count: usize,
}

impl Ring {
    pub fn new(capacity: usize) -> Self {
        // A class with no customers still gets a well-formed (1-slot) ring.
        let capacity = capacity.max(1);
        Self {
            items: vec![0; capacity].into_boxed_slice(),
            front: 0,
            rear: capacity - 1,
            count: 0,
        }
    }

    pub fn push(&mut self, value: usize) -> Result<()> {
        if self.is_full() {
            return Err(Error::NoSpace);
        }

        self.rear = (self.rear + 1) % self.items.len();
        self.items[self.rear] = value;
        self.count += 1;

        Ok(())
    }

    pub fn pop(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }

        let value = self.items[self.front];
        self.front = (self.front + 1) % self.items.len();
        self.count -= 1;

        Some(value)
    }

    /// The index that will be popped next, without removing it.
    pub fn front(&self) -> Option<usize> {
        (!self.is_empty()).then(|| self.items[self.front])
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_push_order() {
        let mut ring = Ring::new(3);
        ring.push(10).unwrap();
        ring.push(11).unwrap();
        ring.push(12).unwrap();

        assert_eq!(ring.front(), Some(10));
        assert_eq!(ring.pop(), Some(10));
        assert_eq!(ring.pop(), Some(11));
        assert_eq!(ring.pop(), Some(12));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn wraps_around_capacity() {
        let mut ring = Ring::new(2);
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.pop(), Some(1));
        ring.push(3).unwrap();
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
    }

    #[test]
    fn rejects_overflow() {
        let mut ring = Ring::new(1);
        ring.push(1).unwrap();
        assert!(ring.push(2).is_err());
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn empty_class_still_has_a_ring() {
        let mut ring = Ring::new(0);
        assert!(ring.is_empty());
        ring.push(7).unwrap();
        assert_eq!(ring.pop(), Some(7));
    }
}
