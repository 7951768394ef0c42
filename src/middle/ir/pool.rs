use std::sync::{Arc, RwLock};

use hashbrown::HashMap;

use crate::{
    index::IndexVec,
    middle::ir::{Instruction, IrHandle},
};

/// Content-addressed store for canonical instruction values.
///
/// Structurally equal instructions share one entry: `acquire` hands back the
/// existing handle when an equal value was already interned. Handles stay
/// valid for the life of the pool, and reads hand out `Arc` clones under a
/// short-lived guard, so insertions never invalidate an entry somebody is
/// still looking at. The interior lock keeps acquisition safe even when
/// independent subtrees are lowered concurrently.
#[derive(Debug, Default)]
pub struct IrPool {
    inner: RwLock<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: IndexVec<IrHandle, Arc<Instruction>>,
    index: HashMap<Arc<Instruction>, IrHandle>,
}

impl IrPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, instruction: Instruction) -> IrHandle {
        {
            let inner = self.inner.read().unwrap();

            if let Some(&handle) = inner.index.get(&instruction) {
                return handle;
            }
        }

        let mut inner = self.inner.write().unwrap();

        // Another acquirer may have interned the value between the two lock
        // scopes
        if let Some(&handle) = inner.index.get(&instruction) {
            return handle;
        }

        let entry = Arc::new(instruction);
        let handle = inner.entries.push(Arc::clone(&entry));
        inner.index.insert(entry, handle);

        handle
    }

    pub fn get(&self, handle: IrHandle) -> Arc<Instruction> {
        let inner = self.inner.read().unwrap();

        Arc::clone(&inner.entries[handle])
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jump(target: &str) -> Instruction {
        Instruction::Jump {
            target: target.to_owned(),
        }
    }

    #[test]
    fn equal_values_share_a_handle() {
        let pool = IrPool::new();

        let first = pool.acquire(jump("L1"));
        let second = pool.acquire(jump("L1"));

        assert_eq!(first, second);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn different_values_get_distinct_handles() {
        let pool = IrPool::new();

        let first = pool.acquire(jump("L1"));
        let second = pool.acquire(jump("L2"));

        assert_ne!(first, second);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn variants_with_identical_fields_do_not_collide() {
        let pool = IrPool::new();

        let jump = pool.acquire(Instruction::Jump {
            target: "L1".to_owned(),
        });
        let label = pool.acquire(Instruction::Label {
            name: "L1".to_owned(),
        });

        assert_ne!(jump, label);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn handles_stay_valid_while_the_pool_grows() {
        let pool = IrPool::new();

        let handle = pool.acquire(jump("L1"));
        let entry = pool.get(handle);

        for n in 2..100 {
            pool.acquire(jump(&format!("L{n}")));
        }

        assert_eq!(*entry, jump("L1"));
        assert_eq!(*pool.get(handle), jump("L1"));
    }
}
