//! Opaque resource handles and the slot arena behind them.
//!
//! Every resource the driver hands out is identified by a typed index into
//! a driver-owned arena. Handles never carry native pointers; only the
//! driver can resolve them, which keeps teardown ordering explicit.
//! Resolving a stale or foreign handle is a precondition violation and
//! aborts.

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) u32);
    };
}

define_handle!(
    /// A presentable surface owned by the driver.
    SurfaceId
);
define_handle!(
    /// A swapchain tied 1:1 to a surface.
    SwapchainId
);
define_handle!(
    /// A queue shared by reference; see `get_queue`/`free_queue`.
    QueueId
);
define_handle!(
    /// A compiled shader module.
    ShaderId
);
define_handle!(
    /// A render pass, standalone or swapchain-owned.
    RenderPassId
);
define_handle!(
    /// An immutable pipeline state bundle.
    PipelineId
);
define_handle!(
    /// A command pool bound to one queue family.
    CommandPoolId
);
define_handle!(
    /// A command buffer allocated from a pool.
    CommandBufferId
);

/// Slot arena with index reuse.
#[derive(Debug)]
pub(crate) struct Pool<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Pool<T> {
    pub fn insert(&mut self, value: T) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(value);
            index
        } else {
            self.slots.push(Some(value));
            (self.slots.len() - 1) as u32
        }
    }

    pub fn get(&self, index: u32) -> &T {
        self.slots
            .get(index as usize)
            .and_then(Option::as_ref)
            .expect("invalid resource handle")
    }

    pub fn get_mut(&mut self, index: u32) -> &mut T {
        self.slots
            .get_mut(index as usize)
            .and_then(Option::as_mut)
            .expect("invalid resource handle")
    }

    pub fn remove(&mut self, index: u32) -> T {
        let value = self
            .slots
            .get_mut(index as usize)
            .and_then(Option::take)
            .expect("invalid resource handle");
        self.free.push(index);
        value
    }

    pub fn contains(&self, index: u32) -> bool {
        self.slots
            .get(index as usize)
            .is_some_and(Option::is_some)
    }

    /// Remove and yield every live entry, oldest slot first.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free.clear();
        self.slots.drain(..).flatten()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut pool = Pool::default();
        let a = pool.insert("a");
        let b = pool.insert("b");
        assert_eq!(*pool.get(a), "a");
        assert_eq!(*pool.get(b), "b");
        assert_eq!(pool.remove(a), "a");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut pool = Pool::default();
        let a = pool.insert(1);
        pool.remove(a);
        let b = pool.insert(2);
        assert_eq!(a, b);
        assert_eq!(*pool.get(b), 2);
    }

    #[test]
    #[should_panic(expected = "invalid resource handle")]
    fn stale_handle_aborts() {
        let mut pool = Pool::default();
        let a = pool.insert(1);
        pool.remove(a);
        pool.get(a);
    }

    #[test]
    fn drain_yields_all_live_entries() {
        let mut pool = Pool::default();
        pool.insert(1);
        let b = pool.insert(2);
        pool.insert(3);
        pool.remove(b);
        let drained: Vec<i32> = pool.drain().collect();
        assert_eq!(drained, vec![1, 3]);
        assert_eq!(pool.len(), 0);
    }
}
