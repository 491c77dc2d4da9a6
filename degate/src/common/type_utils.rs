use parking_lot::RwLock;
use std::sync::Arc;

/// Shared, lock-protected value.
pub type Atomic<T> = Arc<RwLock<T>>;

#[inline]
pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}

pub trait ReadExecutor<T: ?Sized> {
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R;
}

impl<T> ReadExecutor<T> for Atomic<T> {
    #[inline]
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.read();
        f(&guard)
    }
}

pub trait WriteExecutor<T: ?Sized> {
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

impl<T> WriteExecutor<T> for Atomic<T> {
    #[inline]
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.write();
        f(&mut guard)
    }
}
