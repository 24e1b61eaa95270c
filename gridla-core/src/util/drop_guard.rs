use std::mem;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

/// Owns a token and hands it to `callback` when dropped, unless it is taken out with
/// [`DropGuard::into_inner`].
pub struct DropGuard<T, F: FnOnce(T)> {
    token: ManuallyDrop<T>,
    callback: ManuallyDrop<F>,
}

impl<T, F: FnOnce(T)> DropGuard<T, F> {
    pub fn new(token: T, dropper: F) -> Self {
        Self {
            token: ManuallyDrop::new(token),
            callback: ManuallyDrop::new(dropper),
        }
    }

    /// Disarms the guard and returns the token without running the callback.
    pub fn into_inner(mut self) -> T {
        let token = unsafe { ManuallyDrop::take(&mut self.token) };
        unsafe {
            ManuallyDrop::drop(&mut self.callback);
        }
        mem::forget(self);

        token
    }
}

impl<T, F: FnOnce(T)> Drop for DropGuard<T, F> {
    fn drop(&mut self) {
        let token = unsafe { ManuallyDrop::take(&mut self.token) };
        let callback = unsafe { ManuallyDrop::take(&mut self.callback) };

        (callback)(token);
    }
}

impl<T, F: FnOnce(T)> Deref for DropGuard<T, F> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl<T, F: FnOnce(T)> DerefMut for DropGuard<T, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.token
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_drop_guard() {
        let released = Cell::new(0);

        {
            let guard = DropGuard::new(5, |v| released.set(v));
            assert_eq!(*guard, 5);
        }
        assert_eq!(released.get(), 5);

        let guard = DropGuard::new(7, |v| released.set(v));
        assert_eq!(guard.into_inner(), 7);
        assert_eq!(released.get(), 5);
    }
}
