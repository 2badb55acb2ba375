//! Copy-on-write container shared between forked branches.

use std::ops::Deref;
use std::rc::Rc;

/// Either a value shared with other branches or one owned outright.
///
/// The first write through a shared cell copies the value (unless this
/// handle is the last one left), later writes go straight through.
#[derive(Debug)]
pub enum CowCell<T> {
    Shared(Rc<T>),
    Owned(T),
}

impl<T> CowCell<T> {
    pub fn new(value: T) -> Self {
        CowCell::Owned(value)
    }

    pub fn get(&self) -> &T {
        match self {
            CowCell::Shared(rc) => rc.as_ref(),
            CowCell::Owned(value) => value,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, CowCell::Shared(_))
    }
}

impl<T: Clone> CowCell<T> {
    pub fn get_mut(&mut self) -> &mut T {
        match self {
            CowCell::Owned(value) => value,
            CowCell::Shared(rc) => Rc::make_mut(rc),
        }
    }
}

impl<T: Default> CowCell<T> {
    /// Turns this cell into a shared one and returns another handle to it.
    pub fn share(&mut self) -> Self {
        let rc = match std::mem::take(self) {
            CowCell::Shared(rc) => rc,
            CowCell::Owned(value) => Rc::new(value),
        };
        *self = CowCell::Shared(Rc::clone(&rc));
        CowCell::Shared(rc)
    }
}

impl<T: Default> Default for CowCell<T> {
    fn default() -> Self {
        CowCell::Owned(T::default())
    }
}

impl<T: Clone> Clone for CowCell<T> {
    fn clone(&self) -> Self {
        match self {
            CowCell::Shared(rc) => CowCell::Shared(Rc::clone(rc)),
            CowCell::Owned(value) => CowCell::Owned(value.clone()),
        }
    }
}

impl<T> Deref for CowCell<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}
