//! Repository wrapper that runs a hook on the next read
//!
//! Lets tests land a concurrent operation between a component's read of a
//! row and its following write.

use super::{Entity, MemoryRepository, Repository};
use crate::Result;
use std::sync::Mutex;

type Hook = Box<dyn FnOnce() + Send>;

pub(crate) struct InterceptedRepository<T: Entity> {
    inner: MemoryRepository<T>,
    hook: Mutex<Option<Hook>>,
}

impl<T: Entity> InterceptedRepository<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryRepository::new(),
            hook: Mutex::new(None),
        }
    }

    /// Run `hook` once, at the start of the next `find_by_id` or `find_all`
    pub(crate) fn on_next_read(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn fire(&self) {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl<T: Entity> Repository<T> for InterceptedRepository<T> {
    fn save(&self, entity: T) -> Result<T> {
        self.inner.save(entity)
    }

    fn find_by_id(&self, id: &T::Id) -> Result<Option<T>> {
        self.fire();
        self.inner.find_by_id(id)
    }

    fn find_all(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>> {
        self.fire();
        self.inner.find_all(predicate)
    }

    fn update(&self, id: &T::Id, mutate: &mut dyn FnMut(&mut T) -> Result<()>) -> Result<T> {
        self.inner.update(id, mutate)
    }

    fn insert_checked(
        &self,
        entity: T,
        scope: &dyn Fn(&T) -> bool,
        check: &dyn Fn(&[&T]) -> Result<()>,
    ) -> Result<T> {
        self.inner.insert_checked(entity, scope, check)
    }
}
