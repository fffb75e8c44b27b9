//! In-memory repository
//!
//! Rows live in a `Vec` guarded by one `RwLock`, with a `HashMap` index from
//! id to position. Reads clone rows out under the read lock, so every
//! `find_all` is a consistent snapshot. Writes hold the write lock for the
//! whole check-then-write sequence.

use super::{Entity, Repository};
use crate::{Error, Result, storage_error};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Rows<T: Entity> {
    rows: Vec<T>,
    index: HashMap<T::Id, usize>,
}

/// Thread-safe in-memory [`Repository`]
pub struct MemoryRepository<T: Entity> {
    inner: RwLock<Rows<T>>,
}

impl<T: Entity> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Rows {
                rows: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Rows<T>>> {
        self.inner
            .read()
            .map_err(|_| storage_error!("{} repository read error", T::KIND))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Rows<T>>> {
        self.inner
            .write()
            .map_err(|_| storage_error!("{} repository write error", T::KIND))
    }
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Repository<T> for MemoryRepository<T> {
    fn save(&self, entity: T) -> Result<T> {
        let mut inner = self.write()?;
        match inner.index.get(&entity.id()).copied() {
            Some(slot) => inner.rows[slot] = entity.clone(),
            None => {
                let slot = inner.rows.len();
                inner.index.insert(entity.id(), slot);
                inner.rows.push(entity.clone());
            }
        }
        Ok(entity)
    }

    fn find_by_id(&self, id: &T::Id) -> Result<Option<T>> {
        let inner = self.read()?;
        Ok(inner.index.get(id).map(|&slot| inner.rows[slot].clone()))
    }

    fn find_all(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>> {
        let inner = self.read()?;
        Ok(inner.rows.iter().filter(|row| predicate(row)).cloned().collect())
    }

    fn count(&self, predicate: &dyn Fn(&T) -> bool) -> Result<usize> {
        let inner = self.read()?;
        Ok(inner.rows.iter().filter(|row| predicate(row)).count())
    }

    fn update(&self, id: &T::Id, mutate: &mut dyn FnMut(&mut T) -> Result<()>) -> Result<T> {
        let mut inner = self.write()?;
        let slot = *inner
            .index
            .get(id)
            .ok_or_else(|| Error::not_found(T::KIND, id))?;

        // Mutate a copy so a rejected change leaves the stored row untouched.
        let mut candidate = inner.rows[slot].clone();
        mutate(&mut candidate)?;
        inner.rows[slot] = candidate.clone();
        Ok(candidate)
    }

    fn insert_checked(
        &self,
        entity: T,
        scope: &dyn Fn(&T) -> bool,
        check: &dyn Fn(&[&T]) -> Result<()>,
    ) -> Result<T> {
        let mut inner = self.write()?;
        if inner.index.contains_key(&entity.id()) {
            return Err(Error::conflict(format!(
                "{} {} already exists",
                T::KIND,
                entity.id()
            )));
        }

        let in_scope: Vec<&T> = inner.rows.iter().filter(|row| scope(row)).collect();
        check(&in_scope)?;

        let slot = inner.rows.len();
        inner.index.insert(entity.id(), slot);
        inner.rows.push(entity.clone());
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::types::{ElectionId, Issue};

    fn issue(title: &str) -> Issue {
        Issue::new(ElectionId::new(), title, "").unwrap()
    }

    #[test]
    fn test_save_replaces_in_place() {
        let repo: MemoryRepository<Issue> = MemoryRepository::new();
        let mut first = issue("Dividend policy");
        let second = issue("Capital increase");
        repo.save(first.clone()).unwrap();
        repo.save(second.clone()).unwrap();

        first.description = "Amended".to_string();
        repo.save(first.clone()).unwrap();

        let all = repo.find_all(&|_| true).unwrap();
        assert_eq!(all, vec![first, second]);
        assert_eq!(repo.len().unwrap(), 2);
    }

    #[test]
    fn test_update_failure_leaves_row_untouched() {
        let repo: MemoryRepository<Issue> = MemoryRepository::new();
        let row = repo.save(issue("Auditor appointment")).unwrap();

        let result = repo.update(&row.id, &mut |i: &mut Issue| {
            i.description = "half-written".to_string();
            Err(Error::validation("rejected"))
        });
        assert!(result.is_err());
        assert_eq!(repo.find_by_id(&row.id).unwrap().unwrap(), row);

        let err = repo
            .update(&crate::types::IssueId::new(), &mut |_| Ok(()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_insert_checked_sees_only_scoped_rows() {
        let repo: MemoryRepository<Issue> = MemoryRepository::new();
        repo.save(issue("A")).unwrap();
        repo.save(issue("B")).unwrap();

        fn unique(rows: &[&Issue]) -> Result<()> {
            match rows.first() {
                None => Ok(()),
                Some(taken) => Err(Error::conflict(format!("title {} taken", taken.title))),
            }
        }

        let err = repo
            .insert_checked(issue("A"), &|i: &Issue| i.title == "A", &unique)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        repo.insert_checked(issue("C"), &|i: &Issue| i.title == "C", &unique)
            .unwrap();
        assert_eq!(repo.count(&|_| true).unwrap(), 3);
    }

    #[test]
    fn test_insert_checked_rejects_existing_id() {
        let repo: MemoryRepository<Issue> = MemoryRepository::new();
        let row = repo.save(issue("A")).unwrap();
        let err = repo.insert_checked(row, &|_| false, &|_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
