use std::collections::HashMap;
use std::sync::Arc;

use crate::LogLevel;
use crate::error::{Result, StoreError};
use crate::model::record::Record;
use crate::model::typedescriptor::TypeDescriptor;
use crate::model::value::PrimaryKey;

/// The single live record per primary key of one type.
pub struct IdentityMap {
    descriptor: Arc<TypeDescriptor>,
    log_level: LogLevel,
    records: HashMap<PrimaryKey, Record>,
    order: Vec<PrimaryKey>,
}

impl IdentityMap {
    /// Empty map for the records of `descriptor`.
    pub fn new(descriptor: Arc<TypeDescriptor>, log_level: LogLevel) -> Self {
        Self {
            descriptor,
            log_level,
            records: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Descriptor shared by every record in the map.
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    /// Return the record for `id`, creating an unloaded shell on first use.
    pub fn record_for(&mut self, id: PrimaryKey) -> Record {
        if let Some(record) = self.records.get(&id) {
            return record.clone();
        }
        let record = Record::shell(Arc::clone(&self.descriptor), id.clone(), self.log_level);
        self.order.push(id.clone());
        self.records.insert(id, record.clone());
        record
    }

    /// The resident record for `id`, loaded or not.
    pub fn get(&self, id: &PrimaryKey) -> Option<Record> {
        self.records.get(id).cloned()
    }

    /// True if any record, shell or loaded, holds `id`.
    pub fn contains(&self, id: &PrimaryKey) -> bool {
        self.records.contains_key(id)
    }

    /// Fails if a loaded instance other than `record` holds `id`.
    pub fn check_insert(&self, id: &PrimaryKey, record: &Record) -> Result<()> {
        match self.records.get(id) {
            Some(existing) if !existing.ptr_eq(record) && existing.is_loaded() => {
                Err(StoreError::DuplicateIdentity {
                    type_name: self.descriptor.name().to_string(),
                    id: id.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Register a record that just received its primary key.
    ///
    /// An unloaded shell holding the key is replaced and returned; its
    /// position in insertion order is kept. Fails if a loaded instance
    /// already holds the key.
    pub fn insert(&mut self, id: PrimaryKey, record: &Record) -> Result<Option<Record>> {
        self.check_insert(&id, record)?;
        match self.records.get(&id) {
            Some(existing) if existing.ptr_eq(record) => Ok(None),
            Some(_) => Ok(self.records.insert(id, record.clone())),
            None => {
                self.order.push(id.clone());
                self.records.insert(id, record.clone());
                Ok(None)
            }
        }
    }

    /// Number of resident records, shells included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no record has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loaded records in insertion order.
    ///
    /// The iterator is lazy and can be restarted by cloning it.
    pub fn all_loaded(&self) -> AllLoaded<'_> {
        AllLoaded {
            map: self,
            position: 0,
        }
    }
}

/// Iterator returned by [`IdentityMap::all_loaded`].
#[derive(Clone)]
pub struct AllLoaded<'a> {
    map: &'a IdentityMap,
    position: usize,
}

impl Iterator for AllLoaded<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        while let Some(id) = self.map.order.get(self.position) {
            self.position += 1;
            if let Some(record) = self.map.records.get(id) {
                if record.is_loaded() {
                    return Some(record.clone());
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.map.order.len() - self.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::value::RawData;

    fn map() -> IdentityMap {
        IdentityMap::new(TypeDescriptor::builder("person").build(), LogLevel::Information)
    }

    #[test]
    fn record_for_returns_the_same_instance() {
        let mut map = map();
        let first = map.record_for(PrimaryKey::Int(1));
        let second = map.record_for(PrimaryKey::Int(1));
        let other = map.record_for(PrimaryKey::from("1"));

        assert!(first.ptr_eq(&second));
        assert!(!first.ptr_eq(&other));
        assert!(!first.is_loaded());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn insert_rejects_a_second_instance() {
        let mut map = map();
        let resident = map.record_for(PrimaryKey::Int(1));
        resident.apply_load(RawData::new());
        assert_eq!(map.insert(PrimaryKey::Int(1), &resident), Ok(None));

        let stranger = Record::shell(
            Arc::clone(map.descriptor()),
            PrimaryKey::Int(1),
            LogLevel::Information,
        );
        assert_eq!(
            map.insert(PrimaryKey::Int(1), &stranger),
            Err(StoreError::DuplicateIdentity {
                type_name: "person".to_string(),
                id: PrimaryKey::Int(1),
            })
        );
    }

    #[test]
    fn insert_replaces_an_unloaded_shell() {
        let mut map = map();
        map.record_for(PrimaryKey::Int(2));
        let shell = map.record_for(PrimaryKey::Int(1));
        let saved = Record::unsaved(Arc::clone(map.descriptor()), LogLevel::Information);

        let displaced = map.insert(PrimaryKey::Int(1), &saved).unwrap();

        assert!(displaced.is_some_and(|record| record.ptr_eq(&shell)));
        assert!(map.get(&PrimaryKey::Int(1)).is_some_and(|record| record.ptr_eq(&saved)));
        assert_eq!(map.len(), 2);
        let order: Vec<_> = map.all_loaded().map(|record| record.ptr_eq(&saved)).collect();
        assert_eq!(order, vec![true]);
    }

    #[test]
    fn all_loaded_skips_shells_and_keeps_insertion_order() {
        let mut map = map();
        for id in [3, 1, 2] {
            let record = map.record_for(PrimaryKey::Int(id));
            if id != 1 {
                record.apply_load(RawData::new());
            }
        }

        let loaded = map.all_loaded();
        let ids: Vec<_> = loaded.clone().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec![PrimaryKey::Int(3), PrimaryKey::Int(2)]);
        assert_eq!(loaded.count(), 2);
    }
}
