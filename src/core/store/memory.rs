//! In-process store used by tests and embedders

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};

use super::{ChangeOrderStore, Commit, StoreError, Write};
use crate::core::audit::{AuditEntry, AuditTrail};
use crate::core::identity::EntityId;
use crate::entities::change_order::ChangeOrder;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    orders: BTreeMap<EntityId, ChangeOrder>,
    trail: AuditTrail,
    /// Highest number ever issued per project; deletes never lower it
    issued: HashMap<String, u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    /// Everything that can fail is checked here, before anything is mutated
    fn check(&self, commit: &Commit) -> Result<(), StoreError> {
        match &commit.write {
            Write::Insert(co) => {
                if self.orders.contains_key(&co.id) {
                    return Err(StoreError::AlreadyExists(co.id.clone()));
                }
                let issued = self.issued.get(&co.project_id).copied().unwrap_or(0);
                if co.number <= issued {
                    return Err(StoreError::NumberTaken {
                        project_id: co.project_id.clone(),
                        number: co.number,
                    });
                }
            }
            Write::Update(co) => self.check_version(&co.id, commit.expected_version)?,
            Write::Delete(id) => self.check_version(id, commit.expected_version)?,
        }
        Ok(())
    }

    fn check_version(&self, id: &EntityId, expected: u32) -> Result<(), StoreError> {
        let stored = self
            .orders
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if stored.version != expected {
            return Err(StoreError::Conflict {
                id: id.clone(),
                expected,
                found: stored.version,
            });
        }
        Ok(())
    }
}

impl ChangeOrderStore for MemoryStore {
    fn next_number(&self, project_id: &str) -> Result<u32, StoreError> {
        Ok(self.issued.get(project_id).copied().unwrap_or(0) + 1)
    }

    fn get(&self, id: &EntityId) -> Result<Option<ChangeOrder>, StoreError> {
        Ok(self.orders.get(id).cloned())
    }

    fn list(&self, project_id: Option<&str>) -> Result<Vec<ChangeOrder>, StoreError> {
        let mut orders: Vec<ChangeOrder> = self
            .orders
            .values()
            .filter(|o| project_id.map_or(true, |p| o.project_id == p))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.project_id
                .cmp(&b.project_id)
                .then(a.number.cmp(&b.number))
        });
        Ok(orders)
    }

    fn commit(&mut self, commit: Commit) -> Result<Vec<AuditEntry>, StoreError> {
        self.check(&commit)?;

        match commit.write {
            Write::Insert(co) => {
                self.issued.insert(co.project_id.clone(), co.number);
                self.orders.insert(co.id.clone(), co);
            }
            Write::Update(co) => {
                self.orders.insert(co.id.clone(), co);
            }
            Write::Delete(id) => {
                self.orders.remove(&id);
            }
        }

        let now = Utc::now();
        Ok(commit
            .audit
            .into_iter()
            .map(|entry| self.trail.append_at(entry, now).clone())
            .collect())
    }

    fn audit(&self, id: &EntityId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.trail.list(id).to_vec())
    }
}
