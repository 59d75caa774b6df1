//! Schema migrations with automatic rollback

use crate::errors::{DataError, Result};
use crate::semver::SchemaVersion;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One reversible schema step. `version` is the schema version the step
/// produces when applied with `up`.
pub trait Migration: Send + Sync {
    fn id(&self) -> &str;

    fn version(&self) -> SchemaVersion;

    fn description(&self) -> &str {
        ""
    }

    fn up(&self, data: Value) -> Result<Value>;

    fn down(&self, data: Value) -> Result<Value>;
}

type StepFn = Box<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Migration built from a pair of closures
pub struct FnMigration {
    id: String,
    version: SchemaVersion,
    description: String,
    up: StepFn,
    down: StepFn,
}

impl FnMigration {
    pub fn new<U, D>(id: impl Into<String>, version: SchemaVersion, up: U, down: D) -> Self
    where
        U: Fn(Value) -> Result<Value> + Send + Sync + 'static,
        D: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            version,
            description: String::new(),
            up: Box::new(up),
            down: Box::new(down),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Migration for FnMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> SchemaVersion {
        self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn up(&self, data: Value) -> Result<Value> {
        (self.up)(data)
    }

    fn down(&self, data: Value) -> Result<Value> {
        (self.down)(data)
    }
}

impl fmt::Debug for FnMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMigration")
            .field("id", &self.id)
            .field("version", &self.version)
            .finish()
    }
}

/// Step registry plus the bookkeeping needed to undo applied steps
pub struct MigrationManager {
    steps: HashMap<String, Arc<dyn Migration>>,
    applied: BTreeSet<String>,
    current: SchemaVersion,
}

impl MigrationManager {
    /// Manager for data currently at `current`
    pub fn new(current: SchemaVersion) -> Self {
        Self {
            steps: HashMap::new(),
            applied: BTreeSet::new(),
            current,
        }
    }

    pub fn register(&mut self, step: Arc<dyn Migration>) -> Result<()> {
        let id = step.id().to_string();
        if self.steps.contains_key(&id) {
            return Err(DataError::MigrationStepConflict(id));
        }
        debug!(step = %id, version = %step.version(), "Registered migration");
        self.steps.insert(id, step);
        Ok(())
    }

    pub fn current_version(&self) -> SchemaVersion {
        self.current
    }

    /// Ids of steps whose `up` has run and not been undone
    pub fn applied(&self) -> Vec<&str> {
        self.applied.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps between two versions in application order.
    ///
    /// Upgrading picks steps in `(from, to]` ascending; downgrading picks
    /// steps in `(to, from]` descending, to be applied with `down`.
    pub fn get_migration_path(
        &self,
        from: SchemaVersion,
        to: SchemaVersion,
    ) -> Vec<Arc<dyn Migration>> {
        let mut sorted: Vec<&Arc<dyn Migration>> = self.steps.values().collect();
        sorted.sort_by(|a, b| a.version().cmp(&b.version()).then_with(|| a.id().cmp(b.id())));

        match to.cmp(&from) {
            Ordering::Greater => sorted
                .into_iter()
                .filter(|step| step.version() > from && step.version() <= to)
                .cloned()
                .collect(),
            Ordering::Less => sorted
                .into_iter()
                .rev()
                .filter(|step| step.version() <= from && step.version() > to)
                .cloned()
                .collect(),
            Ordering::Equal => Vec::new(),
        }
    }

    /// Bring `data` from the current version to `target`.
    ///
    /// If an `up` step fails, the steps already applied are reverted and the
    /// error comes back as [`DataError::MigrationFailed`] carrying the
    /// restored data. A lower `target` behaves like [`Self::rollback`].
    pub fn migrate(&mut self, data: Value, target: SchemaVersion) -> Result<Value> {
        if target < self.current {
            return self.rollback(data, target);
        }

        let path = self.get_migration_path(self.current, target);
        let mut done: Vec<Arc<dyn Migration>> = Vec::with_capacity(path.len());
        let mut data = data;

        for step in path {
            // `up` consumes the value, so keep a copy to roll back from
            match step.up(data.clone()) {
                Ok(next) => {
                    debug!(step = %step.id(), version = %step.version(), "Applied migration");
                    data = next;
                    done.push(step);
                }
                Err(err) => {
                    warn!(step = %step.id(), error = %err, "Migration failed, rolling back");
                    let restored = Self::revert(data, &done)?;
                    return Err(DataError::MigrationFailed {
                        step: step.id().to_string(),
                        source: Box::new(err),
                        restored,
                    });
                }
            }
        }

        self.applied
            .extend(done.iter().map(|step| step.id().to_string()));
        info!(from = %self.current, to = %target, steps = done.len(), "Migration complete");
        self.current = target;
        Ok(data)
    }

    /// Run `down` for every step between the current version and `target`
    pub fn rollback(&mut self, data: Value, target: SchemaVersion) -> Result<Value> {
        if target > self.current {
            return Err(DataError::InvalidVersion(format!(
                "cannot roll back from {} to newer {}",
                self.current, target
            )));
        }

        let path = self.get_migration_path(self.current, target);
        let mut data = data;
        for step in &path {
            data = step.down(data).map_err(|err| DataError::RollbackFailed {
                step: step.id().to_string(),
                source: Box::new(err),
            })?;
            debug!(step = %step.id(), "Reverted migration");
        }

        for step in &path {
            self.applied.remove(step.id());
        }
        info!(from = %self.current, to = %target, steps = path.len(), "Rollback complete");
        self.current = target;
        Ok(data)
    }

    /// Undo `done` newest first
    fn revert(data: Value, done: &[Arc<dyn Migration>]) -> Result<Value> {
        done.iter().rev().try_fold(data, |data, step| {
            step.down(data).map_err(|err| DataError::RollbackFailed {
                step: step.id().to_string(),
                source: Box::new(err),
            })
        })
    }
}

impl fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationManager")
            .field("steps", &self.steps.len())
            .field("applied", &self.applied)
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(s: &str) -> SchemaVersion {
        s.parse().unwrap()
    }

    fn set_field(id: &str, version: &str, key: &'static str) -> Arc<dyn Migration> {
        Arc::new(FnMigration::new(
            id,
            v(version),
            move |mut data| {
                data[key] = json!(true);
                Ok(data)
            },
            move |mut data| {
                if let Some(object) = data.as_object_mut() {
                    object.remove(key);
                }
                Ok(data)
            },
        ))
    }

    #[test]
    fn test_duplicate_id_conflicts() {
        let mut manager = MigrationManager::new(v("1.0.0"));
        manager.register(set_field("a", "1.1.0", "a")).unwrap();

        let err = manager.register(set_field("a", "1.2.0", "b")).unwrap_err();
        assert!(matches!(err, DataError::MigrationStepConflict(id) if id == "a"));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_path_selection_both_directions() {
        let mut manager = MigrationManager::new(v("1.0.0"));
        for (id, version) in [("c", "2.0.0"), ("a", "1.1.0"), ("b", "1.2.0"), ("d", "3.0.0")] {
            manager.register(set_field(id, version, "x")).unwrap();
        }

        let ids = |path: Vec<Arc<dyn Migration>>| -> Vec<String> {
            path.iter().map(|s| s.id().to_string()).collect()
        };

        assert_eq!(ids(manager.get_migration_path(v("1.0.0"), v("2.0.0"))), ["a", "b", "c"]);
        assert_eq!(ids(manager.get_migration_path(v("2.0.0"), v("1.1.0"))), ["c", "b"]);
        assert!(manager.get_migration_path(v("1.2.0"), v("1.2.0")).is_empty());
    }

    #[test]
    fn test_rollback_then_forward_again() {
        let mut manager = MigrationManager::new(v("1.0.0"));
        manager.register(set_field("a", "1.1.0", "a")).unwrap();
        manager.register(set_field("b", "2.0.0", "b")).unwrap();

        let up = manager.migrate(json!({}), v("2.0.0")).unwrap();
        assert_eq!(up, json!({ "a": true, "b": true }));
        assert_eq!(manager.applied(), vec!["a", "b"]);

        let down = manager.migrate(up, v("1.1.0")).unwrap();
        assert_eq!(down, json!({ "a": true }));
        assert_eq!(manager.applied(), vec!["a"]);
        assert_eq!(manager.current_version(), v("1.1.0"));
    }

    #[test]
    fn test_rollback_to_newer_is_rejected() {
        let mut manager = MigrationManager::new(v("1.0.0"));
        assert!(matches!(
            manager.rollback(json!({}), v("2.0.0")),
            Err(DataError::InvalidVersion(_))
        ));
    }
}
