use std::sync::Arc;

use appmigrate_common::{Error, Result};

use crate::migrations::MigrationUnit;

/// An owner of an ordered list of migrations.
///
/// The order of `migrations()` is the order units are applied in and the
/// reverse of the order they are rolled back in. New units go at the end.
pub trait Application: Send + Sync {
    fn name(&self) -> &str;
    fn migrations(&self) -> Vec<Arc<dyn MigrationUnit>>;
}

/// An application assembled from units at runtime.
#[derive(Clone)]
pub struct AppDefinition {
    name: String,
    units: Vec<Arc<dyn MigrationUnit>>,
}

impl AppDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: Vec::new(),
        }
    }

    pub fn migration(mut self, unit: impl MigrationUnit + 'static) -> Self {
        self.units.push(Arc::new(unit));
        self
    }
}

impl Application for AppDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn migrations(&self) -> Vec<Arc<dyn MigrationUnit>> {
        self.units.clone()
    }
}

/// Applications known to a process, in registration order.
#[derive(Default)]
pub struct Registry {
    apps: Vec<Box<dyn Application>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, app: impl Application + 'static) -> Result<()> {
        if self.get(app.name()).is_some() {
            return Err(Error::DuplicateApplication(app.name().to_string()));
        }
        self.apps.push(Box::new(app));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Application> {
        self.apps
            .iter()
            .find(|app| app.name() == name)
            .map(|app| app.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Application> {
        self.apps.iter().map(|app| app.as_ref())
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
