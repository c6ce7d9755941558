use std::collections::BTreeMap;
use std::fmt;

use appmigrate_common::Result;
use serde::{Deserialize, Serialize};

/// Whether one unit of one application is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub app: String,
    pub unit: String,
    pub applied: bool,
}

impl MigrationStatus {
    pub fn new(app: impl Into<String>, unit: impl Into<String>, applied: bool) -> Self {
        Self {
            app: app.into(),
            unit: unit.into(),
            applied,
        }
    }
}

/// A list of statuses as returned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationsStatus(pub Vec<MigrationStatus>);

impl MigrationsStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: MigrationStatus) {
        self.0.push(status);
    }

    pub fn extend(&mut self, other: MigrationsStatus) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MigrationStatus> {
        self.0.iter()
    }

    /// Unit ids in list order.
    pub fn units(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.unit.as_str()).collect()
    }

    /// Statuses grouped by application name. Groups are sorted by name; each
    /// group keeps the order of the input.
    pub fn by_app(&self) -> BTreeMap<&str, Vec<&MigrationStatus>> {
        let mut grouped: BTreeMap<&str, Vec<&MigrationStatus>> = BTreeMap::new();
        for status in &self.0 {
            grouped.entry(status.app.as_str()).or_default().push(status);
        }
        grouped
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    pub fn print(&self) {
        print!("{self}");
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for MigrationsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (app, statuses) in self.by_app() {
            writeln!(f, "{app}:")?;
            for status in statuses {
                let marker = if status.applied { "[x]" } else { "[ ]" };
                writeln!(f, "{marker}  {}", status.unit)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl FromIterator<MigrationStatus> for MigrationsStatus {
    fn from_iter<I: IntoIterator<Item = MigrationStatus>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for MigrationsStatus {
    type Item = MigrationStatus;
    type IntoIter = std::vec::IntoIter<MigrationStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a MigrationsStatus {
    type Item = &'a MigrationStatus;
    type IntoIter = std::slice::Iter<'a, MigrationStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_markers_per_app() {
        let status: MigrationsStatus = [
            MigrationStatus::new("users", "0001_add_user", true),
            MigrationStatus::new("users", "0002_add_user_first_name", false),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            status.render(),
            "users:\n[x]  0001_add_user\n[ ]  0002_add_user_first_name\n\n"
        );
    }

    #[test]
    fn groups_by_app_name_and_keeps_unit_order() {
        let status: MigrationsStatus = [
            MigrationStatus::new("users", "0002_b", true),
            MigrationStatus::new("billing", "0001_invoices", false),
            MigrationStatus::new("users", "0001_a", true),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            status.render(),
            "billing:\n[ ]  0001_invoices\n\nusers:\n[x]  0002_b\n[x]  0001_a\n\n"
        );
        // grouping is display-only
        assert_eq!(status.units(), ["0002_b", "0001_invoices", "0001_a"]);
    }

    #[test]
    fn empty_renders_nothing() {
        assert_eq!(MigrationsStatus::new().render(), "");
    }

    #[test]
    fn json_is_a_flat_array() {
        let status: MigrationsStatus = [MigrationStatus::new("users", "0001_add_user", true)]
            .into_iter()
            .collect();
        let value: serde_json::Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{"app": "users", "unit": "0001_add_user", "applied": true}])
        );
    }
}
