//! Per-video variable values keyed by (video, template, name)

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::composer::{SystemDefaults, extract_variables};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Template, VideoVariable, VideoVariableView};

/// Variable names each template of a container needs, in container order,
/// with system-provided names removed
pub fn required_variables(templates: &[Template]) -> Vec<(i64, String)> {
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for template in templates {
        for name in extract_variables(&template.content) {
            if SystemDefaults::is_system_variable(&name) {
                continue;
            }
            if seen.insert((template.id, name.clone())) {
                pairs.push((template.id, name));
            }
        }
    }
    pairs
}

pub struct VariableStore {
    db: Arc<Database>,
}

impl VariableStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Add an empty row for every variable the container needs that the video
    /// lacks. Existing values are never touched. Returns the number of rows added.
    pub fn ensure_variables_for_assignment(&self, video_id: i64, container_id: i64) -> Result<usize> {
        let templates = self.db.list_container_templates(container_id)?;
        self.ensure_for_templates(video_id, &templates)
    }

    /// Backfill against an already loaded template order
    pub fn ensure_for_templates(&self, video_id: i64, templates: &[Template]) -> Result<usize> {
        let pairs = required_variables(templates);
        if pairs.is_empty() {
            return Ok(0);
        }
        let inserted = self.db.insert_missing_video_variables(video_id, &pairs)?;
        if inserted > 0 {
            log::debug!("[VARS] Backfilled {} variables for video {}", inserted, video_id);
        }
        Ok(inserted)
    }

    /// Insert or update values. Every referenced template must exist.
    pub fn upsert_values(&self, video_id: i64, entries: &[VideoVariable]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        for entry in entries {
            if entry.name.trim().is_empty() {
                return Err(Error::Validation("variable name must not be empty".to_string()));
            }
            if SystemDefaults::is_system_variable(entry.name.trim()) {
                return Err(Error::Validation(format!(
                    "'{}' is provided by the system and cannot be set",
                    entry.name
                )));
            }
        }

        let referenced: Vec<i64> = entries.iter().map(|e| e.template_id).collect();
        let existing = self.db.existing_template_ids(&referenced)?;
        if let Some(orphan) = referenced.iter().find(|id| !existing.contains(id)) {
            return Err(Error::NotFound(format!("template {}", orphan)));
        }

        let normalized: Vec<VideoVariable> = entries
            .iter()
            .map(|e| VideoVariable {
                video_id,
                template_id: e.template_id,
                name: e.name.trim().to_string(),
                value: e.value.clone(),
            })
            .collect();
        self.db.upsert_video_variables(video_id, &normalized)?;
        Ok(())
    }

    pub fn list_for_video(&self, video_id: i64) -> Result<Vec<VideoVariableView>> {
        Ok(self.db.list_video_variable_views(video_id)?)
    }

    /// Non-empty values of a video grouped by template. Empty values are left
    /// out so their placeholders stay visible in the composed text.
    pub fn values_by_template(&self, video_id: i64) -> Result<HashMap<i64, HashMap<String, String>>> {
        let mut grouped: HashMap<i64, HashMap<String, String>> = HashMap::new();
        for variable in self.db.list_video_variables(video_id)? {
            if variable.value.is_empty() {
                continue;
            }
            grouped
                .entry(variable.template_id)
                .or_default()
                .insert(variable.name, variable.value);
        }
        Ok(grouped)
    }
}
