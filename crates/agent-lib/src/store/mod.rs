//! Time-series store
//!
//! Fixed-schema, fixed-retention storage keyed by (entity, field):
//! - series are created lazily on the first write of a recognized field
//! - writes for any other field are rejected and create nothing
//! - series are grouped by entity kind so they can be enumerated per kind
//! - optional persistence as `<root>/<kind>/<entity>/<field>.json`

mod archive;

pub use archive::{Archive, RetentionPolicy, Sample, DEFAULT_ROWS, DEFAULT_STEP_SECS};

use crate::error::StoreError;
use crate::models::EntityId;
use crate::observability::AgentMetrics;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Entity kinds series are grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeriesKind {
    Account,
    InstanceType,
    Instance,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 3] = [
        SeriesKind::Account,
        SeriesKind::InstanceType,
        SeriesKind::Instance,
    ];

    /// Directory name, also used in API paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::InstanceType => "instance-type",
            Self::Instance => "instance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity a series belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesEntity {
    pub kind: SeriesKind,
    pub id: EntityId,
}

impl SeriesEntity {
    pub fn new(kind: SeriesKind, raw: &str) -> Self {
        Self {
            kind,
            id: EntityId::normalize(raw),
        }
    }

    pub fn account(name: &str) -> Self {
        Self::new(SeriesKind::Account, name)
    }

    pub fn instance_type(instance_type: &str) -> Self {
        Self::new(SeriesKind::InstanceType, instance_type)
    }

    /// Instance ids are only unique within a region
    pub fn instance(region: &EntityId, id: &EntityId) -> Self {
        Self {
            kind: SeriesKind::Instance,
            id: EntityId::in_region(region, id),
        }
    }

    /// Entity from an API path segment or series directory name. Instances
    /// are addressed as `<region>.<instance>`.
    pub fn parse(kind: SeriesKind, raw: &str) -> Self {
        match (kind, raw.split_once('.')) {
            (SeriesKind::Instance, Some((region, id))) => {
                Self::instance(&EntityId::normalize(region), &EntityId::normalize(id))
            }
            _ => Self::new(kind, raw),
        }
    }
}

impl fmt::Display for SeriesEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    entity: SeriesEntity,
    field: String,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity, self.field)
    }
}

/// Concurrent time-series store
pub struct TimeSeriesStore {
    fields: BTreeSet<String>,
    policy: RetentionPolicy,
    series: DashMap<SeriesKey, Archive>,
    root: Option<PathBuf>,
    metrics: AgentMetrics,
}

impl TimeSeriesStore {
    /// In-memory store accepting only `fields`
    pub fn new<I, S>(fields: I, policy: RetentionPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            policy,
            series: DashMap::new(),
            root: None,
            metrics: AgentMetrics::new(),
        }
    }

    /// Store persisted under `root`, loading whatever series already exist
    pub fn open<I, S>(root: impl Into<PathBuf>, fields: I, policy: RetentionPolicy) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::new(fields, policy);
        let root = root.into();

        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.display().to_string(),
            source,
        })?;
        store.root = Some(root);
        store.load()?;
        store.metrics.set_series_count(store.series.len() as i64);

        Ok(store)
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn is_recognized(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    fn key(&self, entity: &SeriesEntity, field: &str) -> Result<SeriesKey, StoreError> {
        if !self.is_recognized(field) {
            return Err(StoreError::UnrecognizedField {
                field: field.to_string(),
            });
        }
        Ok(SeriesKey {
            entity: entity.clone(),
            field: field.to_string(),
        })
    }

    /// Create the series if missing; returns true when it was created
    pub fn ensure_series(&self, entity: &SeriesEntity, field: &str) -> Result<bool, StoreError> {
        let key = self.key(entity, field)?;
        let mut created = false;
        self.series.entry(key).or_insert_with(|| {
            created = true;
            Archive::new(self.policy)
        });

        if created {
            debug!(entity = %entity, field = %field, "Created series");
            self.metrics.set_series_count(self.series.len() as i64);
        }
        Ok(created)
    }

    /// Write one sample, creating the series on first use
    pub fn append(
        &self,
        entity: &SeriesEntity,
        field: &str,
        timestamp: i64,
        value: f64,
    ) -> Result<(), StoreError> {
        self.ensure_series(entity, field)?;
        let key = self.key(entity, field)?;

        let result = match self.series.get_mut(&key) {
            Some(mut archive) => archive.insert(timestamp, value),
            None => Ok(()),
        };

        result.map_err(|oldest| StoreError::OutsideRetention {
            key: key.to_string(),
            timestamp,
            oldest,
        })?;

        self.metrics.inc_series_written();
        Ok(())
    }

    /// Samples of a series inside `[start, end]`, oldest first
    ///
    /// A recognized field that was never written yields no samples.
    pub fn query(
        &self,
        entity: &SeriesEntity,
        field: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<Sample>, StoreError> {
        let key = self.key(entity, field)?;
        Ok(self
            .series
            .get(&key)
            .map(|archive| archive.samples(start, end))
            .unwrap_or_default())
    }

    pub fn contains(&self, entity: &SeriesEntity, field: &str) -> bool {
        self.series.contains_key(&SeriesKey {
            entity: entity.clone(),
            field: field.to_string(),
        })
    }

    /// Entities of `kind` with at least one series, sorted
    pub fn list_entities(&self, kind: SeriesKind) -> Vec<SeriesEntity> {
        let entities: BTreeSet<SeriesEntity> = self
            .series
            .iter()
            .filter(|entry| entry.key().entity.kind == kind)
            .map(|entry| entry.key().entity.clone())
            .collect();
        entities.into_iter().collect()
    }

    /// Fields stored for an entity, sorted
    pub fn fields_of(&self, entity: &SeriesEntity) -> Vec<String> {
        let fields: BTreeSet<String> = self
            .series
            .iter()
            .filter(|entry| &entry.key().entity == entity)
            .map(|entry| entry.key().field.clone())
            .collect();
        fields.into_iter().collect()
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Persist every series changed since the last flush
    ///
    /// Returns the number of series written; a no-op without persistence.
    pub fn flush(&self) -> Result<usize, StoreError> {
        let Some(root) = &self.root else {
            return Ok(0);
        };

        let mut written = 0;
        for mut entry in self.series.iter_mut() {
            if !entry.value().is_dirty() {
                continue;
            }
            let path = series_path(root, &entry.key().entity, &entry.key().field);
            save_archive(&path, entry.value())?;
            entry.value_mut().mark_clean();
            written += 1;
        }

        if written > 0 {
            debug!(root = %root.display(), series = written, "Store flushed to disk");
        }
        Ok(written)
    }

    fn load(&mut self) -> Result<(), StoreError> {
        let Some(root) = self.root.clone() else {
            return Ok(());
        };

        for kind in SeriesKind::ALL {
            let kind_dir = root.join(kind.as_str());
            if !kind_dir.is_dir() {
                continue;
            }

            for entity_dir in read_dir(&kind_dir)? {
                if !entity_dir.is_dir() {
                    continue;
                }
                let Some(entity_name) = entity_dir.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let entity = SeriesEntity::parse(kind, entity_name);

                for file in read_dir(&entity_dir)? {
                    if file.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let Some(field) = file.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    if !self.is_recognized(field) {
                        warn!(path = %file.display(), "Ignoring persisted series of unrecognized field");
                        continue;
                    }

                    match load_archive(&file) {
                        Ok(mut archive) => {
                            archive.mark_clean();
                            self.series.insert(
                                SeriesKey {
                                    entity: entity.clone(),
                                    field: field.to_string(),
                                },
                                archive,
                            );
                        }
                        Err(e) => {
                            warn!(path = %file.display(), error = %e, "Failed to load persisted series, skipping");
                        }
                    }
                }
            }
        }

        info!(root = %root.display(), series = self.series.len(), "Loaded series from disk");
        Ok(())
    }
}

fn series_path(root: &Path, entity: &SeriesEntity, field: &str) -> PathBuf {
    root.join(entity.kind.as_str())
        .join(entity.id.as_str())
        .join(format!("{}.json", field))
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    paths.sort();
    Ok(paths)
}

fn save_archive(path: &Path, archive: &Archive) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_vec(archive).map_err(|source| StoreError::Serialization {
        path: path.display().to_string(),
        source,
    })?;

    // Write atomically using temp file
    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(io_err)?;
    file.write_all(&json).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;

    std::fs::rename(&temp_path, path).map_err(io_err)
}

fn load_archive(path: &Path) -> Result<Archive, StoreError> {
    let data = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| StoreError::Serialization {
        path: path.display().to_string(),
        source,
    })
}
