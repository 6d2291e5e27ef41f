//! The wheel - the background task that keeps the cog tree turning.
//!
//! On each turn the wheel scans the cogs directory for units it doesn't know
//! yet and imports them, then reloads or retries every unit whose backing
//! file changed since the previous turn. Directory walks, mtime checks and
//! unit imports all run on the blocking pool; the registry write lock is
//! taken only to swap a record in, so dispatch never waits behind a `dlopen`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

use crate::domain::entities::is_valid;
use crate::plugins::registry::{reload_unit, SharedRegistry};

pub struct Wheel {
    registry: SharedRegistry,
    root: PathBuf,
    interval: Duration,
    /// Discover and import units that appear while running
    import: bool,
    /// Reload units whose backing file changed
    reload: bool,
    last_scan: SystemTime,
}

impl Wheel {
    pub fn new(
        registry: SharedRegistry,
        root: impl Into<PathBuf>,
        interval: Duration,
        import: bool,
        reload: bool,
    ) -> Self {
        Self {
            registry,
            root: root.into(),
            interval,
            import,
            reload,
            last_scan: SystemTime::now(),
        }
    }

    /// Import everything currently on disk, synchronously. Run once at
    /// startup, before the bot starts answering.
    pub fn prime(&mut self) {
        self.last_scan = SystemTime::now();
        let mut found = Vec::new();
        {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            collect_units(
                &self.root,
                None,
                registry.loader().unit_extension(),
                registry.loader().entry_stem(),
                &mut found,
            );
        }
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        for unit in found {
            registry.load(&unit.stem, &unit.path, unit.parent.as_deref());
        }
    }

    /// Turn until told to shut down
    pub async fn run(mut self, mut shutdown: watch::Receiver<Option<i32>>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => self.turn().await,
            }
        }
        tracing::debug!("wheel stopped");
    }

    async fn turn(&mut self) {
        let since = self.last_scan;
        self.last_scan = SystemTime::now();
        if self.import {
            self.scan().await;
        }
        if self.reload {
            self.refresh(since).await;
        }
    }

    /// Walk the cogs directory on the blocking pool and import unknown
    /// units. A directory with an entry unit is a parent cog; its siblings
    /// inside become sub-cogs.
    async fn scan(&self) {
        let root = self.root.clone();
        let (extension, entry) = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            (
                registry.loader().unit_extension().to_string(),
                registry.loader().entry_stem().to_string(),
            )
        };
        let walk = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            collect_units(&root, None, &extension, &entry, &mut found);
            found
        });
        let mut found = match walk.await {
            Ok(found) => found,
            Err(_) => return,
        };
        {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            found.retain(|unit| !registry.known_unit(&unit.path));
        }
        // Sequential on purpose: a parent must be installed before its
        // children are checked against its command table.
        for unit in found {
            self.adopt(unit).await;
        }
    }

    /// Import one discovered unit off the lock and swap it in
    async fn adopt(&self, unit: DiscoveredUnit) {
        let (importer, qualified) = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            if registry.known_unit(&unit.path) {
                return;
            }
            // A sub-cog may not shadow a command of its parent
            if let Some(parent) = unit.parent.as_deref() {
                if registry
                    .cog(parent)
                    .is_some_and(|cog| cog.table.has(&unit.stem))
                {
                    tracing::error!(
                        "sub-cog '{}' of cog '{}' couldn't be loaded because a command with the same name exists",
                        unit.stem,
                        parent
                    );
                    return;
                }
            }
            let qualified = match unit.parent.as_deref() {
                Some(parent) => format!("{}.{}", parent, unit.stem),
                None => unit.stem.clone(),
            };
            (registry.importer(), qualified)
        };
        let key = qualified.clone();
        let import = tokio::task::spawn_blocking(move || {
            importer.import(qualified, unit.stem, unit.path, unit.parent, BTreeSet::new())
        });
        let record = match import.await {
            Ok(record) => record,
            Err(_) => return,
        };
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        registry.install(key, record);
    }

    /// Reload loaded units and retry failed ones whose file changed
    async fn refresh(&self, since: SystemTime) {
        let watched: Vec<(String, PathBuf)> = {
            let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
            registry
                .records()
                .filter_map(|record| {
                    record
                        .path
                        .clone()
                        .map(|path| (record.name.clone(), path))
                })
                .collect()
        };
        let stat = tokio::task::spawn_blocking(move || {
            watched
                .into_iter()
                .filter(|(_, path)| {
                    std::fs::metadata(path)
                        .ok()
                        .and_then(|meta| meta.modified().ok())
                        .is_some_and(|modified| modified > since)
                })
                .map(|(name, _)| name)
                .collect::<Vec<String>>()
        });
        let stale = match stat.await {
            Ok(stale) => stale,
            Err(_) => return,
        };
        for name in stale {
            reload_unit(&self.registry, &name).await;
        }
    }
}

struct DiscoveredUnit {
    stem: String,
    path: PathBuf,
    parent: Option<String>,
}

fn collect_units(
    dir: &Path,
    parent: Option<&str>,
    extension: &str,
    entry_stem: &str,
    out: &mut Vec<DiscoveredUnit>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("couldn't scan {}: {}", dir.display(), err);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };
        if path.is_dir() {
            // A directory is a cog only if it carries an entry unit
            let entry_path = path.join(format!("{}.{}", entry_stem, extension));
            if !entry_path.is_file() {
                continue;
            }
            if !is_valid(&stem) {
                tracing::debug!("skipping invalid cog directory '{}'", stem);
                continue;
            }
            let qualified = match parent {
                Some(parent_name) => format!("{}.{}", parent_name, stem),
                None => stem.clone(),
            };
            out.push(DiscoveredUnit {
                stem,
                path: entry_path,
                parent: parent.map(String::from),
            });
            collect_units(&path, Some(&qualified), extension, entry_stem, out);
        } else {
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if stem == entry_stem {
                continue;
            }
            if !is_valid(&stem) {
                tracing::debug!("skipping invalid unit name '{}'", stem);
                continue;
            }
            out.push(DiscoveredUnit {
                stem,
                path,
                parent: parent.map(String::from),
            });
        }
    }
}
