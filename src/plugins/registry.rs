//! Plugin registry - an arena of cog instances keyed by qualified name.
//!
//! Units move through `Loading -> {Loaded, FailedNoExport, FailedException}`;
//! a reload constructs a new instance, migrates the sub-cog set and swaps the
//! registry entry in one step. Failed units keep their record so the wheel
//! can retry them on the next staleness signal.
//!
//! Opening a unit and building its cog involve file I/O and arbitrary plugin
//! code, so that work lives in [`CogImporter`], which callers clone out of
//! the registry and run off the lock; only the record swap mutates the
//! shared table. [`reload_unit`] is the serving-path entry point.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use crate::domain::entities::{is_valid, Capabilities, CommandSpec, GuildSettings};
use crate::plugins::cog::{Cog, CogModule, Context};
use crate::plugins::loader::{CogLoader, ModuleHandle};

/// Load state of one named unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CogState {
    Loaded,
    /// Module opened but exported no cog descriptor; the handle is retained
    /// for a cheap re-export, with a fresh import from disk as the fallback
    FailedNoExport,
    /// Import or init failed; retried from scratch on the next staleness
    /// signal
    FailedException,
}

impl CogState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CogState::Loaded => "loaded",
            CogState::FailedNoExport => "failed (no export)",
            CogState::FailedException => "failed (error)",
        }
    }
}

/// One tracked unit
pub struct CogRecord {
    pub name: String,
    /// Filesystem-derived leaf name, kept stable across renames
    pub stem: String,
    /// Backing file; `None` for built-in cogs, which never go stale
    pub path: Option<PathBuf>,
    pub state: CogState,
    pub cog: Option<Cog>,
    module: Option<Box<dyn CogModule>>,
    handle: Option<Box<dyn ModuleHandle>>,
    pub loaded_at: SystemTime,
    pub subcogs: BTreeSet<String>,
    pub parent: Option<String>,
}

impl CogRecord {
    fn teardown(&mut self, config_dir: &Path) {
        if let (Some(module), Some(cog)) = (self.module.as_ref(), self.cog.as_ref()) {
            let result = catch_unwind(AssertUnwindSafe(|| module.on_exit(cog)));
            if result.is_err() {
                tracing::error!("exit hook of cog '{}' panicked", self.name);
            }
            if let Err(err) = cog.save_config(config_dir) {
                tracing::warn!("couldn't save config for cog '{}': {}", self.name, err);
            }
        }
        self.cog = None;
        self.module = None;
    }
}

pub type SharedRegistry = Arc<RwLock<PluginRegistry>>;

/// What an off-lock re-import needs, captured under the write lock by
/// [`PluginRegistry::begin_reload`]
pub struct ReloadPlan {
    name: String,
    stem: String,
    path: PathBuf,
    parent: Option<String>,
    subcogs: BTreeSet<String>,
}

pub struct PluginRegistry {
    cogs: BTreeMap<String, CogRecord>,
    importer: CogImporter,
}

impl PluginRegistry {
    pub fn new(loader: Arc<dyn CogLoader>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            cogs: BTreeMap::new(),
            importer: CogImporter {
                loader,
                config_dir: config_dir.into(),
            },
        }
    }

    pub fn loader(&self) -> &dyn CogLoader {
        self.importer.loader.as_ref()
    }

    /// Clonable import machinery, for callers that open units off the lock
    pub fn importer(&self) -> CogImporter {
        self.importer.clone()
    }

    /// Whether a unit is tracked, in any state
    pub fn known(&self, name: &str) -> bool {
        self.cogs.contains_key(name)
    }

    /// Whether some unit is backed by this file. Keyed on the path rather
    /// than the name so a cog that renamed itself is not re-imported.
    pub fn known_unit(&self, path: &Path) -> bool {
        self.cogs
            .values()
            .any(|record| record.path.as_deref() == Some(path))
    }

    pub fn record(&self, name: &str) -> Option<&CogRecord> {
        self.cogs.get(name)
    }

    /// The cog instance, if the unit is loaded
    pub fn cog(&self, name: &str) -> Option<&Cog> {
        self.cogs.get(name).and_then(|record| record.cog.as_ref())
    }

    pub fn records(&self) -> impl Iterator<Item = &CogRecord> {
        self.cogs.values()
    }

    pub fn loaded_cogs(&self) -> impl Iterator<Item = &Cog> {
        self.cogs.values().filter_map(|record| record.cog.as_ref())
    }

    /// Install a cog compiled into the bot itself. Built-ins take part in
    /// dispatch like any unit but are exempt from staleness.
    pub fn install_builtin(&mut self, module: Box<dyn CogModule>) -> Option<String> {
        let name = match module.name_override() {
            Some(name) if is_valid(name) => name.to_string(),
            other => {
                tracing::error!("builtin cog has no valid name ({:?})", other);
                return None;
            }
        };
        let record = self
            .importer
            .instantiate(name.clone(), name.clone(), module, None, None, None);
        let state = record.state;
        self.cogs.insert(name.clone(), record);
        match state {
            CogState::Loaded => {
                tracing::info!("installed builtin cog '{}'", name);
                Some(name)
            }
            _ => None,
        }
    }

    /// Import a unit and install it, synchronously. Used at startup (explicit
    /// `--load` lists, priming) where nothing contends for the lock; serving
    /// paths go through [`reload_unit`] or the wheel's off-lock adoption.
    /// Returns the unit's final state; every failure leaves a record behind
    /// so the wheel can retry, except for rejected names, which are never
    /// tracked.
    pub fn load(&mut self, stem: &str, path: &Path, parent: Option<&str>) -> Option<CogState> {
        if !is_valid(stem) {
            tracing::error!("invalid cog name '{}'", stem);
            return None;
        }
        // A sub-cog may not shadow a command of its parent
        if let Some(parent_name) = parent {
            if self.cog(parent_name).is_some_and(|cog| cog.table.has(stem)) {
                tracing::error!(
                    "sub-cog '{}' of cog '{}' couldn't be loaded because a command with the same name exists",
                    stem,
                    parent_name
                );
                return None;
            }
        }
        let qualified = match parent {
            Some(parent_name) => format!("{}.{}", parent_name, stem),
            None => stem.to_string(),
        };
        let record = self.importer.import(
            qualified.clone(),
            stem.to_string(),
            path.to_path_buf(),
            parent.map(String::from),
            BTreeSet::new(),
        );
        self.install(qualified, record)
    }

    /// Cheap recovery for a unit that opened but exported nothing: the
    /// retained handle may expose the descriptor now. Does not touch the
    /// file; callers fall back to a fresh import when the unit stays failed.
    pub fn retry_export(&mut self, name: &str) -> Option<CogState> {
        let record = self.cogs.get_mut(name)?;
        if record.state != CogState::FailedNoExport {
            return Some(record.state);
        }
        let Some(module) = record.handle.as_ref().and_then(|h| h.export()) else {
            return Some(CogState::FailedNoExport);
        };
        let mut record = self.cogs.remove(name)?;
        let mut fresh = self.importer.instantiate(
            record.name.clone(),
            record.stem.clone(),
            module,
            record.handle.take(),
            record.path.clone(),
            record.parent.clone(),
        );
        fresh.subcogs = record.subcogs.clone();
        self.install(name.to_string(), fresh)
    }

    /// Tear down a unit's instance under the lock and hand back what an
    /// off-lock re-import needs. The unit stays tracked as failed until
    /// [`PluginRegistry::replace`] swaps the fresh record in. `None` for
    /// unknown units and built-ins, which have no backing file.
    pub fn begin_reload(&mut self, name: &str) -> Option<ReloadPlan> {
        let config_dir = self.importer.config_dir.clone();
        let record = self.cogs.get_mut(name)?;
        let path = record.path.clone()?;
        record.teardown(&config_dir);
        record.state = CogState::FailedException;
        Some(ReloadPlan {
            name: record.name.clone(),
            stem: record.stem.clone(),
            path,
            parent: record.parent.clone(),
            subcogs: record.subcogs.clone(),
        })
    }

    /// Swap a freshly imported record in over `name`, tearing down whatever
    /// instance is still there. Re-keys if the new instance renamed itself.
    pub fn replace(&mut self, name: &str, record: CogRecord) -> Option<CogState> {
        if let Some(mut old) = self.cogs.remove(name) {
            old.teardown(&self.importer.config_dir);
        }
        self.install(name.to_string(), record)
    }

    /// Tear down a unit and forget it, children first
    pub fn remove(&mut self, name: &str) {
        let children: Vec<String> = self
            .cogs
            .get(name)
            .map(|record| record.subcogs.iter().cloned().collect())
            .unwrap_or_default();
        for child in children {
            self.remove(&child);
        }
        if let Some(mut record) = self.cogs.remove(name) {
            record.teardown(&self.importer.config_dir);
            if let Some(parent) = record.parent.as_ref() {
                if let Some(parent_record) = self.cogs.get_mut(parent) {
                    parent_record.subcogs.remove(name);
                }
            }
            tracing::info!("removed cog '{}'", name);
        }
    }

    /// Signal every loaded cog's exit hook and save its config; used by
    /// shutdown and restart
    pub fn shutdown_all(&mut self) {
        let config_dir = self.importer.config_dir.clone();
        for record in self.cogs.values_mut() {
            if record.cog.is_some() {
                record.teardown(&config_dir);
                record.state = CogState::FailedException;
            }
        }
        tracing::info!("all cogs unloaded");
    }

    /// Cross-cog search for a bare command name, honoring the guild
    /// blacklist and the caller's capabilities
    pub fn find_command(
        &self,
        name: &str,
        settings: &GuildSettings,
        caps: &Capabilities,
    ) -> Vec<(String, Arc<CommandSpec>)> {
        self.loaded_cogs()
            .filter(|cog| settings.allows(&cog.name))
            .filter(|cog| cog.table.has(name))
            .filter_map(|cog| {
                cog.table
                    .get_permitted(name, caps)
                    .map(|spec| (cog.name.clone(), spec))
            })
            .collect()
    }

    /// Fire an event hook on every loaded cog the guild allows, collecting
    /// the textual replies. A panicking hook is logged and skipped.
    pub fn emit(&self, event: &str, ctx: &Context, settings: &GuildSettings) -> Vec<String> {
        let mut replies = Vec::new();
        for cog in self.loaded_cogs() {
            if !settings.allows(&cog.name) {
                continue;
            }
            for handler in cog.event_handlers(event) {
                match catch_unwind(AssertUnwindSafe(|| handler(ctx))) {
                    Ok(Ok(Some(reply))) => replies.push(reply),
                    Ok(Ok(None)) => {}
                    Ok(Err(err)) => {
                        tracing::warn!("event '{}' handler in cog '{}' failed: {}", event, cog.name, err)
                    }
                    Err(_) => {
                        tracing::error!("event '{}' handler in cog '{}' panicked", event, cog.name)
                    }
                }
            }
        }
        replies
    }

    /// Swap the record in under its (possibly new) key and fix up the
    /// parent's sub-cog set and the children's parent pointers.
    pub fn install(&mut self, old_key: String, record: CogRecord) -> Option<CogState> {
        let new_key = record.name.clone();
        let state = record.state;
        if new_key != old_key {
            tracing::info!("cog '{}' renamed itself to '{}'", old_key, new_key);
            if let Some(parent) = record.parent.as_ref() {
                if let Some(parent_record) = self.cogs.get_mut(parent) {
                    parent_record.subcogs.remove(&old_key);
                    parent_record.subcogs.insert(new_key.clone());
                }
            }
            let children: Vec<String> = record.subcogs.iter().cloned().collect();
            for child in children {
                if let Some(child_record) = self.cogs.get_mut(&child) {
                    child_record.parent = Some(new_key.clone());
                }
            }
        } else if let Some(parent) = record.parent.as_ref() {
            if let Some(parent_record) = self.cogs.get_mut(parent) {
                parent_record.subcogs.insert(new_key.clone());
            }
        }
        self.cogs.insert(new_key, record);
        Some(state)
    }
}

/// Reload a unit without stalling dispatch: the cheap no-export re-export
/// runs under the write lock, the file open and cog construction run on the
/// blocking pool, and the lock is re-taken only to swap the record in.
/// Returns the unit's new state, `None` for unknown units.
pub async fn reload_unit(registry: &SharedRegistry, name: &str) -> Option<CogState> {
    let (importer, plan) = {
        let mut reg = registry.write().unwrap_or_else(|e| e.into_inner());
        let (state, builtin) = {
            let record = reg.record(name)?;
            (record.state, record.path.is_none())
        };
        if builtin {
            return Some(CogState::Loaded);
        }
        if state == CogState::FailedNoExport && reg.retry_export(name) == Some(CogState::Loaded) {
            return Some(CogState::Loaded);
        }
        (reg.importer(), reg.begin_reload(name)?)
    };
    tracing::info!("reloading cog '{}'", name);
    let fresh = match tokio::task::spawn_blocking(move || importer.import_plan(plan)).await {
        Ok(record) => record,
        Err(_) => {
            tracing::error!("import task for cog '{}' panicked", name);
            return Some(CogState::FailedException);
        }
    };
    let mut reg = registry.write().unwrap_or_else(|e| e.into_inner());
    reg.replace(name, fresh)
}

/// The part of loading that opens files and runs plugin code. Detached from
/// the registry so it can run without holding the lock.
#[derive(Clone)]
pub struct CogImporter {
    loader: Arc<dyn CogLoader>,
    config_dir: PathBuf,
}

impl CogImporter {
    pub fn import_plan(&self, plan: ReloadPlan) -> CogRecord {
        self.import(plan.name, plan.stem, plan.path, plan.parent, plan.subcogs)
    }

    pub fn import(
        &self,
        qualified: String,
        stem: String,
        path: PathBuf,
        parent: Option<String>,
        subcogs: BTreeSet<String>,
    ) -> CogRecord {
        let failed = |state: CogState, handle: Option<Box<dyn ModuleHandle>>| CogRecord {
            name: qualified.clone(),
            stem: stem.clone(),
            path: Some(path.clone()),
            state,
            cog: None,
            module: None,
            handle,
            loaded_at: SystemTime::now(),
            subcogs: subcogs.clone(),
            parent: parent.clone(),
        };
        let handle = match self.loader.open(&path) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!("couldn't import cog '{}': {}", qualified, err);
                return failed(CogState::FailedException, None);
            }
        };
        let Some(module) = handle.export() else {
            tracing::error!("cog '{}' exports no descriptor", qualified);
            return failed(CogState::FailedNoExport, Some(handle));
        };
        let mut record = self.instantiate(
            qualified,
            stem,
            module,
            Some(handle),
            Some(path),
            parent,
        );
        record.subcogs = subcogs;
        record
    }

    /// Build the cog instance from an exported module: resolve the final
    /// name, run setup, load config, then the init hook. A panic anywhere in
    /// there leaves a `FailedException` record with no residual entries.
    fn instantiate(
        &self,
        qualified: String,
        stem: String,
        module: Box<dyn CogModule>,
        handle: Option<Box<dyn ModuleHandle>>,
        path: Option<PathBuf>,
        parent: Option<String>,
    ) -> CogRecord {
        let mut name = qualified;
        if let Some(ovr) = module.name_override() {
            if is_valid(ovr) {
                name = match parent.as_ref() {
                    Some(parent_name) => format!("{}.{}", parent_name, ovr),
                    None => ovr.to_string(),
                };
            } else {
                tracing::warn!("ignoring invalid name override '{}' for '{}'", ovr, name);
            }
        }
        let config_dir = self.config_dir.clone();
        let built = catch_unwind(AssertUnwindSafe(|| {
            let mut cog = Cog::new(name.clone());
            cog.set_config_format(module.config_format());
            module.setup(&mut cog);
            if let Err(err) = cog.load_config(&config_dir) {
                tracing::warn!("couldn't load config for cog '{}': {}", name, err);
            }
            module.on_init(&cog);
            cog
        }));
        match built {
            Ok(cog) => {
                tracing::info!("loaded cog '{}' ({} commands)", name, cog.table.len());
                CogRecord {
                    name,
                    stem,
                    path,
                    state: CogState::Loaded,
                    cog: Some(cog),
                    module: Some(module),
                    handle,
                    loaded_at: SystemTime::now(),
                    subcogs: BTreeSet::new(),
                    parent,
                }
            }
            Err(_) => {
                tracing::error!("cog '{}' panicked during setup/init", name);
                CogRecord {
                    name,
                    stem,
                    path,
                    state: CogState::FailedException,
                    cog: None,
                    module: None,
                    handle,
                    loaded_at: SystemTime::now(),
                    subcogs: BTreeSet::new(),
                    parent,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::errors::PluginError;
    use crate::domain::entities::CommandSpec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Script of what a stub unit exports on the next open. Handles snapshot
    /// their script when opened, like a mapped library: a swapped script is
    /// only visible to a fresh open.
    #[derive(Clone)]
    pub(crate) enum Script {
        Missing,
        NoExport,
        PanicOnInit,
        /// Exports nothing on the first attempt, a cog afterwards
        LateExport { commands: Vec<&'static str> },
        Cog {
            name_override: Option<&'static str>,
            commands: Vec<&'static str>,
        },
    }

    pub(crate) struct StubModule {
        name_override: Option<&'static str>,
        commands: Vec<&'static str>,
        panic_on_init: bool,
        exits: Arc<AtomicUsize>,
    }

    impl CogModule for StubModule {
        fn name_override(&self) -> Option<&str> {
            self.name_override
        }

        fn setup(&self, cog: &mut Cog) {
            for name in &self.commands {
                cog.register(CommandSpec::new(*name).with_handler(|_, _| Ok(None)));
            }
        }

        fn on_init(&self, _cog: &Cog) {
            if self.panic_on_init {
                panic!("init failure");
            }
        }

        fn on_exit(&self, _cog: &Cog) {
            self.exits.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubHandle {
        script: Script,
        exits: Arc<AtomicUsize>,
        exports: AtomicUsize,
    }

    impl ModuleHandle for StubHandle {
        fn export(&self) -> Option<Box<dyn CogModule>> {
            let attempt = self.exports.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Missing | Script::NoExport => None,
                Script::PanicOnInit => Some(Box::new(StubModule {
                    name_override: None,
                    commands: vec![],
                    panic_on_init: true,
                    exits: self.exits.clone(),
                })),
                Script::LateExport { commands } => (attempt > 0).then(|| {
                    Box::new(StubModule {
                        name_override: None,
                        commands: commands.clone(),
                        panic_on_init: false,
                        exits: self.exits.clone(),
                    }) as Box<dyn CogModule>
                }),
                Script::Cog {
                    name_override,
                    commands,
                } => Some(Box::new(StubModule {
                    name_override: *name_override,
                    commands: commands.clone(),
                    panic_on_init: false,
                    exits: self.exits.clone(),
                })),
            }
        }
    }

    /// Loader serving scripted units keyed by path; scripts can be swapped
    /// mid-test to simulate files changing on disk.
    pub(crate) struct StubLoader {
        pub units: Mutex<HashMap<PathBuf, Script>>,
        pub exits: Arc<AtomicUsize>,
        pub opens: AtomicUsize,
    }

    impl StubLoader {
        pub fn new() -> Self {
            Self {
                units: Mutex::new(HashMap::new()),
                exits: Arc::new(AtomicUsize::new(0)),
                opens: AtomicUsize::new(0),
            }
        }

        pub fn script(&self, path: impl Into<PathBuf>, script: Script) {
            self.units.lock().unwrap().insert(path.into(), script);
        }
    }

    impl CogLoader for StubLoader {
        fn unit_extension(&self) -> &str {
            "cog"
        }

        fn open(&self, path: &Path) -> Result<Box<dyn ModuleHandle>, PluginError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self
                .units
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .unwrap_or(Script::Missing);
            match script {
                Script::Missing => Err(PluginError::Open(format!("{} not found", path.display()))),
                other => Ok(Box::new(StubHandle {
                    script: other,
                    exits: self.exits.clone(),
                    exports: AtomicUsize::new(0),
                })),
            }
        }
    }

    fn simple(commands: Vec<&'static str>) -> Script {
        Script::Cog {
            name_override: None,
            commands,
        }
    }

    fn registry_with(loader: Arc<StubLoader>) -> PluginRegistry {
        PluginRegistry::new(loader, std::env::temp_dir().join("cogwheel-test-config"))
    }

    fn shared_with(loader: Arc<StubLoader>) -> SharedRegistry {
        Arc::new(RwLock::new(registry_with(loader)))
    }

    #[test]
    fn test_load_success() {
        let loader = Arc::new(StubLoader::new());
        loader.script("misc.cog", simple(vec!["ping", "roll"]));
        let mut reg = registry_with(loader);
        assert_eq!(reg.load("misc", Path::new("misc.cog"), None), Some(CogState::Loaded));
        assert!(reg.cog("misc").unwrap().table.has("ping"));
    }

    #[test]
    fn test_load_import_failure_records_exception() {
        let loader = Arc::new(StubLoader::new());
        let mut reg = registry_with(loader);
        assert_eq!(
            reg.load("ghost", Path::new("ghost.cog"), None),
            Some(CogState::FailedException)
        );
        assert!(reg.known("ghost"));
        assert!(reg.cog("ghost").is_none());
    }

    #[test]
    fn test_init_panic_leaves_no_residual_commands() {
        let loader = Arc::new(StubLoader::new());
        loader.script("bad.cog", Script::PanicOnInit);
        let mut reg = registry_with(loader);
        assert_eq!(
            reg.load("bad", Path::new("bad.cog"), None),
            Some(CogState::FailedException)
        );
        assert!(reg.cog("bad").is_none());
    }

    #[test]
    fn test_no_export_recovers_from_retained_handle() {
        let loader = Arc::new(StubLoader::new());
        loader.script("late.cog", Script::LateExport { commands: vec!["hello"] });
        let mut reg = registry_with(loader.clone());
        assert_eq!(
            reg.load("late", Path::new("late.cog"), None),
            Some(CogState::FailedNoExport)
        );
        assert_eq!(reg.retry_export("late"), Some(CogState::Loaded));
        assert!(reg.cog("late").unwrap().table.has("hello"));
        // the retained handle served the recovery; the file was opened once
        assert_eq!(loader.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_export_falls_back_to_fresh_import() {
        let loader = Arc::new(StubLoader::new());
        loader.script("late.cog", Script::NoExport);
        let reg = shared_with(loader.clone());
        assert_eq!(
            reg.write().unwrap().load("late", Path::new("late.cog"), None),
            Some(CogState::FailedNoExport)
        );
        // a handle that never exports stays failed, even across reloads
        assert_eq!(
            reload_unit(&reg, "late").await,
            Some(CogState::FailedNoExport)
        );
        // once the file is fixed the fallback import picks it up
        loader.script("late.cog", simple(vec!["hello"]));
        assert_eq!(reload_unit(&reg, "late").await, Some(CogState::Loaded));
        assert!(reg.read().unwrap().cog("late").unwrap().table.has("hello"));
        assert!(loader.opens.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let loader = Arc::new(StubLoader::new());
        loader.script("misc.cog", simple(vec!["ping", "roll"]));
        loader.script("misc/init.cog", simple(vec![]));
        let reg = shared_with(loader.clone());
        {
            let mut reg = reg.write().unwrap();
            reg.load("games", Path::new("misc/init.cog"), None);
            reg.load("misc", Path::new("misc.cog"), Some("games"));
        }
        let (before, subs_before) = {
            let reg = reg.read().unwrap();
            let names: Vec<String> = reg
                .cog("games.misc")
                .unwrap()
                .table
                .names()
                .cloned()
                .collect();
            (names, reg.record("games").unwrap().subcogs.clone())
        };

        assert_eq!(reload_unit(&reg, "games.misc").await, Some(CogState::Loaded));
        let reg = reg.read().unwrap();
        let mut after: Vec<String> = reg
            .cog("games.misc")
            .unwrap()
            .table
            .names()
            .cloned()
            .collect();
        let mut before_sorted = before;
        before_sorted.sort();
        after.sort();
        assert_eq!(before_sorted, after);
        assert_eq!(reg.record("games").unwrap().subcogs, subs_before);
        assert_eq!(loader.exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reload_rekeys_on_rename() {
        let loader = Arc::new(StubLoader::new());
        loader.script("misc.cog", simple(vec!["ping"]));
        let reg = shared_with(loader.clone());
        reg.write().unwrap().load("misc", Path::new("misc.cog"), None);
        loader.script(
            "misc.cog",
            Script::Cog {
                name_override: Some("tools"),
                commands: vec!["ping"],
            },
        );
        assert_eq!(reload_unit(&reg, "misc").await, Some(CogState::Loaded));
        let reg = reg.read().unwrap();
        assert!(!reg.known("misc"));
        assert!(reg.cog("tools").unwrap().table.has("ping"));
    }

    #[tokio::test]
    async fn test_reload_failure_tears_down_previous_instance() {
        let loader = Arc::new(StubLoader::new());
        loader.script("misc.cog", simple(vec!["ping"]));
        let reg = shared_with(loader.clone());
        reg.write().unwrap().load("misc", Path::new("misc.cog"), None);
        loader.script("misc.cog", Script::Missing);
        assert_eq!(
            reload_unit(&reg, "misc").await,
            Some(CogState::FailedException)
        );
        assert!(reg.read().unwrap().cog("misc").is_none());
        assert_eq!(loader.exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subcog_shadowing_parent_command_is_rejected() {
        let loader = Arc::new(StubLoader::new());
        loader.script("games/init.cog", simple(vec!["trivia"]));
        loader.script("games/trivia.cog", simple(vec!["guess"]));
        let mut reg = registry_with(loader);
        reg.load("games", Path::new("games/init.cog"), None);
        assert_eq!(reg.load("trivia", Path::new("games/trivia.cog"), Some("games")), None);
        assert!(!reg.known("games.trivia"));
    }

    #[test]
    fn test_find_command_respects_blacklist_and_permissions() {
        let loader = Arc::new(StubLoader::new());
        loader.script("a.cog", simple(vec!["hello"]));
        loader.script("b.cog", simple(vec!["hello"]));
        let mut reg = registry_with(loader);
        reg.load("a", Path::new("a.cog"), None);
        reg.load("b", Path::new("b.cog"), None);
        let caps = Capabilities::new();
        let mut settings = GuildSettings::default();
        assert_eq!(reg.find_command("hello", &settings, &caps).len(), 2);
        settings.blacklist.push("b".to_string());
        let matches = reg.find_command("hello", &settings, &caps);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].0, "a");
    }

    #[test]
    fn test_shutdown_all_fires_exit_hooks() {
        let loader = Arc::new(StubLoader::new());
        loader.script("a.cog", simple(vec!["x"]));
        loader.script("b.cog", simple(vec!["y"]));
        let mut reg = registry_with(loader.clone());
        reg.load("a", Path::new("a.cog"), None);
        reg.load("b", Path::new("b.cog"), None);
        reg.shutdown_all();
        assert_eq!(loader.exits.load(Ordering::SeqCst), 2);
    }
}
