//! Loading content modules in dependency order.
//!
//! Modules declare a name, a version and dependency ranges. Loading is a single
//! topological pass: a module initializes only after every dependency it requires has
//! initialized, unresolved names and too-old versions are reported, cycles refuse to
//! load, and dependents of a failed module are skipped rather than half-initialized.

use std::fmt::{Display, Formatter};

use thiserror::Error;
use tracing::{info, warn};
use vx_schemas::registry::BlockRegistry;

use crate::prelude::*;

/// A semantic module version.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    /// Incompatible-change counter.
    pub major: u32,
    /// Feature counter.
    pub minor: u32,
    /// Fix counter.
    pub patch: u32,
}

impl Version {
    /// Constructs a version triple.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// One declared dependency of a module.
#[derive(Clone, Debug)]
pub struct ModuleDependency {
    /// Name of the module depended on.
    pub name: String,
    /// Lowest acceptable version of that module.
    pub min_version: Version,
    /// Required dependencies fail their dependents; optional ones are used when present.
    pub required: bool,
}

impl ModuleDependency {
    /// A required dependency.
    pub fn required(name: &str, min_version: Version) -> Self {
        Self {
            name: name.to_owned(),
            min_version,
            required: true,
        }
    }

    /// An optional dependency: ordered after it when present, ignored when absent.
    pub fn optional(name: &str, min_version: Version) -> Self {
        Self {
            name: name.to_owned(),
            min_version,
            required: false,
        }
    }
}

/// Identity and dependency declaration of a module.
#[derive(Clone, Debug)]
pub struct ModuleInfo {
    /// Unique module name.
    pub name: String,
    /// Version of this module.
    pub version: Version,
    /// Modules this one depends on.
    pub dependencies: Vec<ModuleDependency>,
}

/// The registries a module may populate during initialization.
pub struct ModuleContext<'a> {
    /// The block type registry.
    pub blocks: &'a mut BlockRegistry,
}

/// A loadable content module.
pub trait Module: Send + Sync + 'static {
    /// The module's identity and dependencies.
    fn info(&self) -> ModuleInfo;
    /// Populates registries; runs once, after all required dependencies initialized.
    fn init(&self, ctx: &mut ModuleContext) -> Result<()>;
}

/// Why a module was not loaded.
#[derive(Clone, Debug, Error)]
pub enum ModuleSkipReason {
    /// A required dependency is not present at all.
    #[error("required dependency {0} is missing")]
    MissingDependency(String),
    /// A dependency is present but older than the declared minimum.
    #[error("dependency {name} is version {found}, {required} or newer required")]
    DependencyTooOld {
        /// Dependency name.
        name: String,
        /// Version that is present.
        found: Version,
        /// Minimum version declared by the dependent.
        required: Version,
    },
    /// A required dependency itself failed to load.
    #[error("required dependency {0} failed to load")]
    DependencyFailed(String),
    /// The module participates in a dependency cycle.
    #[error("dependency cycle involving this module")]
    DependencyCycle,
    /// Another module with the same name was registered first.
    #[error("duplicate module name")]
    DuplicateName,
    /// The module's init hook returned an error.
    #[error("initialization failed: {0}")]
    InitFailed(String),
}

/// Outcome of a [`ModuleLoader::load_all`] pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names of modules initialized, in initialization order.
    pub loaded: Vec<String>,
    /// Modules not initialized, with the reason.
    pub skipped: Vec<(String, ModuleSkipReason)>,
}

/// Collects modules and initializes them in dependency order.
#[derive(Default)]
pub struct ModuleLoader {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleLoader {
    /// Constructs an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module for the next [`Self::load_all`] pass.
    pub fn add(&mut self, module: Box<dyn Module>) {
        self.modules.push(module);
    }

    /// Initializes every registered module whose dependency chain resolves, in
    /// topological order, and reports the rest.
    pub fn load_all(self, ctx: &mut ModuleContext) -> LoadReport {
        let infos: Vec<ModuleInfo> = self.modules.iter().map(|m| m.info()).collect();
        let mut report = LoadReport::default();

        // First registration of a name wins; duplicates never load.
        let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(infos.len());
        let mut duplicate = vec![false; infos.len()];
        for (idx, info) in infos.iter().enumerate() {
            if by_name.try_insert(info.name.as_str(), idx).is_err() {
                duplicate[idx] = true;
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Status {
            Pending,
            Loaded,
            Failed,
        }
        let mut status = vec![Status::Pending; infos.len()];
        for (idx, &dup) in duplicate.iter().enumerate() {
            if dup {
                status[idx] = Status::Failed;
                report.skipped.push((infos[idx].name.clone(), ModuleSkipReason::DuplicateName));
            }
        }

        // Repeatedly initialize any module whose dependencies are settled; when no
        // progress is possible the remainder forms one or more cycles.
        loop {
            let mut progressed = false;
            for idx in 0..self.modules.len() {
                if status[idx] != Status::Pending {
                    continue;
                }
                let info = &infos[idx];

                let mut failure: Option<ModuleSkipReason> = None;
                let mut ready = true;
                for dep in &info.dependencies {
                    let Some(&dep_idx) = by_name.get(dep.name.as_str()) else {
                        if dep.required {
                            failure = Some(ModuleSkipReason::MissingDependency(dep.name.clone()));
                        }
                        continue;
                    };
                    if infos[dep_idx].version < dep.min_version {
                        if dep.required {
                            failure = Some(ModuleSkipReason::DependencyTooOld {
                                name: dep.name.clone(),
                                found: infos[dep_idx].version,
                                required: dep.min_version,
                            });
                        }
                        continue;
                    }
                    match status[dep_idx] {
                        Status::Loaded => {}
                        Status::Failed if dep.required => {
                            failure = Some(ModuleSkipReason::DependencyFailed(dep.name.clone()))
                        }
                        Status::Failed => {}
                        Status::Pending => ready = false,
                    }
                }

                if let Some(reason) = failure {
                    warn!(module = %info.name, %reason, "Skipping module");
                    status[idx] = Status::Failed;
                    report.skipped.push((info.name.clone(), reason));
                    progressed = true;
                } else if ready {
                    match self.modules[idx].init(ctx) {
                        Ok(()) => {
                            info!(module = %info.name, version = %info.version, "Module loaded");
                            status[idx] = Status::Loaded;
                            report.loaded.push(info.name.clone());
                        }
                        Err(e) => {
                            warn!(module = %info.name, "Module initialization failed: {e}");
                            status[idx] = Status::Failed;
                            report
                                .skipped
                                .push((info.name.clone(), ModuleSkipReason::InitFailed(e.to_string())));
                        }
                    }
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        for (idx, info) in infos.iter().enumerate() {
            if status[idx] == Status::Pending {
                warn!(module = %info.name, "Skipping module: dependency cycle");
                report
                    .skipped
                    .push((info.name.clone(), ModuleSkipReason::DependencyCycle));
            }
        }
        report
    }
}
