//! Named solutions owned by one build context

use super::{Solution, SolutionDescriptor, SolutionDir};
use crate::VirtualFileSystem;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of the solutions known to a build
///
/// Solutions reach each other through the registry for `name:` requests,
/// so they hold a weak back-reference to it.
pub struct SolutionRegistry {
    fs: Arc<dyn VirtualFileSystem>,
    marker: String,
    solutions: RwLock<BTreeMap<String, Arc<Solution>>>,
    default: RwLock<Option<String>>,
}

impl SolutionRegistry {
    /// Empty registry over `fs`, using `marker` as the project file name.
    pub fn new(fs: Arc<dyn VirtualFileSystem>, marker: &str) -> Arc<Self> {
        Arc::new(Self {
            fs,
            marker: marker.to_string(),
            solutions: RwLock::new(BTreeMap::new()),
            default: RwLock::new(None),
        })
    }

    pub fn fs(&self) -> &Arc<dyn VirtualFileSystem> {
        &self.fs
    }

    /// Create and register a solution, replacing any of the same name.
    ///
    /// The first solution created becomes the default until another is set.
    pub fn create(self: &Arc<Self>, name: &str, dirs: Vec<SolutionDir>) -> Arc<Solution> {
        let solution = Arc::new(Solution::new(
            name,
            dirs,
            Arc::clone(&self.fs),
            &self.marker,
            Arc::downgrade(self),
        ));
        self.solutions
            .write()
            .insert(name.to_string(), Arc::clone(&solution));
        let mut default = self.default.write();
        if default.is_none() {
            *default = Some(name.to_string());
        }
        solution
    }

    /// Register every solution of `descriptor` and pick its default.
    ///
    /// Without a flagged default the last solution in name order wins.
    pub fn load_descriptor(self: &Arc<Self>, descriptor: &SolutionDescriptor) -> Option<Arc<Solution>> {
        let mut flagged = None;
        let mut last = None;
        for name in descriptor.solutions() {
            let solution = self.create(&name, descriptor.paths(&name).to_vec());
            if descriptor.default_solution() == Some(name.as_str()) {
                flagged = Some(Arc::clone(&solution));
            }
            last = Some(solution);
        }
        let chosen = flagged.or(last);
        if let Some(solution) = &chosen {
            self.set_default(solution.name());
        }
        chosen
    }

    /// Build the default solution for a build started in `cwd`.
    ///
    /// Walks up from `cwd` for `descriptor_name`; with no descriptor a
    /// `default` solution maps `/` onto `cwd`.
    pub fn create_default(self: &Arc<Self>, cwd: &str, descriptor_name: &str) -> Option<Arc<Solution>> {
        let descriptor = SolutionDescriptor::find(&*self.fs, cwd, descriptor_name)
            .unwrap_or_else(|| SolutionDescriptor::fallback(cwd));
        self.load_descriptor(&descriptor)
    }

    /// Look up a solution; `default` names the default solution.
    pub fn get(&self, name: &str) -> Option<Arc<Solution>> {
        if name == "default" {
            if let Some(solution) = self.default_solution() {
                return Some(solution);
            }
        }
        self.solutions.read().get(name).cloned()
    }

    pub fn default_solution(&self) -> Option<Arc<Solution>> {
        let name = self.default.read().clone()?;
        self.solutions.read().get(&name).cloned()
    }

    pub fn set_default(&self, name: &str) {
        *self.default.write() = Some(name.to_string());
    }

    /// Registered solution names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.solutions.read().keys().cloned().collect()
    }

    /// Mapping tables of every solution, default first
    pub fn dump(&self) -> String {
        let default = self.default.read().clone();
        let solutions = self.solutions.read();
        let mut ordered: Vec<&Arc<Solution>> = solutions.values().collect();
        ordered.sort_by_key(|s| Some(s.name()) != default.as_deref());
        let mut out = String::new();
        for solution in ordered {
            let marker = if Some(solution.name()) == default.as_deref() {
                " (default)"
            } else {
                ""
            };
            out.push_str(&format!("Solution {}{}:\n", solution.name(), marker));
            out.push_str(&solution.dump());
        }
        out
    }
}
