//! Composition of the denormalized module view.
//!
//! `compose` is a pure function of the modules and problems mappings: each
//! module's ordered problem ids become value copies of the problem records.
//! Ids without a backing problem are dropped from the view (and logged); the
//! normalized module keeps them until the caller repairs the reference.
//!
//! `CompositionCache` memoizes the last result by the two repositories'
//! revisions, so recomposing at every mutation boundary is cheap when nothing
//! relevant changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::domain::{Module, Problem, StateModule};
use crate::repo::Repository;

pub type ComposedModules = BTreeMap<String, StateModule>;

pub fn compose(modules: &BTreeMap<String, Module>, problems: &BTreeMap<String, Problem>) -> ComposedModules {
  modules
    .iter()
    .map(|(id, module)| (id.clone(), compose_module(module, problems)))
    .collect()
}

fn compose_module(module: &Module, problems: &BTreeMap<String, Problem>) -> StateModule {
  let embedded = module
    .problems
    .iter()
    .filter_map(|problem_id| match problems.get(problem_id) {
      Some(problem) => Some(problem.clone()),
      None => {
        warn!(target: "store", module_id = %module.id, %problem_id, "Dangling problem reference skipped during composition");
        None
      }
    })
    .collect();

  StateModule {
    id: module.id.clone(),
    name: module.name.clone(),
    description: module.description.clone(),
    problems: embedded,
  }
}

#[derive(Debug)]
pub struct CompositionCache {
  modules_rev: Option<u64>,
  problems_rev: Option<u64>,
  view: Arc<ComposedModules>,
}

impl Default for CompositionCache {
  fn default() -> Self {
    Self { modules_rev: None, problems_rev: None, view: Arc::new(ComposedModules::new()) }
  }
}

impl CompositionCache {
  /// Last composed view (may be stale until `refresh` is called).
  pub fn view(&self) -> Arc<ComposedModules> {
    self.view.clone()
  }

  /// Recomposes when either revision moved. Returns the new view, or `None`
  /// when the cached one is still current.
  pub fn refresh(&mut self, modules: &Repository<Module>, problems: &Repository<Problem>) -> Option<Arc<ComposedModules>> {
    let current = (Some(modules.revision()), Some(problems.revision()));
    if (self.modules_rev, self.problems_rev) == current {
      return None;
    }
    self.view = Arc::new(compose(modules.records(), problems.records()));
    self.modules_rev = current.0;
    self.problems_rev = current.1;
    Some(self.view.clone())
  }
}
