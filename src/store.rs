//! Store façade: CRUD over the normalized repositories, reactive slices for
//! the UI, and application of remote pushes.
//!
//! Every mutation follows the same shape:
//!   1. take the writer gate (one logical writer at a time),
//!   2. validate and mutate the repositories under the state lock,
//!   3. recompose and publish the affected slices (read-your-writes),
//!   4. release the state lock, then write the touched collections to the
//!      remote. Problems are always written before modules.
//!
//! Not-found checks run before any mutation, so a rejected call leaves every
//! repository untouched.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::compose::{ComposedModules, CompositionCache};
use crate::domain::{Concept, Misconception, Module, Problem, ProblemKind, StateModule};
use crate::error::{StoreError, StoreResult};
use crate::remote::{Environment, LoginProvider, RemoteError, RemoteStateSource, Upload};
use crate::repo::{decode_snapshot, Collection, Entity, Repository};
use crate::sync::{self, WatchGuard};
use crate::util::now_millis;

/// Own writes remembered per collection for echo suppression.
const MAX_PENDING_ECHOES: usize = 16;

pub type ConceptMap = BTreeMap<String, Concept>;
pub type MisconceptionMap = BTreeMap<String, Misconception>;

/// Image handed in by the UI; the store assigns the remote id.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageUpload {
  pub name: String,
  pub mime_type: String,
  pub data: Vec<u8>,
}

#[derive(Default)]
struct Collections {
  modules: Repository<Module>,
  problems: Repository<Problem>,
  concepts: Repository<Concept>,
  misconceptions: Repository<Misconception>,
  cache: CompositionCache,
  /// Snapshots this client wrote and whose push has not come back yet.
  echoes: HashMap<Collection, VecDeque<Value>>,
}

impl Collections {
  fn snapshot(&self, collection: Collection) -> StoreResult<Value> {
    let snap = match collection {
      Collection::Modules => self.modules.snapshot(),
      Collection::Problems => self.problems.snapshot(),
      Collection::Concepts => self.concepts.snapshot(),
      Collection::Misconceptions => self.misconceptions.snapshot(),
    };
    snap.map_err(|e| StoreError::MalformedSnapshot { collection, reason: e.to_string() })
  }

  /// Snapshot to write for `collection`, remembered so its echo is ignored.
  fn stage(&mut self, collection: Collection) -> StoreResult<(Collection, Value)> {
    let snap = self.snapshot(collection)?;
    self.expect_echo(collection, snap.clone());
    Ok((collection, snap))
  }

  fn expect_echo(&mut self, collection: Collection, snapshot: Value) {
    let pending = self.echoes.entry(collection).or_default();
    pending.push_back(snapshot);
    if pending.len() > MAX_PENDING_ECHOES {
      pending.pop_front();
    }
  }

  /// Forgets pending echoes of `collection`. Called when a foreign snapshot is
  /// applied: the echoes of our earlier writes must then be applied again, or
  /// the local state would stay behind the remote.
  fn forget_echoes(&mut self, collection: Collection) -> usize {
    self.echoes.remove(&collection).map_or(0, |pending| pending.len())
  }

  fn take_echo(&mut self, collection: Collection, snapshot: &Value) -> bool {
    let Some(pending) = self.echoes.get_mut(&collection) else { return false };
    match pending.iter().position(|s| s == snapshot) {
      Some(pos) => {
        pending.drain(..=pos);
        true
      }
      None => false,
    }
  }
}

pub struct Store {
  remote: Arc<dyn RemoteStateSource>,
  state: RwLock<Collections>,
  writer: Mutex<()>,
  view_tx: watch::Sender<Arc<ComposedModules>>,
  concepts_tx: watch::Sender<Arc<ConceptMap>>,
  misconceptions_tx: watch::Sender<Arc<MisconceptionMap>>,
  watches: Mutex<Vec<WatchGuard>>,
}

impl Store {
  /// Subscribes to all four collections, loads them (healing missing fields),
  /// composes the first view and starts the push consumers. The store is
  /// ready for use once this returns.
  #[instrument(level = "info", skip_all)]
  pub async fn initialize(remote: Arc<dyn RemoteStateSource>) -> StoreResult<Arc<Self>> {
    let subscriptions = sync::subscribe_all(remote.as_ref()).await?;

    let modules = sync::load_collection::<Module>(remote.as_ref()).await?;
    let problems = sync::load_collection::<Problem>(remote.as_ref()).await?;
    let concepts = sync::load_collection::<Concept>(remote.as_ref()).await?;
    let misconceptions = sync::load_collection::<Misconception>(remote.as_ref()).await?;
    let healed = [
      (Collection::Modules, modules.healed),
      (Collection::Problems, problems.healed),
      (Collection::Concepts, concepts.healed),
      (Collection::Misconceptions, misconceptions.healed),
    ];

    let mut state = Collections {
      modules: Repository::from_records(modules.records),
      problems: Repository::from_records(problems.records),
      concepts: Repository::from_records(concepts.records),
      misconceptions: Repository::from_records(misconceptions.records),
      ..Collections::default()
    };
    // The healing write-backs were saved while the watches were open.
    for (collection, snapshot) in healed {
      if let Some(snapshot) = snapshot {
        state.expect_echo(collection, snapshot);
      }
    }
    state.cache.refresh(&state.modules, &state.problems);

    let (view_tx, _) = watch::channel(state.cache.view());
    let (concepts_tx, _) = watch::channel(Arc::new(state.concepts.records().clone()));
    let (misconceptions_tx, _) = watch::channel(Arc::new(state.misconceptions.records().clone()));

    info!(
      target: "store",
      modules = state.modules.len(),
      problems = state.problems.len(),
      concepts = state.concepts.len(),
      misconceptions = state.misconceptions.len(),
      "Store initialized"
    );

    let store = Arc::new(Self {
      remote,
      state: RwLock::new(state),
      writer: Mutex::new(()),
      view_tx,
      concepts_tx,
      misconceptions_tx,
      watches: Mutex::new(Vec::new()),
    });

    let guards: Vec<WatchGuard> = subscriptions
      .into_iter()
      .map(|(collection, sub)| sync::spawn_consumer(&store, collection, sub))
      .collect();
    store.watches.lock().await.extend(guards);

    Ok(store)
  }

  /// Stops all push consumers. Reads keep serving the last published slices.
  pub async fn shutdown(&self) {
    let guards = std::mem::take(&mut *self.watches.lock().await);
    for guard in &guards {
      guard.cancel();
      debug!(target: "store", key = guard.collection().key(), "Watch cancelled");
    }
    info!(target: "store", watches = guards.len(), "Store watches cancelled");
  }

  // --- Reads ---

  /// Current composed module view.
  pub fn modules(&self) -> Arc<ComposedModules> {
    self.view_tx.borrow().clone()
  }

  /// Zero-argument accessor for the composed view.
  pub fn modules_fn(&self) -> impl Fn() -> Arc<ComposedModules> + Send + Sync + 'static {
    let rx = self.view_tx.subscribe();
    move || rx.borrow().clone()
  }

  pub fn subscribe_modules(&self) -> watch::Receiver<Arc<ComposedModules>> {
    self.view_tx.subscribe()
  }

  pub fn get_module(&self, id: &str) -> Option<StateModule> {
    self.view_tx.borrow().get(id).cloned()
  }

  pub fn concepts(&self) -> Arc<ConceptMap> {
    self.concepts_tx.borrow().clone()
  }

  pub fn concepts_fn(&self) -> impl Fn() -> Arc<ConceptMap> + Send + Sync + 'static {
    let rx = self.concepts_tx.subscribe();
    move || rx.borrow().clone()
  }

  pub fn subscribe_concepts(&self) -> watch::Receiver<Arc<ConceptMap>> {
    self.concepts_tx.subscribe()
  }

  pub fn get_concept(&self, id: &str) -> Option<Concept> {
    self.concepts_tx.borrow().get(id).cloned()
  }

  pub fn misconceptions(&self) -> Arc<MisconceptionMap> {
    self.misconceptions_tx.borrow().clone()
  }

  pub fn misconceptions_fn(&self) -> impl Fn() -> Arc<MisconceptionMap> + Send + Sync + 'static {
    let rx = self.misconceptions_tx.subscribe();
    move || rx.borrow().clone()
  }

  pub fn subscribe_misconceptions(&self) -> watch::Receiver<Arc<MisconceptionMap>> {
    self.misconceptions_tx.subscribe()
  }

  pub fn get_misconception(&self, id: &str) -> Option<Misconception> {
    self.misconceptions_tx.borrow().get(id).cloned()
  }

  /// Normalized problem record, including ones no module references.
  pub async fn problem(&self, id: &str) -> Option<Problem> {
    self.state.read().await.problems.get(id).cloned()
  }

  /// Ids of every stored problem record, sorted.
  pub async fn problem_ids(&self) -> Vec<String> {
    self.state.read().await.problems.records().keys().cloned().collect()
  }

  /// Normalized module record (problem ids, not copies).
  pub async fn module_record(&self, id: &str) -> Option<Module> {
    self.state.read().await.modules.get(id).cloned()
  }

  // --- Modules ---

  /// Stores `module` as a normalized record. Embedded problems (normally none)
  /// contribute their ids only.
  #[instrument(level = "info", skip(self, module), fields(module_id = %module.id))]
  pub async fn add_empty_module(&self, module: &StateModule) -> StoreResult<()> {
    let _gate = self.writer.lock().await;
    let writes = {
      let mut state = self.state.write().await;
      if state.modules.insert(Module::from(module)).is_some() {
        warn!(target: "store", module_id = %module.id, "add_empty_module overwrote an existing module");
      }
      self.publish(&mut state, &[Collection::Modules]);
      vec![state.stage(Collection::Modules)?]
    };
    self.persist(writes).await
  }

  /// Deletes the module and every problem it references. Absent ids are a
  /// no-op. Local removal always completes; remote failures are aggregated.
  #[instrument(level = "info", skip(self))]
  pub async fn delete_module(&self, id: &str) -> StoreResult<()> {
    let _gate = self.writer.lock().await;
    let writes = {
      let mut state = self.state.write().await;
      let Some(module) = state.modules.remove(id) else {
        debug!(target: "store", module_id = %id, "delete_module: module absent; nothing to do");
        return Ok(());
      };
      for problem_id in &module.problems {
        state.problems.remove(problem_id);
      }
      info!(target: "store", module_id = %id, problems = module.problems.len(), "Module deleted with its problems");
      self.publish(&mut state, &[Collection::Problems, Collection::Modules]);
      vec![state.stage(Collection::Problems)?, state.stage(Collection::Modules)?]
    };

    let mut failures = Vec::new();
    for (collection, snapshot) in writes {
      if let Err(e) = self.remote.save(collection.key(), snapshot).await {
        error!(target: "store", module_id = %id, key = collection.key(), error = %e, "Cascade write failed; continuing");
        failures.push(e);
      }
    }
    if failures.is_empty() {
      Ok(())
    } else {
      Err(StoreError::CascadeIncomplete { module_id: id.to_string(), failures })
    }
  }

  /// Updates name and description. Silently ignores unknown ids.
  #[instrument(level = "info", skip(self, name, description))]
  pub async fn update_module_name_description(&self, id: &str, name: &str, description: &str) -> StoreResult<()> {
    let _gate = self.writer.lock().await;
    let writes = {
      let mut state = self.state.write().await;
      let updated = state.modules.update(id, |m| {
        m.name = name.to_string();
        m.description = description.to_string();
      });
      if updated.is_none() {
        debug!(target: "store", module_id = %id, "update_module_name_description: module absent; ignored");
        return Ok(());
      }
      self.publish(&mut state, &[Collection::Modules]);
      vec![state.stage(Collection::Modules)?]
    };
    self.persist(writes).await
  }

  // --- Problems ---

  /// Creates a problem of `kind` with the creation defaults and appends it to
  /// the module. Returns the stored problem.
  #[instrument(level = "info", skip(self))]
  pub async fn add_new_problem(&self, module_id: &str, kind: ProblemKind, user_id: &str) -> StoreResult<Problem> {
    let _gate = self.writer.lock().await;
    let (problem, writes) = {
      let mut state = self.state.write().await;
      if !state.modules.contains(module_id) {
        return Err(StoreError::ModuleNotFound(module_id.to_string()));
      }
      let problem = Problem::with_defaults(self.remote.uuid(), kind, user_id, now_millis());
      state.problems.insert(problem.clone());
      state.modules.update(module_id, |m| m.problems.push(problem.id.clone()));
      info!(target: "store", %module_id, problem_id = %problem.id, ?kind, "Problem added");
      self.publish(&mut state, &[Collection::Problems, Collection::Modules]);
      let writes = vec![state.stage(Collection::Problems)?, state.stage(Collection::Modules)?];
      (problem, writes)
    };
    self.persist(writes).await?;
    Ok(problem)
  }

  /// Removes `problem_id` from the module's list (if listed) and deletes the
  /// problem record regardless.
  #[instrument(level = "info", skip(self))]
  pub async fn delete_problem(&self, problem_id: &str, module_id: &str) -> StoreResult<()> {
    let _gate = self.writer.lock().await;
    let writes = {
      let mut state = self.state.write().await;
      let position = state
        .modules
        .get(module_id)
        .ok_or_else(|| StoreError::ModuleNotFound(module_id.to_string()))?
        .problems
        .iter()
        .position(|id| id == problem_id);

      let mut touched = Vec::new();
      if state.problems.remove(problem_id).is_some() {
        touched.push(Collection::Problems);
      }
      if let Some(pos) = position {
        state.modules.update(module_id, |m| m.problems.remove(pos));
        touched.push(Collection::Modules);
      } else {
        debug!(target: "store", %module_id, %problem_id, "delete_problem: id not listed in module");
      }
      if touched.is_empty() {
        return Ok(());
      }
      self.publish(&mut state, &touched);
      touched.into_iter().map(|c| state.stage(c)).collect::<StoreResult<Vec<_>>>()?
    };
    self.persist(writes).await
  }

  /// Overwrites title, description, concepts, difficulty and the kind-tagged
  /// payload of a problem listed in `module_id`; `updatedAt` is set to now.
  /// Identity, creation metadata and the AI prompt are kept.
  #[instrument(level = "info", skip(self, problem), fields(problem_id = %problem.id, kind = ?problem.kind()))]
  pub async fn update_problem(&self, module_id: &str, problem: &Problem) -> StoreResult<()> {
    let _gate = self.writer.lock().await;
    let writes = {
      let mut state = self.state.write().await;
      let module = state
        .modules
        .get(module_id)
        .ok_or_else(|| StoreError::ModuleNotFound(module_id.to_string()))?;
      let not_listed = || StoreError::ProblemNotInModule {
        problem_id: problem.id.clone(),
        module_id: module_id.to_string(),
      };
      if !module.problems.contains(&problem.id) {
        return Err(not_listed());
      }

      let now = now_millis();
      state
        .problems
        .update(&problem.id, |existing| {
          existing.title = problem.title.clone();
          existing.description = problem.description.clone();
          existing.concepts = problem.concepts.clone();
          existing.difficulty = problem.difficulty;
          existing.updated_at = now;
          existing.body = problem.body.clone();
        })
        .ok_or_else(not_listed)?;

      self.publish(&mut state, &[Collection::Problems]);
      vec![state.stage(Collection::Problems)?]
    };
    self.persist(writes).await
  }

  // --- Concepts ---

  /// Merges `concept` over whatever record the remote holds under its id and
  /// stores the result.
  #[instrument(level = "info", skip(self, concept), fields(concept_id = %concept.id))]
  pub async fn add_concept(&self, concept: &Concept) -> StoreResult<Concept> {
    let _gate = self.writer.lock().await;
    let merged: Concept = self.merge_with_remote(concept).await?;
    let writes = {
      let mut state = self.state.write().await;
      state.concepts.insert(merged.clone());
      self.publish(&mut state, &[Collection::Concepts]);
      vec![state.stage(Collection::Concepts)?]
    };
    self.persist(writes).await?;
    Ok(merged)
  }

  #[instrument(level = "info", skip(self, concept), fields(concept_id = %concept.id))]
  pub async fn update_concept(&self, concept: &Concept) -> StoreResult<()> {
    let _gate = self.writer.lock().await;
    let writes = {
      let mut state = self.state.write().await;
      state
        .concepts
        .update(&concept.id, |existing| {
          existing.name = concept.name.clone();
          existing.description = concept.description.clone();
          existing.related_concepts = concept.related_concepts.clone();
          existing.ai_prompt = concept.ai_prompt.clone();
        })
        .ok_or_else(|| StoreError::ConceptNotFound(concept.id.clone()))?;
      self.publish(&mut state, &[Collection::Concepts]);
      vec![state.stage(Collection::Concepts)?]
    };
    self.persist(writes).await
  }

  // --- Misconceptions ---

  #[instrument(level = "info", skip(self, misconception), fields(misconception_id = %misconception.id))]
  pub async fn add_misconception(&self, misconception: &Misconception) -> StoreResult<Misconception> {
    let _gate = self.writer.lock().await;
    let merged: Misconception = self.merge_with_remote(misconception).await?;
    let writes = {
      let mut state = self.state.write().await;
      state.misconceptions.insert(merged.clone());
      self.publish(&mut state, &[Collection::Misconceptions]);
      vec![state.stage(Collection::Misconceptions)?]
    };
    self.persist(writes).await?;
    Ok(merged)
  }

  #[instrument(level = "info", skip(self, misconception), fields(misconception_id = %misconception.id))]
  pub async fn update_misconception(&self, misconception: &Misconception) -> StoreResult<()> {
    let _gate = self.writer.lock().await;
    let writes = {
      let mut state = self.state.write().await;
      state
        .misconceptions
        .update(&misconception.id, |existing| {
          existing.name = misconception.name.clone();
          existing.ai_definition = misconception.ai_definition.clone();
          existing.ai_feedback = misconception.ai_feedback.clone();
        })
        .ok_or_else(|| StoreError::MisconceptionNotFound(misconception.id.clone()))?;
      self.publish(&mut state, &[Collection::Misconceptions]);
      vec![state.stage(Collection::Misconceptions)?]
    };
    self.persist(writes).await
  }

  // --- Remote pass-throughs ---

  pub fn uuid(&self) -> String {
    self.remote.uuid()
  }

  /// Uploads an image under a fresh id and returns the remote id.
  #[instrument(level = "info", skip(self, image), fields(name = %image.name, size = image.data.len()))]
  pub async fn upload_image(&self, image: ImageUpload) -> StoreResult<String> {
    let upload = Upload {
      id: self.remote.uuid(),
      name: image.name,
      mime_type: image.mime_type,
      data: image.data,
    };
    Ok(self.remote.upload(upload).await?)
  }

  pub async fn get_image_url(&self, id: &str) -> StoreResult<String> {
    Ok(self.remote.download(id).await?.url)
  }

  pub async fn environment(&self) -> StoreResult<Environment> {
    Ok(self.remote.environment().await?)
  }

  pub async fn login(&self, provider: LoginProvider) -> StoreResult<()> {
    Ok(self.remote.login(provider).await?)
  }

  pub async fn logout(&self) -> StoreResult<()> {
    Ok(self.remote.logout().await?)
  }

  // --- Remote pushes ---

  /// Replaces one collection with a pushed snapshot. Echoes of this client's
  /// own writes and undecodable payloads are ignored.
  ///
  /// Pushes arrive in remote order, so a foreign snapshot delivered while our
  /// echoes are pending predates those writes. It is applied anyway and the
  /// pending echoes are forgotten, which lets the echoes themselves restore
  /// our later writes when they arrive.
  pub(crate) async fn apply_remote(&self, collection: Collection, snapshot: Value) {
    let mut state = self.state.write().await;
    if state.take_echo(collection, &snapshot) {
      debug!(target: "sync", key = collection.key(), "Own write echoed back; ignored");
      return;
    }

    let changed = match collection {
      Collection::Modules => replace_from(&mut state.modules, snapshot),
      Collection::Problems => replace_from(&mut state.problems, snapshot),
      Collection::Concepts => replace_from(&mut state.concepts, snapshot),
      Collection::Misconceptions => replace_from(&mut state.misconceptions, snapshot),
    };
    if changed.is_ok() {
      let forgotten = state.forget_echoes(collection);
      if forgotten > 0 {
        debug!(target: "sync", key = collection.key(), forgotten, "Foreign push overtook pending echoes");
      }
    }

    match changed {
      Ok(true) => {
        info!(target: "sync", key = collection.key(), "Remote push applied");
        self.publish(&mut state, &[collection]);
      }
      Ok(false) => debug!(target: "sync", key = collection.key(), "Remote push identical to local state"),
      Err(reason) => {
        warn!(target: "sync", key = collection.key(), %reason, "Malformed remote push ignored; keeping last snapshot")
      }
    }
  }

  // --- Internals ---

  /// Recomposes (if modules or problems moved) and publishes the slices
  /// backing `touched`.
  fn publish(&self, state: &mut Collections, touched: &[Collection]) {
    if touched.iter().any(|c| c.feeds_composition()) {
      if let Some(view) = state.cache.refresh(&state.modules, &state.problems) {
        self.view_tx.send_replace(view);
      }
    }
    if touched.contains(&Collection::Concepts) {
      self.concepts_tx.send_replace(Arc::new(state.concepts.records().clone()));
    }
    if touched.contains(&Collection::Misconceptions) {
      self.misconceptions_tx.send_replace(Arc::new(state.misconceptions.records().clone()));
    }
  }

  /// Writes snapshots in order; the first failure aborts the rest.
  async fn persist(&self, writes: Vec<(Collection, Value)>) -> StoreResult<()> {
    for (collection, snapshot) in writes {
      self.remote.save(collection.key(), snapshot).await.map_err(|e| {
        error!(target: "store", key = collection.key(), error = %e, "Remote write failed");
        StoreError::Remote(e)
      })?;
    }
    Ok(())
  }

  /// Loads the remote record stored under `record`'s id and overlays
  /// `record`'s fields onto it.
  async fn merge_with_remote<T: Entity>(&self, record: &T) -> StoreResult<T> {
    let existing = self.remote.load(record.id()).await?;
    let mut base = match existing {
      Value::Object(map) => map,
      _ => Map::new(),
    };
    let overlay = serde_json::to_value(record).map_err(|e| RemoteError::Decode(e.to_string()))?;
    if let Value::Object(fields) = overlay {
      base.extend(fields);
    }
    Ok(serde_json::from_value(Value::Object(base)).map_err(|e| RemoteError::Decode(e.to_string()))?)
  }
}

fn replace_from<T: Entity>(repo: &mut Repository<T>, snapshot: Value) -> Result<bool, String> {
  let decoded = decode_snapshot::<T>(snapshot)?;
  Ok(repo.replace_all(decoded.records))
}
