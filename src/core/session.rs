/// Lesson session — the per-module context object.
///
/// Owns every mutable store for one lesson visit: navigation, drag
/// tracking, collected responses, and the reflection lifecycle. A session
/// is constructed when a module becomes active and discarded on return to
/// the library, so all of its state is ephemeral by construction.

use rustc_hash::FxHashMap;

use crate::generate::backend::{GenerationBackend, GenerationError};
use crate::generate::reflections::{generate_reflections, ModuleMeta, ReflectionPolicy};
use crate::schema::card::Card;
use crate::schema::module::{InflectionContext, Module, ModuleError};

use super::drag::DragTracker;
use super::navigation::{Direction, Navigator, PendingCommit};
use super::reflection::{GenerationTicket, ReflectionLifecycle, ReflectionMap, ReflectionPhase};
use super::responses::ResponseStore;

/// Read-only navigation view for the presentation layer.
#[derive(Debug, Clone, Copy)]
pub struct NavProjection {
    pub index: usize,
    pub total: usize,
    pub can_go_forward: bool,
    pub can_go_backward: bool,
    /// Percentage in `[0, 100]`.
    pub progress: f32,
    pub drag_offset: f32,
    pub is_animating: bool,
}

/// Everything the generation client needs for one reflection call,
/// snapshotted at arm time together with its epoch ticket.
#[derive(Debug)]
pub struct ReflectionJob {
    pub ticket: GenerationTicket,
    pub responses: FxHashMap<String, String>,
    pub context: Vec<(String, InflectionContext)>,
    pub title: String,
    pub subtitle: String,
}

pub struct LessonSession {
    module: Module,
    navigator: Navigator,
    drag: DragTracker,
    responses: ResponseStore,
    reflection: ReflectionLifecycle,
}

impl LessonSession {
    /// Validates the module's invariants before accepting it.
    pub fn new(module: Module) -> Result<LessonSession, ModuleError> {
        module.validate()?;
        let navigator = Navigator::new(module.card_count());
        Ok(LessonSession {
            module,
            navigator,
            drag: DragTracker::new(),
            responses: ResponseStore::new(),
            reflection: ReflectionLifecycle::new(),
        })
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// The card currently visible.
    pub fn card(&self) -> &Card {
        &self.module.cards[self.navigator.index()]
    }

    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }

    pub fn reflection_phase(&self) -> ReflectionPhase {
        self.reflection.phase()
    }

    pub fn reflections(&self) -> Option<&ReflectionMap> {
        self.reflection.reflections()
    }

    pub fn projection(&self) -> NavProjection {
        let index = self.navigator.index();
        let total = self.navigator.total();
        NavProjection {
            index,
            total,
            can_go_forward: self.navigator.can_go_forward(|i| self.can_advance_from(i)),
            can_go_backward: self.navigator.can_go_backward(),
            progress: (index + 1) as f32 / total as f32 * 100.0,
            drag_offset: self.drag.offset(),
            is_animating: self.navigator.is_animating(),
        }
    }

    /// Forward progress from an inflection card requires a stored answer;
    /// every other card type always allows it.
    fn can_advance_from(&self, index: usize) -> bool {
        match self.module.cards[index].inflection_key() {
            Some(key) => self.responses.contains(key),
            None => true,
        }
    }

    /// Store a learner response. Keys that don't belong to this module, and
    /// values that trim to empty, are ignored.
    pub fn submit_response(&mut self, key: &str, value: &str) -> bool {
        if !self.module.has_inflection_key(key) {
            return false;
        }
        self.responses.submit(key, value)
    }

    /// Request a card transition; see [`Navigator::request_transition`].
    pub fn request_transition(&mut self, direction: Direction) -> Option<PendingCommit> {
        let module = &self.module;
        let responses = &self.responses;
        self.navigator
            .request_transition(direction, |i| match module.cards[i].inflection_key() {
                Some(key) => responses.contains(key),
                None => true,
            })
    }

    /// Apply a pending transition after the animation delay.
    pub fn commit_transition(&mut self, pending: PendingCommit) -> bool {
        self.navigator.commit(pending)
    }

    pub fn drag_begin(&mut self, x: f32, y: f32, on_text_input: bool) {
        self.drag.begin(x, y, on_text_input);
    }

    pub fn drag_update(&mut self, x: f32, y: f32) {
        self.drag.update(x, y);
    }

    /// Release the current gesture, issuing at most one transition request.
    pub fn drag_release(&mut self) -> Option<PendingCommit> {
        let direction = self.drag.release()?;
        self.request_transition(direction)
    }

    /// Edge-triggered: returns a generation job the first time the learner
    /// lands on the reflection card, `None` on every later call until the
    /// session is torn down or a retry is requested.
    pub fn reflection_request(&mut self) -> Option<ReflectionJob> {
        let on_reflection_card = self.card().is_reflection();
        let ticket = self.reflection.arm(on_reflection_card)?;
        Some(self.job_for(ticket))
    }

    /// Explicit retry after an outright generation failure.
    pub fn retry_reflection(&mut self) -> Option<ReflectionJob> {
        let ticket = self.reflection.retry()?;
        Some(self.job_for(ticket))
    }

    fn job_for(&self, ticket: GenerationTicket) -> ReflectionJob {
        ReflectionJob {
            ticket,
            responses: self.responses.map().clone(),
            context: self.module.inflection_context.clone(),
            title: self.module.title.clone(),
            subtitle: self.module.subtitle.clone(),
        }
    }

    /// Apply the outcome of a generation job. Returns false when the job's
    /// ticket is stale and the outcome was discarded.
    pub fn apply_reflections(
        &mut self,
        ticket: GenerationTicket,
        outcome: Result<ReflectionMap, GenerationError>,
    ) -> bool {
        match outcome {
            Ok(map) => self.reflection.complete(ticket, map),
            Err(_) => self.reflection.fail(ticket),
        }
    }

    /// Convenience driver: arm (edge-triggered), call the backend, apply.
    /// Returns whether a generation call ran.
    pub async fn drive_reflections(
        &mut self,
        backend: &dyn GenerationBackend,
        policy: &ReflectionPolicy,
    ) -> bool {
        let Some(job) = self.reflection_request() else {
            return false;
        };
        self.run_job(backend, policy, job).await;
        true
    }

    /// Convenience driver for the retry path.
    pub async fn drive_retry(
        &mut self,
        backend: &dyn GenerationBackend,
        policy: &ReflectionPolicy,
    ) -> bool {
        let Some(job) = self.retry_reflection() else {
            return false;
        };
        self.run_job(backend, policy, job).await;
        true
    }

    async fn run_job(
        &mut self,
        backend: &dyn GenerationBackend,
        policy: &ReflectionPolicy,
        job: ReflectionJob,
    ) {
        let outcome = generate_reflections(
            backend,
            policy,
            &job.responses,
            &job.context,
            ModuleMeta {
                title: &job.title,
                subtitle: &job.subtitle,
            },
        )
        .await;
        self.apply_reflections(job.ticket, outcome);
    }
}
