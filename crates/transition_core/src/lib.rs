use std::{future::Future, sync::Arc};

use anyhow::Result;
use futures::future::BoxFuture;
use routing::RouteTable;
use shared::{
    domain::{Location, RouteKey},
    error::ResolveError,
    events::{Phase, TransitionEvent},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod cancel;
pub mod lifecycle;
pub mod machine;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use lifecycle::{Hook, HookFn, HookOverrides, LifecycleInvoker, View};
pub use machine::{
    Branch, Effect, MachineEvent, MachineState, TransitionContext, TransitionStateMachine,
};
pub use routing::{PathPattern, PatternError, RouteMatch};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

type ViewFactory = Arc<dyn Fn(&RouteMatch) -> Arc<dyn View> + Send + Sync>;
type PreloadFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;
type FetchFn =
    Arc<dyn Fn(RouteMatch, FetchNotifier) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A registered route: stable identity key, optional path pattern (absent
/// pattern = wildcard fallback), a view factory, and optional async preload
/// and data-fetch steps.
#[derive(Clone)]
pub struct RouteDefinition {
    key: RouteKey,
    pattern: Option<PathPattern>,
    meta: Option<serde_json::Value>,
    factory: ViewFactory,
    preload: Option<PreloadFn>,
    fetch: Option<FetchFn>,
}

impl RouteDefinition {
    pub fn new(
        key: impl Into<RouteKey>,
        pattern: &str,
        factory: impl Fn(&RouteMatch) -> Arc<dyn View> + Send + Sync + 'static,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            key: key.into(),
            pattern: Some(PathPattern::parse(pattern)?),
            meta: None,
            factory: Arc::new(factory),
            preload: None,
            fetch: None,
        })
    }

    /// A route without a pattern; matches any location, first-match-wins.
    pub fn fallback(
        key: impl Into<RouteKey>,
        factory: impl Fn(&RouteMatch) -> Arc<dyn View> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            pattern: None,
            meta: None,
            factory: Arc::new(factory),
            preload: None,
            fetch: None,
        }
    }

    /// Metadata forwarded on the transition-start event (loading-indicator
    /// consumers read it; the engine itself does not).
    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Static resource-preparation step, run before fetch on every
    /// transition targeting this route.
    pub fn with_preload<F, Fut>(mut self, preload: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.preload = Some(Arc::new(move || Box::pin(preload())));
        self
    }

    /// Data-fetch step. Departure/arrival never start before it settles.
    pub fn with_fetch<F, Fut>(mut self, fetch: F) -> Self
    where
        F: Fn(RouteMatch, FetchNotifier) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.fetch = Some(Arc::new(move |matched, notifier| {
            Box::pin(fetch(matched, notifier))
        }));
        self
    }

    pub fn key(&self) -> &RouteKey {
        &self.key
    }
}

/// Result of resolving a location: the winning route plus its match.
#[derive(Clone)]
pub struct Resolution {
    pub route: Arc<RouteDefinition>,
    pub matched: RouteMatch,
}

/// External collaborator contract: deterministically select exactly one
/// route for any location, or fail when nothing (not even a fallback)
/// matches.
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, location: &Location) -> Result<Resolution, ResolveError>;
}

/// Ordered route definitions with first-match-wins resolution.
pub struct RouteSet {
    routes: Vec<Arc<RouteDefinition>>,
    table: RouteTable,
}

impl RouteSet {
    /// Identity keys must be unique across the set.
    pub fn new(routes: Vec<RouteDefinition>) -> Self {
        let routes: Vec<Arc<RouteDefinition>> = routes.into_iter().map(Arc::new).collect();
        debug_assert!(
            routes
                .iter()
                .enumerate()
                .all(|(i, a)| routes[..i].iter().all(|b| a.key != b.key)),
            "route identity keys must be unique"
        );

        let mut table = RouteTable::new();
        for route in &routes {
            table.push(route.key.clone(), route.pattern.clone());
        }
        Self { routes, table }
    }
}

impl RouteResolver for RouteSet {
    fn resolve(&self, location: &Location) -> Result<Resolution, ResolveError> {
        let matched = self.table.first_match(location)?;
        let route = self
            .routes
            .iter()
            .find(|route| route.key == matched.key)
            .cloned()
            .ok_or_else(|| ResolveError::NoRouteMatched {
                path: location.path.clone(),
            })?;
        Ok(Resolution { route, matched })
    }
}

/// Handle given to a route's fetch step for pushing progress payloads to
/// the event channel while the fetch is in flight.
#[derive(Clone)]
pub struct FetchNotifier {
    events: broadcast::Sender<TransitionEvent>,
}

impl FetchNotifier {
    pub fn notify(&self, payload: serde_json::Value) {
        let _ = self.events.send(TransitionEvent::FetchNotice { payload });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchOptions {
    /// Run departure and arrival concurrently instead of sequentially.
    pub parallel: bool,
}

/// Renderable payload for one of the two view slots.
#[derive(Clone)]
pub struct ViewSlot {
    pub key: RouteKey,
    pub location: Location,
    pub matched: RouteMatch,
    pub view: Arc<dyn View>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The transition ran to terminal idle.
    Completed,
    /// A newer navigation took over before this one finished.
    Superseded,
    /// Identity key and parameters were both unchanged; nothing to do.
    Ignored,
}

struct PendingTarget {
    route: Arc<RouteDefinition>,
    matched: RouteMatch,
    location: Location,
    view: Arc<dyn View>,
}

impl PendingTarget {
    fn slot(&self) -> ViewSlot {
        ViewSlot {
            key: self.matched.key.clone(),
            location: self.location.clone(),
            matched: self.matched.clone(),
            view: Arc::clone(&self.view),
        }
    }
}

struct OrchestratorState {
    machine: TransitionStateMachine,
    registry: CancellationRegistry,
    current: Option<ViewSlot>,
    next: Option<ViewSlot>,
    pending: Option<PendingTarget>,
    last_match: Option<RouteMatch>,
    fetching: bool,
    leaving: bool,
}

/// Which mounted slot an arrival targets: the swapped-in current view
/// (sequential and race flows) or the overlapping next view (parallel).
#[derive(Debug, Clone, Copy)]
enum ArrivalTarget {
    Current,
    Next,
}

/// Component-facing facade: bridges location changes to the state machine
/// and exposes the two renderable view slots plus derived flags. All phase
/// work is driven through the caller's `navigate` future except the
/// parallel sub-flows, which run as spawned tasks joined before `navigate`
/// returns.
pub struct TransitionOrchestrator {
    resolver: Arc<dyn RouteResolver>,
    invoker: LifecycleInvoker,
    inner: Mutex<OrchestratorState>,
    events: broadcast::Sender<TransitionEvent>,
}

impl TransitionOrchestrator {
    pub fn new(routes: RouteSet, options: SwitchOptions) -> Arc<Self> {
        Self::new_with_resolver(Arc::new(routes), options, HookOverrides::default())
    }

    pub fn new_with_overrides(
        routes: RouteSet,
        options: SwitchOptions,
        overrides: HookOverrides,
    ) -> Arc<Self> {
        Self::new_with_resolver(Arc::new(routes), options, overrides)
    }

    pub fn new_with_resolver(
        resolver: Arc<dyn RouteResolver>,
        options: SwitchOptions,
        overrides: HookOverrides,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            resolver,
            invoker: LifecycleInvoker::new(overrides),
            inner: Mutex::new(OrchestratorState {
                machine: TransitionStateMachine::new(options.parallel),
                registry: CancellationRegistry::new(),
                current: None,
                next: None,
                pending: None,
                last_match: None,
                fetching: false,
                leaving: false,
            }),
            events,
        })
    }

    /// Handle a location change. Resolves the route, classifies the change
    /// (first mount / full / same-route / no change) and drives the
    /// resulting transition to completion. Returns `Superseded` if a newer
    /// navigation took over while this one was in flight; resolution
    /// failures are returned to the caller untouched.
    pub async fn navigate(
        self: &Arc<Self>,
        location: impl Into<Location>,
    ) -> Result<NavigationOutcome, ResolveError> {
        let location = location.into();
        let resolution = self.resolver.resolve(&location)?;

        let (generation, effects) = {
            let mut inner = self.inner.lock().await;

            let first = inner.machine.context().generation == 0;
            let same_route = if first {
                false
            } else {
                match &inner.last_match {
                    Some(last) if last.key == resolution.matched.key => {
                        if last.params == resolution.matched.params {
                            return Ok(NavigationOutcome::Ignored);
                        }
                        true
                    }
                    _ => false,
                }
            };

            info!(
                path = %location.path,
                key = %resolution.matched.key,
                same_route,
                "transition: navigation accepted"
            );

            inner.registry.reset();
            inner.last_match = Some(resolution.matched.clone());

            let view = (resolution.route.factory)(&resolution.matched);
            if first {
                inner.current = Some(ViewSlot {
                    key: resolution.matched.key.clone(),
                    location: location.clone(),
                    matched: resolution.matched.clone(),
                    view,
                });
            } else {
                inner.pending = Some(PendingTarget {
                    route: Arc::clone(&resolution.route),
                    matched: resolution.matched.clone(),
                    location: location.clone(),
                    view,
                });
                inner.fetching = true;
            }

            let effects = inner.machine.handle(MachineEvent::Navigate { same_route });
            let context = inner.machine.context();
            if !first {
                inner.leaving = !context.race;
                let _ = self.events.send(TransitionEvent::TransitionStart {
                    key: resolution.matched.key.clone(),
                    same_route,
                    meta: resolution.route.meta.clone(),
                });
            }
            (context.generation, effects)
        };

        Ok(self.drive(effects, generation).await)
    }

    pub async fn current_slot(&self) -> Option<ViewSlot> {
        self.inner.lock().await.current.clone()
    }

    /// Present only while an overlapping (parallel) transition has the
    /// incoming view mounted alongside the outgoing one.
    pub async fn next_slot(&self) -> Option<ViewSlot> {
        self.inner.lock().await.next.clone()
    }

    /// While true, the rendering layer must not mount the incoming view.
    pub async fn is_fetch_pending(&self) -> bool {
        self.inner.lock().await.fetching
    }

    pub async fn is_leave_pending(&self) -> bool {
        self.inner.lock().await.leaving
    }

    pub async fn is_idle(&self) -> bool {
        self.inner.lock().await.machine.is_idle()
    }

    pub async fn transition_context(&self) -> TransitionContext {
        self.inner.lock().await.machine.context()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TransitionEvent> {
        self.events.subscribe()
    }

    /// Execute one machine step's effects, feed the settlement back in, and
    /// repeat until the effect list carries no asynchronous phase (terminal
    /// idle) or a newer generation supersedes this driver.
    async fn drive(self: &Arc<Self>, mut effects: Vec<Effect>, generation: u64) -> NavigationOutcome {
        loop {
            let mut phase_effect = None;
            {
                let mut inner = self.inner.lock().await;
                if inner.machine.context().generation != generation {
                    return NavigationOutcome::Superseded;
                }
                for effect in &effects {
                    match effect {
                        Effect::MarkNextReady => {
                            let next = inner.pending.as_ref().map(PendingTarget::slot);
                            inner.next = next;
                        }
                        Effect::ClearNext => inner.next = None,
                        Effect::SwapCurrent => {
                            if let Some(pending) = inner.pending.take() {
                                inner.current = Some(pending.slot());
                            }
                        }
                        other => phase_effect = Some(*other),
                    }
                }
            }

            let Some(effect) = phase_effect else {
                return NavigationOutcome::Completed;
            };

            let settled = match effect {
                Effect::RunAppear => self.run_appear(generation).await,
                Effect::RunPreload => self.run_preload(generation).await,
                Effect::RunFetch => self.run_fetch(generation).await,
                Effect::RunLeave => self
                    .run_departure(generation)
                    .await
                    .then_some(MachineEvent::PhaseSettled(Phase::Leave)),
                Effect::RunEnter => self
                    .run_arrival(generation, ArrivalTarget::Current)
                    .await
                    .then_some(MachineEvent::PhaseSettled(Phase::Enter)),
                Effect::SpawnParallel => return self.run_parallel(generation).await,
                _ => None,
            };

            let Some(event) = settled else {
                return NavigationOutcome::Superseded;
            };

            let mut inner = self.inner.lock().await;
            if inner.machine.context().generation != generation {
                return NavigationOutcome::Superseded;
            }
            effects = inner.machine.handle(event);
        }
    }

    /// Appear runs only for the very first resolved location and notifies
    /// through the enter events, like a non-overlapping arrival.
    async fn run_appear(self: &Arc<Self>, generation: u64) -> Option<MachineEvent> {
        let (view, token) = {
            let mut inner = self.inner.lock().await;
            let Some(view) = inner.current.as_ref().map(|slot| Arc::clone(&slot.view)) else {
                return Some(MachineEvent::PhaseSettled(Phase::Appear));
            };
            (view, inner.registry.register())
        };

        let _ = self.events.send(TransitionEvent::EnterStart { same_route: false });
        let (will, did) = Hook::appear_pair();
        self.invoke_hook(&view, will, Phase::Appear).await;
        if token.is_cancelled() {
            return None;
        }
        self.invoke_hook(&view, did, Phase::Appear).await;
        if token.is_cancelled() {
            return None;
        }
        let _ = self
            .events
            .send(TransitionEvent::EnterFinish { same_route: false });

        if self.is_stale(generation).await {
            return None;
        }
        Some(MachineEvent::PhaseSettled(Phase::Appear))
    }

    async fn run_preload(self: &Arc<Self>, generation: u64) -> Option<MachineEvent> {
        let (preload, token) = {
            let mut inner = self.inner.lock().await;
            let preload = inner
                .pending
                .as_ref()
                .and_then(|pending| pending.route.preload.clone());
            (preload, inner.registry.register())
        };

        if let Some(preload) = preload {
            if let Err(err) = preload().await {
                self.report_phase_failure(Phase::Preload, &err);
            }
        }

        if token.is_cancelled() || self.is_stale(generation).await {
            return None;
        }
        Some(MachineEvent::PhaseSettled(Phase::Preload))
    }

    async fn run_fetch(self: &Arc<Self>, generation: u64) -> Option<MachineEvent> {
        let (fetch, matched, token) = {
            let mut inner = self.inner.lock().await;
            let fetch = inner
                .pending
                .as_ref()
                .and_then(|pending| pending.route.fetch.clone());
            let matched = inner.pending.as_ref().map(|pending| pending.matched.clone());
            (fetch, matched, inner.registry.register())
        };

        if let (Some(fetch), Some(matched)) = (fetch, matched) {
            let notifier = FetchNotifier {
                events: self.events.clone(),
            };
            if let Err(err) = fetch(matched, notifier).await {
                self.report_phase_failure(Phase::Fetch, &err);
            }
        }

        let mut inner = self.inner.lock().await;
        if token.is_cancelled() || inner.machine.context().generation != generation {
            return None;
        }
        inner.fetching = false;
        Some(MachineEvent::PhaseSettled(Phase::Fetch))
    }

    /// Departure pair on the outgoing (current) view. Returns false when
    /// superseded mid-phase.
    async fn run_departure(self: &Arc<Self>, generation: u64) -> bool {
        let (view, same_route, token) = {
            let mut inner = self.inner.lock().await;
            let Some(view) = inner.current.as_ref().map(|slot| Arc::clone(&slot.view)) else {
                return true;
            };
            let same_route = inner.machine.context().same_route;
            (view, same_route, inner.registry.register())
        };

        let _ = self.events.send(TransitionEvent::LeaveStart { same_route });
        let (will, did) = Hook::leave_pair(same_route);
        self.invoke_hook(&view, will, Phase::Leave).await;
        if token.is_cancelled() {
            return false;
        }
        self.invoke_hook(&view, did, Phase::Leave).await;
        if token.is_cancelled() {
            return false;
        }
        let _ = self.events.send(TransitionEvent::LeaveFinish { same_route });

        let mut inner = self.inner.lock().await;
        if inner.machine.context().generation != generation {
            return false;
        }
        inner.leaving = false;
        true
    }

    /// Arrival pair on the incoming view. Returns false when superseded
    /// mid-phase.
    async fn run_arrival(self: &Arc<Self>, generation: u64, target: ArrivalTarget) -> bool {
        let (view, same_route, token) = {
            let mut inner = self.inner.lock().await;
            let slot = match target {
                ArrivalTarget::Current => inner.current.as_ref(),
                ArrivalTarget::Next => inner.next.as_ref(),
            };
            let Some(view) = slot.map(|slot| Arc::clone(&slot.view)) else {
                return true;
            };
            let same_route = inner.machine.context().same_route;
            (view, same_route, inner.registry.register())
        };

        let _ = self.events.send(TransitionEvent::EnterStart { same_route });
        let (will, did) = Hook::enter_pair(same_route);
        self.invoke_hook(&view, will, Phase::Enter).await;
        if token.is_cancelled() {
            return false;
        }
        self.invoke_hook(&view, did, Phase::Enter).await;
        if token.is_cancelled() {
            return false;
        }
        let _ = self.events.send(TransitionEvent::EnterFinish { same_route });

        if self.is_stale(generation).await {
            return false;
        }
        true
    }

    /// The compound state: departure and arrival as two spawned tasks, no
    /// ordering between them; each feeds its branch settlement and the join
    /// effects run exactly once, applied by whichever branch settles second.
    async fn run_parallel(self: &Arc<Self>, generation: u64) -> NavigationOutcome {
        let leave_task = {
            let orchestrator = Arc::clone(self);
            tokio::spawn(async move {
                if orchestrator.run_departure(generation).await {
                    orchestrator.settle_branch(Branch::Leave, generation).await;
                }
            })
        };
        let enter_task = {
            let orchestrator = Arc::clone(self);
            tokio::spawn(async move {
                if orchestrator
                    .run_arrival(generation, ArrivalTarget::Next)
                    .await
                {
                    orchestrator.settle_branch(Branch::Enter, generation).await;
                }
            })
        };

        let (leave_joined, enter_joined) = tokio::join!(leave_task, enter_task);
        for joined in [leave_joined, enter_joined] {
            if let Err(err) = joined {
                warn!(error = %err, "transition: parallel branch task panicked");
            }
        }

        if self.is_stale(generation).await {
            NavigationOutcome::Superseded
        } else {
            NavigationOutcome::Completed
        }
    }

    async fn settle_branch(self: &Arc<Self>, branch: Branch, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.machine.context().generation != generation {
            return;
        }
        let effects = inner.machine.handle(MachineEvent::BranchSettled(branch));
        for effect in effects {
            match effect {
                Effect::ClearNext => inner.next = None,
                Effect::SwapCurrent => {
                    if let Some(pending) = inner.pending.take() {
                        inner.current = Some(pending.slot());
                    }
                }
                other => warn!(effect = ?other, "transition: unexpected join effect"),
            }
        }
    }

    async fn invoke_hook(&self, view: &Arc<dyn View>, hook: Hook, phase: Phase) {
        if let Err(err) = self.invoker.invoke(view, hook).await {
            warn!(
                hook = hook.name(),
                error = %err,
                "transition: lifecycle hook failed; continuing"
            );
            let _ = self.events.send(TransitionEvent::PhaseFailed {
                phase,
                reason: err.to_string(),
            });
        }
    }

    fn report_phase_failure(&self, phase: Phase, err: &anyhow::Error) {
        warn!(phase = ?phase, error = %err, "transition: phase failed; continuing");
        let _ = self.events.send(TransitionEvent::PhaseFailed {
            phase,
            reason: err.to_string(),
        });
    }

    async fn is_stale(&self, generation: u64) -> bool {
        self.inner.lock().await.machine.context().generation != generation
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
