use shared::events::Phase;

/// Coordinator states. `Parallel` is the compound state running the
/// departure and arrival sub-flows concurrently until both settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Idle,
    Appear,
    Preload,
    Fetch,
    Leave,
    Enter,
    Parallel { leave_done: bool, enter_done: bool },
}

/// One of the two concurrent sub-flows of the `Parallel` compound state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Leave,
    Enter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    Navigate { same_route: bool },
    PhaseSettled(Phase),
    BranchSettled(Branch),
}

/// Side effects the driver must execute, in order, after a machine step.
/// At most one asynchronous effect (`Run*` / `SpawnParallel`) appears per
/// step, and always last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    RunAppear,
    RunPreload,
    RunFetch,
    RunLeave,
    RunEnter,
    SpawnParallel,
    /// Materialize the incoming view in the next slot (parallel overlap).
    MarkNextReady,
    ClearNext,
    /// Reassign the current slot to the incoming view.
    SwapCurrent,
}

/// Per-transition bookkeeping. The generation counter increments on every
/// accepted navigation and is the sole arbiter of staleness: a settlement
/// carrying an older generation must be discarded by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    pub generation: u64,
    pub race: bool,
    pub parallel: bool,
    pub same_route: bool,
}

/// Explicit state-enum rendition of the transition chart: state x event is
/// mapped to the next state plus an ordered side-effect list, with no
/// runtime hook lookup. Pure and synchronous; the orchestrator drives it.
#[derive(Debug)]
pub struct TransitionStateMachine {
    state: MachineState,
    context: TransitionContext,
}

impl TransitionStateMachine {
    pub fn new(parallel: bool) -> Self {
        Self {
            state: MachineState::Idle,
            context: TransitionContext {
                generation: 0,
                race: false,
                parallel,
                same_route: false,
            },
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn context(&self) -> TransitionContext {
        self.context
    }

    pub fn is_idle(&self) -> bool {
        self.state == MachineState::Idle
    }

    /// Apply one event and return the side effects for the driver. Unknown
    /// state/event combinations (stale settlements) are discarded without
    /// effect.
    pub fn handle(&mut self, event: MachineEvent) -> Vec<Effect> {
        match (self.state, event) {
            (MachineState::Idle, MachineEvent::Navigate { same_route }) => {
                let first = self.context.generation == 0;
                self.context.generation += 1;
                self.context.same_route = same_route;
                if first {
                    self.state = MachineState::Appear;
                    vec![Effect::RunAppear]
                } else {
                    self.state = MachineState::Preload;
                    vec![Effect::RunPreload]
                }
            }
            // A navigation in any non-idle state supersedes the in-flight
            // transition: mark the race, bump the generation, restart the
            // pipeline at preload.
            (_, MachineEvent::Navigate { same_route }) => {
                self.context.generation += 1;
                self.context.race = true;
                self.context.same_route = same_route;
                self.state = MachineState::Preload;
                vec![Effect::RunPreload]
            }
            (MachineState::Appear, MachineEvent::PhaseSettled(Phase::Appear)) => {
                self.enter_idle();
                vec![]
            }
            (MachineState::Preload, MachineEvent::PhaseSettled(Phase::Preload)) => {
                self.state = MachineState::Fetch;
                vec![Effect::RunFetch]
            }
            (MachineState::Fetch, MachineEvent::PhaseSettled(Phase::Fetch)) => {
                if self.context.race {
                    // The superseded transition's departure is abandoned:
                    // swap the slot directly and run only the arrival.
                    self.state = MachineState::Enter;
                    vec![Effect::ClearNext, Effect::SwapCurrent, Effect::RunEnter]
                } else if self.context.parallel {
                    self.state = MachineState::Parallel {
                        leave_done: false,
                        enter_done: false,
                    };
                    vec![Effect::MarkNextReady, Effect::SpawnParallel]
                } else {
                    self.state = MachineState::Leave;
                    vec![Effect::RunLeave]
                }
            }
            (MachineState::Leave, MachineEvent::PhaseSettled(Phase::Leave)) => {
                self.state = MachineState::Enter;
                vec![Effect::SwapCurrent, Effect::RunEnter]
            }
            (MachineState::Enter, MachineEvent::PhaseSettled(Phase::Enter)) => {
                self.enter_idle();
                vec![]
            }
            (
                MachineState::Parallel {
                    leave_done,
                    enter_done,
                },
                MachineEvent::BranchSettled(branch),
            ) => {
                let (leave_done, enter_done) = match branch {
                    Branch::Leave => (true, enter_done),
                    Branch::Enter => (leave_done, true),
                };
                if leave_done && enter_done {
                    self.enter_idle();
                    // Join action, executed exactly once after both settle.
                    vec![Effect::ClearNext, Effect::SwapCurrent]
                } else {
                    self.state = MachineState::Parallel {
                        leave_done,
                        enter_done,
                    };
                    vec![]
                }
            }
            _ => vec![],
        }
    }

    fn enter_idle(&mut self) {
        self.state = MachineState::Idle;
        self.context.race = false;
    }
}
