//! Pure lifecycle state machine.
//!
//! [`transition`] maps the current [`Lifecycle`] and a [`LifecycleEvent`] to
//! the next lifecycle plus the [`Command`]s to execute. It performs no I/O:
//! the coordinator executes the commands against the collaborators and feeds
//! any follow-up events (probe results, refreshed flags) back in.
//!
//! ```text
//!                 enable                 probe done
//! Uninitialized ─────────▶ Initializing ───────────▶ Enabled
//!       │                       │                    │   ▲
//!       │ disable               │ disable            │   │ enable / refresh(on)
//!       ▼                       ▼                    ▼   │
//!    Disabled ◀─────────────────┴──────────────── Disabled
//! ```
//!
//! The probe runs at most once. A probe that completes after `disable`
//! only records its flags and never moves the state back to Enabled.

use tracer_types::{CapabilityFlags, ServiceState};

/// Progress of the one-time capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeStatus {
    /// Not started yet.
    #[default]
    NotStarted,
    /// Started, result pending.
    Running,
    /// Finished with these flags.
    Done(CapabilityFlags),
}

impl ProbeStatus {
    /// Whether the probe has been started (running or done).
    pub fn is_started(self) -> bool {
        !matches!(self, ProbeStatus::NotStarted)
    }

    /// The probe result, if finished.
    pub fn flags(self) -> Option<CapabilityFlags> {
        match self {
            ProbeStatus::Done(flags) => Some(flags),
            _ => None,
        }
    }
}

/// Complete lifecycle state: the service state plus probe progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifecycle {
    /// Current service state.
    pub state: ServiceState,
    /// Progress of the capability probe.
    pub probe: ProbeStatus,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// `enable()` was called.
    EnableRequested,
    /// The capability probe finished.
    ProbeCompleted(CapabilityFlags),
    /// `disable()` was called.
    DisableRequested,
    /// `refresh()` was called.
    RefreshRequested,
    /// The radio reported its persisted enabled flag in answer to a refresh.
    RefreshReported {
        /// Whether the service is persisted as enabled.
        enabled: bool,
    },
}

/// Side effects requested by a transition, executed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Hand the anonymized user id to the radio.
    PropagateUserId,
    /// Read the persisted enabled flag and ask the radio to refresh the
    /// service status.
    SyncServiceStatus,
    /// Run the capability probe; yields [`LifecycleEvent::ProbeCompleted`].
    RunProbe,
    /// Persist enabled and start the background service.
    EnableService,
    /// Persist disabled and stop the background service.
    DisableService,
    /// Read the persisted enabled flag; yields
    /// [`LifecycleEvent::RefreshReported`].
    QueryServiceEnabled,
}

/// Result of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Lifecycle after the event.
    pub next: Lifecycle,
    /// Commands to execute, in order.
    pub commands: Vec<Command>,
}

impl Transition {
    fn to(next: Lifecycle, commands: Vec<Command>) -> Self {
        Self { next, commands }
    }

    fn stay(current: Lifecycle) -> Self {
        Self::to(current, Vec::new())
    }
}

/// Compute the next lifecycle and the commands to run.
pub fn transition(current: Lifecycle, event: LifecycleEvent) -> Transition {
    match event {
        LifecycleEvent::EnableRequested => on_enable(current),
        LifecycleEvent::ProbeCompleted(flags) => on_probe_completed(current, flags),
        LifecycleEvent::DisableRequested => on_disable(current),
        LifecycleEvent::RefreshRequested => {
            Transition::to(current, vec![Command::QueryServiceEnabled])
        }
        LifecycleEvent::RefreshReported { enabled: true } => on_enable(current),
        LifecycleEvent::RefreshReported { enabled: false } => {
            if current.state == ServiceState::Initializing {
                // The probe will settle the state when it finishes.
                return Transition::stay(current);
            }
            Transition::stay(Lifecycle {
                state: ServiceState::Disabled,
                ..current
            })
        }
    }
}

fn on_enable(current: Lifecycle) -> Transition {
    match (current.state, current.probe) {
        // A probe is already running; its completion enables the service.
        (ServiceState::Initializing, _) => Transition::stay(current),
        (_, probe) if !probe.is_started() => Transition::to(
            Lifecycle {
                state: ServiceState::Initializing,
                probe: ProbeStatus::Running,
            },
            vec![
                Command::PropagateUserId,
                Command::SyncServiceStatus,
                Command::RunProbe,
            ],
        ),
        // Enabled or Disabled with the probe already started: no re-probe.
        _ => Transition::to(
            Lifecycle {
                state: ServiceState::Enabled,
                ..current
            },
            vec![Command::EnableService],
        ),
    }
}

fn on_probe_completed(current: Lifecycle, flags: CapabilityFlags) -> Transition {
    let probe = ProbeStatus::Done(flags);
    match current.state {
        // Enabling is not gated on the probe result.
        ServiceState::Initializing => Transition::to(
            Lifecycle {
                state: ServiceState::Enabled,
                probe,
            },
            vec![Command::EnableService],
        ),
        state => Transition::stay(Lifecycle { state, probe }),
    }
}

fn on_disable(current: Lifecycle) -> Transition {
    match current.state {
        ServiceState::Disabled => Transition::stay(current),
        _ => Transition::to(
            Lifecycle {
                state: ServiceState::Disabled,
                ..current
            },
            vec![Command::DisableService],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_flags() -> CapabilityFlags {
        CapabilityFlags {
            radio_available: true,
            location_permission_granted: true,
            bluetooth_on: true,
            multiple_advertisement_supported: true,
        }
    }

    fn enabled() -> Lifecycle {
        Lifecycle {
            state: ServiceState::Enabled,
            probe: ProbeStatus::Done(ready_flags()),
        }
    }

    #[test]
    fn test_first_enable_starts_probe() {
        let t = transition(Lifecycle::default(), LifecycleEvent::EnableRequested);
        assert_eq!(t.next.state, ServiceState::Initializing);
        assert_eq!(t.next.probe, ProbeStatus::Running);
        assert_eq!(
            t.commands,
            vec![
                Command::PropagateUserId,
                Command::SyncServiceStatus,
                Command::RunProbe
            ]
        );
    }

    #[test]
    fn test_enable_while_initializing_is_deduplicated() {
        let initializing = transition(Lifecycle::default(), LifecycleEvent::EnableRequested).next;
        let t = transition(initializing, LifecycleEvent::EnableRequested);
        assert_eq!(t.next, initializing);
        assert!(t.commands.is_empty());
    }

    #[test]
    fn test_probe_completion_enables_regardless_of_flags() {
        let initializing = transition(Lifecycle::default(), LifecycleEvent::EnableRequested).next;
        let t = transition(
            initializing,
            LifecycleEvent::ProbeCompleted(CapabilityFlags::default()),
        );
        assert_eq!(t.next.state, ServiceState::Enabled);
        assert_eq!(t.next.probe.flags(), Some(CapabilityFlags::default()));
        assert_eq!(t.commands, vec![Command::EnableService]);
    }

    #[test]
    fn test_enable_after_probe_does_not_reprobe() {
        let t = transition(enabled(), LifecycleEvent::EnableRequested);
        assert_eq!(t.next.state, ServiceState::Enabled);
        assert_eq!(t.commands, vec![Command::EnableService]);

        let disabled = transition(enabled(), LifecycleEvent::DisableRequested).next;
        let t = transition(disabled, LifecycleEvent::EnableRequested);
        assert_eq!(t.next.state, ServiceState::Enabled);
        assert_eq!(t.commands, vec![Command::EnableService]);
    }

    #[test]
    fn test_disable_is_idempotent() {
        let first = transition(enabled(), LifecycleEvent::DisableRequested);
        assert_eq!(first.next.state, ServiceState::Disabled);
        assert_eq!(first.commands, vec![Command::DisableService]);

        let second = transition(first.next, LifecycleEvent::DisableRequested);
        assert_eq!(second.next, first.next);
        assert!(second.commands.is_empty());
    }

    #[test]
    fn test_disable_before_first_enable_still_reaches_radio() {
        let t = transition(Lifecycle::default(), LifecycleEvent::DisableRequested);
        assert_eq!(t.next.state, ServiceState::Disabled);
        assert_eq!(t.next.probe, ProbeStatus::NotStarted);
        assert_eq!(t.commands, vec![Command::DisableService]);

        // The probe has not run yet, so the next enable runs it.
        let t = transition(t.next, LifecycleEvent::EnableRequested);
        assert_eq!(t.next.state, ServiceState::Initializing);
        assert!(t.commands.contains(&Command::RunProbe));
    }

    #[test]
    fn test_late_probe_does_not_resurrect_enabled() {
        let initializing = transition(Lifecycle::default(), LifecycleEvent::EnableRequested).next;
        let disabled = transition(initializing, LifecycleEvent::DisableRequested);
        assert_eq!(disabled.next.state, ServiceState::Disabled);
        assert_eq!(disabled.commands, vec![Command::DisableService]);

        let t = transition(disabled.next, LifecycleEvent::ProbeCompleted(ready_flags()));
        assert_eq!(t.next.state, ServiceState::Disabled);
        assert_eq!(t.next.probe, ProbeStatus::Done(ready_flags()));
        assert!(t.commands.is_empty());
    }

    #[test]
    fn test_refresh_queries_then_reconciles() {
        let t = transition(Lifecycle::default(), LifecycleEvent::RefreshRequested);
        assert_eq!(t.commands, vec![Command::QueryServiceEnabled]);
        assert_eq!(t.next, Lifecycle::default());

        let on = transition(t.next, LifecycleEvent::RefreshReported { enabled: true });
        assert_eq!(on.next.state, ServiceState::Initializing);
        assert!(on.commands.contains(&Command::RunProbe));

        let off = transition(enabled(), LifecycleEvent::RefreshReported { enabled: false });
        assert_eq!(off.next.state, ServiceState::Disabled);
        assert!(off.commands.is_empty());
    }

    #[test]
    fn test_refresh_off_during_probe_waits_for_probe() {
        let initializing = transition(Lifecycle::default(), LifecycleEvent::EnableRequested).next;
        let t = transition(initializing, LifecycleEvent::RefreshReported { enabled: false });
        assert_eq!(t.next, initializing);
        assert!(t.commands.is_empty());
    }

    #[test]
    fn test_refresh_on_when_enabled_restarts_service() {
        let t = transition(enabled(), LifecycleEvent::RefreshReported { enabled: true });
        assert_eq!(t.next.state, ServiceState::Enabled);
        assert_eq!(t.commands, vec![Command::EnableService]);
    }
}
