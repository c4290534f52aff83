/*!
 * Team Syscalls
 *
 * Signaling, watchers, debugger nub bookkeeping, user timers and signal
 * dispositions.
 */

use super::types::{Team, TeamState, TeamWatcher, TeamWatcherFn, TimerClock, UserTimer};
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::{GroupId, TeamId, ThreadId};
use crate::kernel::Kernel;
use crate::signals::{Signal, SignalAction, SignalInfo};
use crate::thread::ThreadAttributes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Timer id of the per-team alarm
pub const ALARM_TIMER_ID: i32 = 0;

/// Recipient of [`Kernel::kill`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillTarget {
    Team(TeamId),
    Group(GroupId),
    /// The caller's own process group
    OwnGroup,
}

impl Kernel {
    /// Send `signal` on behalf of the caller
    pub fn kill(&self, caller: ThreadId, target: KillTarget, signal: Signal) -> KernelResult<()> {
        let sender = self.caller_team(caller)?;
        let info = SignalInfo::new(sender.id(), sender.lock().uid);

        match target {
            KillTarget::Team(id) => {
                let team = self.live_team(id)?;
                if team.is_root() {
                    return Err(KernelError::not_allowed("the kernel team cannot be signaled"));
                }
                self.send_signal_to_team(&team, signal, info)
            }
            KillTarget::Group(group) => self.send_signal_to_group(group, signal, info),
            KillTarget::OwnGroup => self.send_signal_to_group(sender.group_id(), signal, info),
        }
    }

    /// Kill a whole team (SIGKILL)
    pub fn kill_team(&self, id: TeamId) -> KernelResult<()> {
        let team = self.live_team(id)?;
        if team.is_root() {
            return Err(KernelError::not_allowed("the kernel team cannot be killed"));
        }
        info!(team = %id, "Killing team");
        self.send_signal_to_team(&team, Signal::SIGKILL, SignalInfo::new(self.inner.root.id(), 0))
    }

    /// Run `callback` once when team `id` is deleted
    ///
    /// `key` identifies the watcher for [`Kernel::stop_watching_team`];
    /// registering the same key twice fails with `Busy`.
    pub fn start_watching_team(
        &self,
        id: TeamId,
        key: u64,
        callback: TeamWatcherFn,
    ) -> KernelResult<()> {
        let team = self.live_team(id)?;
        let mut locked = team.lock();
        if locked.state == TeamState::Death {
            return Err(KernelError::BadTeamId(id));
        }
        if locked.watchers.iter().any(|w| w.key == key) {
            return Err(KernelError::busy(format!("watcher {key} already registered")));
        }
        locked.watchers.push(TeamWatcher { key, callback });
        Ok(())
    }

    pub fn stop_watching_team(&self, id: TeamId, key: u64) -> KernelResult<()> {
        let team = self.live_team(id)?;
        let mut locked = team.lock();
        let pos = locked
            .watchers
            .iter()
            .position(|w| w.key == key)
            .ok_or_else(|| KernelError::bad_value(format!("no watcher {key} on team {id}")))?;
        locked.watchers.remove(pos);
        Ok(())
    }

    /// Start the debugger nub thread of team `id`
    ///
    /// Fails with `Busy` if a nub is installed already and with
    /// `NotAllowed` once the team is shutting down.
    pub fn install_debugger_nub(&self, id: TeamId) -> KernelResult<ThreadId> {
        let team = self.live_team(id)?;
        {
            let locked = team.lock();
            if locked.state >= TeamState::Shutdown {
                return Err(KernelError::not_allowed(format!("team {id} is shutting down")));
            }
            if locked.debugger_nub.is_some() {
                return Err(KernelError::busy(format!("team {id} already has a debugger")));
            }
        }

        let attributes = ThreadAttributes::new(format!("team {id} debug task")).kernel_only();
        let nub = self.spawn_thread(id, attributes)?;

        let raced = {
            let mut locked = team.lock();
            let raced = locked.debugger_nub.is_some() || locked.state >= TeamState::Shutdown;
            if !raced {
                locked.debugger_nub = Some(nub);
            }
            raced
        };
        if raced {
            self.kill_thread(nub)?;
            return Err(KernelError::busy(format!("team {id} debugger changed concurrently")));
        }

        self.resume_thread(nub)?;
        debug!(team = %id, thread = %nub, "Debugger nub installed");
        Ok(nub)
    }

    /// Stop the debugger nub of team `id`; its thread exits
    pub fn remove_debugger_nub(&self, id: TeamId) -> KernelResult<()> {
        let team = self.live_team(id)?;
        let nub = team
            .lock()
            .debugger_nub
            .take()
            .ok_or_else(|| KernelError::bad_value(format!("team {id} has no debugger")))?;

        if let Err(e) = self.kill_thread(nub) {
            debug!(team = %id, thread = %nub, error = %e, "Debugger nub already gone");
        }
        debug!(team = %id, "Debugger nub removed");
        Ok(())
    }

    /// Add a user-defined timer to team `id`; returns the timer id
    pub fn create_user_timer(
        &self,
        id: TeamId,
        clock: TimerClock,
        interval: Duration,
    ) -> KernelResult<i32> {
        let team = self.live_team(id)?;
        let mut locked = team.lock();
        if locked.state >= TeamState::Shutdown {
            return Err(KernelError::not_allowed(format!("team {id} is shutting down")));
        }
        let defined = locked
            .user_timers
            .iter()
            .filter(|t| t.is_user_defined())
            .count();
        if defined >= self.inner.config.max_user_defined_timers {
            return Err(KernelError::busy(format!("team {id} has {defined} timers")));
        }

        let timer = locked.next_timer_id;
        locked.next_timer_id += 1;
        locked.user_timers.push(UserTimer {
            id: timer,
            clock,
            interval,
        });
        Ok(timer)
    }

    pub fn delete_user_timer(&self, id: TeamId, timer: i32) -> KernelResult<()> {
        let team = self.live_team(id)?;
        let mut locked = team.lock();
        let pos = locked
            .user_timers
            .iter()
            .position(|t| t.id == timer && t.is_user_defined())
            .ok_or_else(|| KernelError::bad_value(format!("no user timer {timer}")))?;
        locked.user_timers.remove(pos);
        Ok(())
    }

    /// Arm (or with `None`, cancel) the caller team's alarm
    ///
    /// Returns the interval of the alarm it replaced. The alarm survives
    /// exec, unlike user-defined timers.
    pub fn set_alarm(
        &self,
        caller: ThreadId,
        interval: Option<Duration>,
    ) -> KernelResult<Option<Duration>> {
        let team = self.caller_team(caller)?;
        let mut locked = team.lock();
        let previous = locked
            .user_timers
            .iter()
            .position(|t| t.id == ALARM_TIMER_ID)
            .map(|pos| locked.user_timers.remove(pos).interval);
        if let Some(interval) = interval {
            locked.user_timers.push(UserTimer {
                id: ALARM_TIMER_ID,
                clock: TimerClock::RealTime,
                interval,
            });
        }
        Ok(previous)
    }

    /// Install `action` for `signal` in the caller's team; returns the old one
    pub fn set_signal_action(
        &self,
        caller: ThreadId,
        signal: Signal,
        action: SignalAction,
    ) -> KernelResult<SignalAction> {
        let entry = self.enter("set_signal_action", caller)?;
        let team = entry.team()?;
        let old = team.lock().signal_actions.set(signal, action)?;
        debug!(team = %team.id(), %signal, handler = ?action.handler, "Signal action changed");
        Ok(old)
    }

    /// Block or unblock `signal` for the caller's team
    ///
    /// Signals that became deliverable are handled when the call returns.
    pub fn block_signal(
        &self,
        caller: ThreadId,
        signal: Signal,
        blocked: bool,
    ) -> KernelResult<()> {
        if !signal.can_catch() {
            return Err(KernelError::bad_value(format!("{signal} cannot be blocked")));
        }
        let entry = self.enter("block_signal", caller)?;
        let team = entry.team()?;
        self.inner.signals.set_blocked(team.id(), signal, blocked);
        Ok(())
    }

    fn live_team(&self, id: TeamId) -> KernelResult<Arc<Team>> {
        self.team(id).ok_or(KernelError::BadTeamId(id))
    }
}
