/*!
 * Team Introspection
 */

use super::types::{Team, TeamState};
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::{GroupId, SessionId, TeamId, ThreadId, Uid};
use crate::job_control::{TeamUsage, UsageWho};
use crate::kernel::Kernel;
use serde::Serialize;
use std::sync::Arc;

/// Snapshot of a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamInfo {
    pub team: TeamId,
    pub name: String,
    pub args: String,
    pub state: TeamState,
    pub parent: Option<TeamId>,
    pub group: GroupId,
    pub session: SessionId,
    pub thread_count: usize,
    pub debugger_nub: Option<ThreadId>,
    pub uid: Uid,
    pub exec_done: bool,
}

impl TeamInfo {
    fn of(team: &Arc<Team>) -> Self {
        let locked = team.lock();
        Self {
            team: team.id(),
            name: locked.name().to_owned(),
            args: locked.args().to_owned(),
            state: locked.state(),
            parent: locked.parent_id(),
            group: locked.group_id(),
            session: locked.session_id(),
            thread_count: locked.thread_count(),
            debugger_nub: locked.debugger_nub(),
            uid: locked.uid(),
            exec_done: locked.exec_done(),
        }
    }
}

impl Kernel {
    pub fn get_team_info(&self, id: TeamId) -> KernelResult<TeamInfo> {
        let team = self.team(id).ok_or(KernelError::BadTeamId(id))?;
        Ok(TeamInfo::of(&team))
    }

    /// Live team with the smallest id above `cursor`
    ///
    /// Start with `TeamId(0)` and feed back the returned id; `None` once
    /// every team was reported. Ids are probed one by one up to the next id
    /// the allocator would hand out, so teams created meanwhile with a
    /// higher id are still found.
    pub fn get_next_team_info(&self, cursor: TeamId) -> Option<TeamInfo> {
        let first = cursor.raw().saturating_add(1).max(1);
        (first..self.inner.ids.peek())
            .find_map(|slot| self.team(TeamId(slot)))
            .map(|team| TeamInfo::of(&team))
    }

    /// CPU time of team `id` itself or of its reaped children
    pub fn get_team_usage_info(&self, id: TeamId, who: UsageWho) -> KernelResult<TeamUsage> {
        let team = self.team(id).ok_or(KernelError::BadTeamId(id))?;
        let locked = team.lock();
        let times = match who {
            UsageWho::Team => locked
                .threads
                .iter()
                .fold(locked.dead_threads_times, |mut total, thread| {
                    total.add(thread.cpu_times());
                    total
                }),
            UsageWho::Children => locked.children_state.dead_times,
        };
        Ok(times.into())
    }
}
