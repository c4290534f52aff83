/*!
 * Orphaned Group Tests
 * Tests for orphan detection and the SIGHUP/SIGCONT sweep
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use team_kernel::{
    ChildSelector, GroupId, JobControlState, Kernel, KernelError, KillTarget, Signal,
    SignalAction, SignalQueues, SignalTarget, TeamId, ThreadId, WaitFlags,
};

/// Session leader without a terminal and one child in its group
fn detached_session(kernel: &Kernel) -> (TeamId, TeamId) {
    let leader = kernel
        .create_team(kernel.root_thread_id(), "/bin/daemon", &[])
        .unwrap();
    kernel.setsid(ThreadId::from(leader)).unwrap();
    let child = kernel
        .create_team(ThreadId::from(leader), "/bin/worker", &[])
        .unwrap();
    (leader, child)
}

#[test]
fn test_new_session_group_is_orphaned() {
    let kernel = Kernel::boot().unwrap();
    let (leader, _child) = detached_session(&kernel);

    // the leader's parent lives in another session
    assert!(kernel.is_group_orphaned(GroupId(leader.raw())).unwrap());
    assert!(!kernel.is_group_orphaned(GroupId(1)).unwrap());
    assert_eq!(
        kernel.is_group_orphaned(GroupId(4242)),
        Err(KernelError::BadGroupId(GroupId(4242)))
    );
}

#[test]
fn test_terminal_stop_discarded_in_orphaned_group() {
    let kernel = Kernel::boot().unwrap();
    let (leader, child) = detached_session(&kernel);
    let leader_thread = ThreadId::from(leader);

    for signal in [Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU] {
        kernel
            .kill(leader_thread, KillTarget::Team(child), signal)
            .unwrap();
        assert_eq!(
            kernel.wait_for_child(
                leader_thread,
                ChildSelector::Team(child),
                WaitFlags::UNTRACED | WaitFlags::NOHANG
            ),
            Err(KernelError::WouldBlock)
        );
    }

    // SIGSTOP is not subject to the orphan rule
    kernel
        .kill(leader_thread, KillTarget::Team(child), Signal::SIGSTOP)
        .unwrap();
    let info = kernel
        .wait_for_child(leader_thread, ChildSelector::Team(child), WaitFlags::UNTRACED)
        .unwrap();
    assert_eq!(info.state, JobControlState::Stopped);
    assert_eq!(info.signal, Some(Signal::SIGSTOP));
}

#[test]
fn test_group_orphaned_when_parent_exits() {
    let kernel = Kernel::boot().unwrap();
    let (leader, child) = detached_session(&kernel);
    let group = kernel
        .setpgid(ThreadId::from(leader), child, GroupId(0))
        .unwrap();
    assert!(!kernel.is_group_orphaned(group).unwrap());

    kernel.exit_thread(ThreadId::from(leader), 0).unwrap();

    assert!(kernel.is_group_orphaned(group).unwrap());
    assert_eq!(
        kernel.getppid(kernel.root_thread_id(), child).unwrap(),
        Some(TeamId(1))
    );
}

#[test]
fn test_stopped_orphans_get_hangup_and_continue() {
    let queues = Arc::new(SignalQueues::new());
    let kernel = Kernel::builder()
        .with_signals(queues.clone())
        .boot()
        .unwrap();
    let root = kernel.root_thread_id();

    let leader = kernel.create_team(root, "/bin/login", &[]).unwrap();
    let leader_thread = ThreadId::from(leader);
    kernel.setsid(leader_thread).unwrap();
    kernel.set_controlling_tty(leader_thread, 1).unwrap();

    let job = kernel.create_team(leader_thread, "/bin/vi", &[]).unwrap();
    let job_thread = ThreadId::from(job);
    let group = kernel.setpgid(job_thread, TeamId(0), GroupId(0)).unwrap();
    kernel
        .set_signal_action(job_thread, Signal::SIGHUP, SignalAction::handler(0x4000))
        .unwrap();

    kernel
        .kill(leader_thread, KillTarget::Team(job), Signal::SIGSTOP)
        .unwrap();
    assert!(!kernel.is_group_orphaned(group).unwrap());

    kernel.exit_thread(leader_thread, 0).unwrap();

    assert!(kernel.team(job).is_some());
    assert_eq!(queues.delivered_count(SignalTarget::Team(job), Signal::SIGHUP), 1);
    assert_eq!(queues.delivered_count(SignalTarget::Team(job), Signal::SIGCONT), 1);

    // the adopted stop report turned into a continue for the kernel team
    let info = kernel
        .wait_for_child(root, ChildSelector::Team(job), WaitFlags::CONTINUED)
        .unwrap();
    assert_eq!(info.state, JobControlState::Continued);
    assert_eq!(kernel.getppid(root, job).unwrap(), Some(TeamId(1)));
}

#[test]
fn test_running_orphans_left_alone() {
    let queues = Arc::new(SignalQueues::new());
    let kernel = Kernel::builder()
        .with_signals(queues.clone())
        .boot()
        .unwrap();
    let root = kernel.root_thread_id();

    let leader = kernel.create_team(root, "/bin/login", &[]).unwrap();
    let leader_thread = ThreadId::from(leader);
    kernel.setsid(leader_thread).unwrap();
    kernel.set_controlling_tty(leader_thread, 1).unwrap();
    let job = kernel.create_team(leader_thread, "/bin/top", &[]).unwrap();
    kernel.setpgid(leader_thread, job, GroupId(0)).unwrap();

    kernel.exit_thread(leader_thread, 0).unwrap();

    assert!(kernel.team(job).is_some());
    assert_eq!(queues.delivered_count(SignalTarget::Team(job), Signal::SIGHUP), 0);
    assert_eq!(queues.delivered_count(SignalTarget::Team(job), Signal::SIGCONT), 0);
}
