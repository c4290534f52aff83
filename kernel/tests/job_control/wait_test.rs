/*!
 * Wait Tests
 * Tests for interrupted waits, exact reaping and the fork/kill/wait flow
 */

use pretty_assertions::assert_eq;
use std::thread;
use std::time::Duration;
use team_kernel::{
    ChildSelector, ExitReason, JobControlState, Kernel, KernelError, KillTarget, Signal,
    SignalAction, TeamId, ThreadId, WaitFlags,
};

/// Spin until `thread` sits in a blocking wait
fn wait_until_blocked(kernel: &Kernel, id: ThreadId) {
    for _ in 0..500 {
        if kernel
            .thread(id)
            .is_some_and(|t| t.blocking_descriptor().is_some())
        {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("thread {id} never blocked");
}

#[test]
fn test_interrupted_wait_leaves_queues() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let shell = kernel.create_team(root, "/bin/sh", &[]).unwrap();
    let shell_thread = ThreadId::from(shell);
    kernel
        .set_signal_action(shell_thread, Signal::SIGUSR1, SignalAction::handler(0x1000))
        .unwrap();

    kernel.create_team(shell_thread, "/bin/sleep", &[]).unwrap();
    let stopped = kernel.create_team(shell_thread, "/bin/vi", &[]).unwrap();
    kernel
        .kill(shell_thread, KillTarget::Team(stopped), Signal::SIGSTOP)
        .unwrap();
    assert_eq!(kernel.team(shell).unwrap().lock().stopped_children_count(), 1);

    let waiter = {
        let kernel = kernel.clone();
        thread::spawn(move || {
            kernel.wait_for_child(shell_thread, ChildSelector::Any, WaitFlags::EXITED)
        })
    };
    wait_until_blocked(&kernel, shell_thread);
    kernel
        .kill(root, KillTarget::Team(shell), Signal::SIGUSR1)
        .unwrap();

    assert_eq!(waiter.join().unwrap(), Err(KernelError::Interrupted));
    {
        let team = kernel.team(shell).unwrap();
        let locked = team.lock();
        assert_eq!(locked.stopped_children_count(), 1);
        assert_eq!(locked.dead_children_count(), 0);
    }
    assert_eq!(
        kernel.wait_for_child(
            shell_thread,
            ChildSelector::Any,
            WaitFlags::EXITED | WaitFlags::NOHANG
        ),
        Err(KernelError::WouldBlock)
    );

    let info = kernel
        .wait_for_child(shell_thread, ChildSelector::Any, WaitFlags::UNTRACED)
        .unwrap();
    assert_eq!(info.team, stopped);
    assert_eq!(info.state, JobControlState::Stopped);
}

#[test]
fn test_reap_removes_exactly_one_entry() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let shell = kernel.create_team(root, "/bin/sh", &[]).unwrap();
    let shell_thread = ThreadId::from(shell);

    let children: Vec<TeamId> = (0..2)
        .map(|_| kernel.create_team(shell_thread, "/bin/true", &[]).unwrap())
        .collect();
    for &child in &children {
        kernel.exit_thread(ThreadId::from(child), 0).unwrap();
    }

    let dead_count = || kernel.team(shell).unwrap().lock().dead_children_count();
    assert_eq!(dead_count(), 2);

    let first = kernel
        .wait_for_child(shell_thread, ChildSelector::Any, WaitFlags::EXITED)
        .unwrap();
    assert_eq!(dead_count(), 1);

    let second = kernel
        .wait_for_child(shell_thread, ChildSelector::Any, WaitFlags::EXITED)
        .unwrap();
    assert_eq!(dead_count(), 0);

    let mut reaped = vec![first.team, second.team];
    reaped.sort();
    assert_eq!(reaped, children);
}

#[test]
fn test_forked_child_killed_then_reaped() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let parent = kernel.create_team(root, "/bin/sh", &[]).unwrap();
    let parent_thread = ThreadId::from(parent);

    let child_thread = kernel.fork(parent_thread).unwrap();
    let child = TeamId::from(child_thread);
    assert_eq!(kernel.getppid(root, child).unwrap(), Some(parent));

    kernel
        .kill(parent_thread, KillTarget::Team(child), Signal::SIGTERM)
        .unwrap();

    let info = kernel
        .wait_for_child(parent_thread, ChildSelector::Any, WaitFlags::EXITED)
        .unwrap();
    assert_eq!(info.team, child);
    assert_eq!(info.reason, ExitReason::Killed);
    assert_eq!(info.signal, Some(Signal::SIGTERM));
    assert_eq!(
        kernel.wait_for_child(parent_thread, ChildSelector::Any, WaitFlags::EXITED),
        Err(KernelError::NoSuchChild)
    );
}
