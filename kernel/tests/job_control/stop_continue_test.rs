/*!
 * Stop and Continue Tests
 * Tests for stop signals, SIGCONT and their reports to the parent
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use team_kernel::{
    ChildSelector, ExitReason, GroupId, JobControlState, Kernel, KernelError, KillTarget,
    Signal, SignalAction, SignalActionFlags, SignalQueues, SignalTarget, TeamId, ThreadAttributes,
    ThreadId, ThreadState, WaitFlags,
};

fn boot_with_queues() -> (Kernel, Arc<SignalQueues>) {
    let queues = Arc::new(SignalQueues::new());
    let kernel = Kernel::builder()
        .with_signals(queues.clone())
        .boot()
        .unwrap();
    (kernel, queues)
}

/// Shell team with a job in its own group, as a shell would set it up
fn shell_with_job(kernel: &Kernel) -> (TeamId, TeamId) {
    let shell = kernel
        .create_team(kernel.root_thread_id(), "/bin/sh", &[])
        .unwrap();
    let shell_thread = ThreadId::from(shell);
    kernel.setsid(shell_thread).unwrap();
    let job = kernel.create_team(shell_thread, "/bin/make", &[]).unwrap();
    kernel.setpgid(shell_thread, job, GroupId(0)).unwrap();
    (shell, job)
}

#[test]
fn test_stop_reported_to_parent() {
    let kernel = Kernel::boot().unwrap();
    let (shell, job) = shell_with_job(&kernel);
    let shell_thread = ThreadId::from(shell);

    kernel
        .kill(shell_thread, KillTarget::Team(job), Signal::SIGTSTP)
        .unwrap();

    let info = kernel
        .wait_for_child(shell_thread, ChildSelector::Team(job), WaitFlags::UNTRACED)
        .unwrap();
    assert_eq!(info.state, JobControlState::Stopped);
    assert_eq!(info.reason, ExitReason::Stopped);
    assert_eq!(info.signal, Some(Signal::SIGTSTP));
    assert_eq!(
        kernel.get_thread_info(ThreadId::from(job)).unwrap().state,
        ThreadState::Suspended
    );

    // consumed
    assert_eq!(
        kernel.wait_for_child(
            shell_thread,
            ChildSelector::Team(job),
            WaitFlags::UNTRACED | WaitFlags::NOHANG
        ),
        Err(KernelError::WouldBlock)
    );
}

#[test]
fn test_stop_suspends_every_thread() {
    let kernel = Kernel::boot().unwrap();
    let (shell, job) = shell_with_job(&kernel);
    let worker = kernel
        .spawn_thread(job, ThreadAttributes::new("worker"))
        .unwrap();
    kernel.resume_thread(worker).unwrap();
    assert_eq!(kernel.get_thread_info(worker).unwrap().state, ThreadState::Ready);

    kernel
        .kill(ThreadId::from(shell), KillTarget::Group(GroupId(job.raw())), Signal::SIGSTOP)
        .unwrap();
    assert_eq!(kernel.get_thread_info(worker).unwrap().state, ThreadState::Suspended);

    kernel
        .kill(ThreadId::from(shell), KillTarget::Team(job), Signal::SIGCONT)
        .unwrap();
    assert_eq!(kernel.get_thread_info(worker).unwrap().state, ThreadState::Ready);
    assert_eq!(
        kernel.get_thread_info(ThreadId::from(job)).unwrap().state,
        ThreadState::Ready
    );
}

#[test]
fn test_continue_reported_after_stop() {
    let kernel = Kernel::boot().unwrap();
    let (shell, job) = shell_with_job(&kernel);
    let shell_thread = ThreadId::from(shell);
    kernel
        .kill(shell_thread, KillTarget::Team(job), Signal::SIGSTOP)
        .unwrap();

    kernel
        .kill(shell_thread, KillTarget::Team(job), Signal::SIGCONT)
        .unwrap();

    let info = kernel
        .wait_for_child(shell_thread, ChildSelector::Any, WaitFlags::CONTINUED)
        .unwrap();
    assert_eq!(info.team, job);
    assert_eq!(info.state, JobControlState::Continued);
    assert_eq!(info.reason, ExitReason::Continued);
    // the stop report was replaced by the continue
    assert_eq!(
        kernel.wait_for_child(
            shell_thread,
            ChildSelector::Any,
            WaitFlags::STOPPED | WaitFlags::NOHANG
        ),
        Err(KernelError::WouldBlock)
    );
}

#[test]
fn test_continue_without_stop_not_reported() {
    let kernel = Kernel::boot().unwrap();
    let (shell, job) = shell_with_job(&kernel);
    let shell_thread = ThreadId::from(shell);

    kernel
        .kill(shell_thread, KillTarget::Team(job), Signal::SIGCONT)
        .unwrap();

    assert_eq!(
        kernel.wait_for_child(
            shell_thread,
            ChildSelector::Any,
            WaitFlags::CONTINUED | WaitFlags::NOHANG
        ),
        Err(KernelError::WouldBlock)
    );
}

#[test]
fn test_wait_by_group() {
    let kernel = Kernel::boot().unwrap();
    let (shell, job) = shell_with_job(&kernel);
    let shell_thread = ThreadId::from(shell);
    let sibling = kernel.create_team(shell_thread, "/bin/cc", &[]).unwrap();

    kernel.kill_team(sibling).unwrap();
    kernel.kill_team(job).unwrap();

    let info = kernel
        .wait_for_child(
            shell_thread,
            ChildSelector::Group(GroupId(job.raw())),
            WaitFlags::EXITED,
        )
        .unwrap();
    assert_eq!(info.team, job);

    let info = kernel
        .wait_for_child(shell_thread, ChildSelector::OwnGroup, WaitFlags::EXITED)
        .unwrap();
    assert_eq!(info.team, sibling);
}

#[test]
fn test_sigchld_sent_on_stop() {
    let (kernel, queues) = boot_with_queues();
    let (shell, job) = shell_with_job(&kernel);
    let shell_thread = ThreadId::from(shell);
    kernel
        .set_signal_action(shell_thread, Signal::SIGCHLD, SignalAction::handler(0x8000))
        .unwrap();

    kernel
        .kill(shell_thread, KillTarget::Team(job), Signal::SIGSTOP)
        .unwrap();
    assert_eq!(queues.delivered_count(SignalTarget::Team(shell), Signal::SIGCHLD), 1);

    // continuing does not notify the parent
    kernel
        .kill(shell_thread, KillTarget::Team(job), Signal::SIGCONT)
        .unwrap();
    assert_eq!(queues.delivered_count(SignalTarget::Team(shell), Signal::SIGCHLD), 1);

    kernel.kill_team(job).unwrap();
    assert_eq!(queues.delivered_count(SignalTarget::Team(shell), Signal::SIGCHLD), 2);
}

#[test]
fn test_nocldstop_suppresses_stop_notification() {
    let (kernel, queues) = boot_with_queues();
    let (shell, job) = shell_with_job(&kernel);
    let shell_thread = ThreadId::from(shell);
    kernel
        .set_signal_action(
            shell_thread,
            Signal::SIGCHLD,
            SignalAction::handler(0x8000).with_flags(SignalActionFlags::NOCLDSTOP),
        )
        .unwrap();

    kernel
        .kill(shell_thread, KillTarget::Team(job), Signal::SIGSTOP)
        .unwrap();
    assert_eq!(queues.delivered_count(SignalTarget::Team(shell), Signal::SIGCHLD), 0);

    // the stop is still reported through wait
    let info = kernel
        .wait_for_child(shell_thread, ChildSelector::Team(job), WaitFlags::STOPPED)
        .unwrap();
    assert_eq!(info.state, JobControlState::Stopped);

    kernel.kill_team(job).unwrap();
    assert_eq!(queues.delivered_count(SignalTarget::Team(shell), Signal::SIGCHLD), 1);
}

#[test]
fn test_suspend_and_resume_single_thread() {
    let kernel = Kernel::boot().unwrap();
    let team = kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap();
    let worker = kernel
        .spawn_thread(team, ThreadAttributes::new("worker"))
        .unwrap();
    kernel.resume_thread(worker).unwrap();

    kernel.suspend_thread(worker).unwrap();
    assert_eq!(kernel.get_thread_info(worker).unwrap().state, ThreadState::Suspended);
    assert_eq!(
        kernel.get_thread_info(ThreadId::from(team)).unwrap().state,
        ThreadState::Ready
    );
    // a thread-directed stop is not a job-control stop of the team
    assert_eq!(
        kernel.wait_for_child(
            kernel.root_thread_id(),
            ChildSelector::Team(team),
            WaitFlags::STOPPED | WaitFlags::NOHANG
        ),
        Err(KernelError::WouldBlock)
    );

    kernel.resume_thread(worker).unwrap();
    assert_eq!(kernel.get_thread_info(worker).unwrap().state, ThreadState::Ready);
}
