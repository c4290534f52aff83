/*!
 * Team Syscall Tests
 * Tests for kill, debugger nub, user timers, alarm and signal dispositions
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use team_kernel::{
    ChildSelector, ExitReason, Kernel, KernelConfig, KernelError, KillTarget, Signal,
    SignalAction, SignalQueues, SignalTarget, TeamId, ThreadId, TimerClock, WaitFlags,
};

fn boot_with_queues() -> (Kernel, Arc<SignalQueues>) {
    let queues = Arc::new(SignalQueues::new());
    let kernel = Kernel::builder()
        .with_signals(queues.clone())
        .boot()
        .unwrap();
    (kernel, queues)
}

#[test]
fn test_kernel_team_cannot_be_killed() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();

    assert!(matches!(kernel.kill_team(TeamId(1)), Err(KernelError::NotAllowed(_))));
    assert!(matches!(
        kernel.kill(root, KillTarget::Team(TeamId(1)), Signal::SIGTERM),
        Err(KernelError::NotAllowed(_))
    ));
    assert!(matches!(kernel.kill_thread(root), Err(KernelError::NotAllowed(_))));
}

#[test]
fn test_kill_unknown_team() {
    let kernel = Kernel::boot().unwrap();
    assert_eq!(
        kernel.kill(kernel.root_thread_id(), KillTarget::Team(TeamId(99)), Signal::SIGTERM),
        Err(KernelError::BadTeamId(TeamId(99)))
    );
}

#[test]
fn test_terminating_signal_kills_team() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = kernel.create_team(root, "/bin/app", &[]).unwrap();

    kernel.kill(root, KillTarget::Team(child), Signal::SIGTERM).unwrap();

    let info = kernel
        .wait_for_child(root, ChildSelector::Team(child), WaitFlags::EXITED)
        .unwrap();
    assert_eq!(info.reason, ExitReason::Killed);
    assert_eq!(info.signal, Some(Signal::SIGTERM));
    assert_eq!(info.signaling_user, 0);
}

#[test]
fn test_ignored_signal_discarded_at_send() {
    let (kernel, queues) = boot_with_queues();
    let root = kernel.root_thread_id();
    let child = kernel.create_team(root, "/bin/app", &[]).unwrap();
    kernel
        .set_signal_action(ThreadId::from(child), Signal::SIGUSR1, SignalAction::IGNORE)
        .unwrap();

    kernel.kill(root, KillTarget::Team(child), Signal::SIGUSR1).unwrap();

    assert_eq!(queues.delivered_count(SignalTarget::Team(child), Signal::SIGUSR1), 0);
    assert!(kernel.team(child).is_some());
}

#[test]
fn test_blocked_signal_stays_pending() {
    let (kernel, queues) = boot_with_queues();
    let root = kernel.root_thread_id();
    let child = kernel.create_team(root, "/bin/app", &[]).unwrap();
    let main = ThreadId::from(child);
    kernel.block_signal(main, Signal::SIGTERM, true).unwrap();

    kernel.kill(root, KillTarget::Team(child), Signal::SIGTERM).unwrap();
    assert!(kernel.team(child).is_some());
    assert_eq!(queues.pending_for_team(child), vec![Signal::SIGTERM]);

    // unblocking delivers it when the call leaves the kernel
    kernel.block_signal(main, Signal::SIGTERM, false).unwrap();
    assert!(kernel.team(child).is_none());
}

#[test]
fn test_uncatchable_signals_rejected() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap();
    let main = ThreadId::from(child);

    assert!(matches!(
        kernel.set_signal_action(main, Signal::SIGKILL, SignalAction::IGNORE),
        Err(KernelError::BadValue(_))
    ));
    assert!(matches!(
        kernel.set_signal_action(main, Signal::SIGSTOP, SignalAction::handler(0x10)),
        Err(KernelError::BadValue(_))
    ));
    assert!(matches!(
        kernel.block_signal(main, Signal::SIGKILL, true),
        Err(KernelError::BadValue(_))
    ));
}

#[test]
fn test_set_signal_action_returns_previous() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap();
    let main = ThreadId::from(child);

    let old = kernel
        .set_signal_action(main, Signal::SIGINT, SignalAction::handler(0x2000))
        .unwrap();
    assert_eq!(old, SignalAction::DEFAULT);
    let old = kernel
        .set_signal_action(main, Signal::SIGINT, SignalAction::DEFAULT)
        .unwrap();
    assert_eq!(old, SignalAction::handler(0x2000));
}

#[test]
fn test_debugger_nub_install_and_remove() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap();

    let nub = kernel.install_debugger_nub(child).unwrap();
    let info = kernel.get_thread_info(nub).unwrap();
    assert_eq!(info.team, child);
    assert_eq!(info.name, format!("team {child} debug task"));
    assert!(info.user_stack.is_none());
    assert_eq!(kernel.get_team_info(child).unwrap().debugger_nub, Some(nub));

    assert!(matches!(kernel.install_debugger_nub(child), Err(KernelError::Busy(_))));

    kernel.remove_debugger_nub(child).unwrap();
    kernel.wait_for_undertaker();
    let team = kernel.get_team_info(child).unwrap();
    assert_eq!(team.debugger_nub, None);
    assert_eq!(team.thread_count, 1);
    assert!(kernel.thread(nub).is_none());

    assert!(matches!(kernel.remove_debugger_nub(child), Err(KernelError::BadValue(_))));
}

#[test]
fn test_user_timers() {
    let config = KernelConfig {
        max_user_defined_timers: 2,
        ..KernelConfig::default()
    };
    let kernel = Kernel::builder().with_config(config).boot().unwrap();
    let child = kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap();

    let first = kernel
        .create_user_timer(child, TimerClock::RealTime, Duration::from_millis(100))
        .unwrap();
    let second = kernel
        .create_user_timer(child, TimerClock::TeamTotalCpu, Duration::from_millis(50))
        .unwrap();
    assert_eq!(second, first + 1);
    assert!(matches!(
        kernel.create_user_timer(child, TimerClock::RealTime, Duration::from_secs(1)),
        Err(KernelError::Busy(_))
    ));

    kernel.delete_user_timer(child, first).unwrap();
    assert!(matches!(
        kernel.delete_user_timer(child, first),
        Err(KernelError::BadValue(_))
    ));
    let third = kernel
        .create_user_timer(child, TimerClock::RealTime, Duration::from_secs(1))
        .unwrap();
    assert!(third > second);
}

#[test]
fn test_alarm_replaces_previous() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap();
    let main = ThreadId::from(child);

    assert_eq!(kernel.set_alarm(main, Some(Duration::from_secs(2))).unwrap(), None);
    assert_eq!(
        kernel.set_alarm(main, Some(Duration::from_secs(4))).unwrap(),
        Some(Duration::from_secs(2))
    );
    assert_eq!(kernel.set_alarm(main, None).unwrap(), Some(Duration::from_secs(4)));
    assert_eq!(kernel.set_alarm(main, None).unwrap(), None);

    // the alarm is not a user-defined timer
    assert!(matches!(
        kernel.delete_user_timer(child, team_kernel::ALARM_TIMER_ID),
        Err(KernelError::BadValue(_))
    ));
}

#[test]
fn test_signal_log_bounded_and_pruned() {
    let queues = Arc::new(SignalQueues::with_log_depth(64));
    let kernel = Kernel::builder()
        .with_signals(queues.clone())
        .boot()
        .unwrap();
    let root = kernel.root_thread_id();
    let child = kernel.create_team(root, "/bin/daemon", &[]).unwrap();

    for _ in 0..5_000 {
        kernel.kill(root, KillTarget::Team(child), Signal::SIGCONT).unwrap();
    }
    assert_eq!(queues.deliveries().len(), 64);
    assert_eq!(queues.delivered_count(SignalTarget::Team(child), Signal::SIGCONT), 64);

    kernel.kill_team(child).unwrap();
    assert_eq!(queues.delivered_count(SignalTarget::Team(child), Signal::SIGCONT), 0);
    assert!(queues.deliveries().len() <= 64);
}
