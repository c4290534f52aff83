/*!
 * Team Lifecycle Tests
 * Tests for team creation, fork, exec and rollback of failed creation
 */

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use team_kernel::signals::{SignalFacility, SignalHandler};
use team_kernel::{
    AddressSpaces, GroupId, ImageLoader, IoContexts, Kernel, KernelError, KernelEvent,
    SessionId, Signal, SignalAction, TeamId, TeamState, ThreadAttributes, ThreadId, ThreadState,
    TimerClock, ALARM_TIMER_ID,
};

/// Rejects every image below `/bad`
struct RejectingLoader;

impl ImageLoader for RejectingLoader {
    fn load(&self, _team: TeamId, path: &str, _args: &[String]) -> Result<(), String> {
        if path.starts_with("/bad") {
            return Err("not an executable".to_string());
        }
        Ok(())
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_create_team_links_child() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();

    let team = kernel.create_team(root, "/bin/sh", &args(&["-i"])).unwrap();
    let info = kernel.get_team_info(team).unwrap();

    assert_eq!(info.name, "sh");
    assert_eq!(info.args, "-i");
    assert_eq!(info.state, TeamState::Normal);
    assert_eq!(info.parent, Some(TeamId(1)));
    assert_eq!(info.group, GroupId(1));
    assert_eq!(info.session, SessionId(1));
    assert_eq!(info.thread_count, 1);
    assert_eq!(kernel.team_count(), 2);
    assert!(kernel.root_team().lock().child_ids().contains(&team));
}

#[test]
fn test_main_thread_shares_team_id() {
    let kernel = Kernel::boot().unwrap();
    let team = kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap();

    let main = kernel.get_thread_info(ThreadId::from(team)).unwrap();
    assert_eq!(main.team, team);
    assert_eq!(main.name, "app");
    assert_eq!(main.state, ThreadState::Ready);
    assert!(main.user_stack.is_some());
}

#[test]
fn test_kernel_team_threads_have_no_user_stack() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.get_thread_info(kernel.root_thread_id()).unwrap();
    assert_eq!(root.team, TeamId(1));
    assert!(root.user_stack.is_none());
}

#[test]
fn test_image_load_failure_rolls_back() {
    let spaces = Arc::new(AddressSpaces::new());
    let contexts = Arc::new(IoContexts::new());
    let kernel = Kernel::builder()
        .with_image_loader(Arc::new(RejectingLoader))
        .with_address_spaces(spaces.clone())
        .with_io_contexts(contexts.clone())
        .boot()
        .unwrap();
    let events = kernel.subscribe();
    let before = kernel.stats();

    let result = kernel.create_team(kernel.root_thread_id(), "/bad/app", &[]);

    assert!(matches!(result, Err(KernelError::ImageLoad { .. })));
    assert_eq!(kernel.stats(), before);
    assert_eq!(spaces.live_count(), 1);
    assert_eq!(contexts.live_count(), 1);
    assert!(kernel.root_team().lock().child_ids().is_empty());
    assert_eq!(kernel.group(GroupId(1)).unwrap().lock().len(), 1);
    assert!(events.try_iter().next().is_none());

    // the kernel is still usable afterwards
    let team = kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap();
    assert_eq!(spaces.live_count(), 2);
    assert!(kernel.team(team).is_some());
}

#[test]
fn test_create_team_resets_handlers() {
    let kernel = Kernel::boot().unwrap();
    let parent = kernel
        .create_team(kernel.root_thread_id(), "/bin/sh", &[])
        .unwrap();
    let parent_thread = ThreadId::from(parent);
    kernel
        .set_signal_action(parent_thread, Signal::SIGUSR1, SignalAction::handler(0x4000))
        .unwrap();
    kernel
        .set_signal_action(parent_thread, Signal::SIGUSR2, SignalAction::IGNORE)
        .unwrap();

    let child = kernel.create_team(parent_thread, "/bin/ls", &[]).unwrap();
    let child_team = kernel.team(child).unwrap();
    let locked = child_team.lock();

    assert_eq!(locked.signal_action(Signal::SIGUSR1), SignalAction::DEFAULT);
    assert_eq!(locked.signal_action(Signal::SIGUSR2).handler, SignalHandler::Ignore);
}

#[test]
fn test_fork_inherits_from_parent() {
    let kernel = Kernel::boot().unwrap();
    let parent = kernel
        .create_team(kernel.root_thread_id(), "/bin/server", &args(&["--port", "80"]))
        .unwrap();
    let parent_thread = ThreadId::from(parent);
    kernel
        .set_signal_action(parent_thread, Signal::SIGUSR1, SignalAction::handler(0x4000))
        .unwrap();
    kernel.block_signal(parent_thread, Signal::SIGUSR2, true).unwrap();
    kernel.set_thread_priority(parent_thread, 30).unwrap();

    let child_thread = kernel.fork(parent_thread).unwrap();
    let child = TeamId::from(child_thread);

    let info = kernel.get_team_info(child).unwrap();
    assert_eq!(info.name, "server");
    assert_eq!(info.args, "--port 80");
    assert_eq!(info.parent, Some(parent));
    assert_eq!(info.group, kernel.get_team_info(parent).unwrap().group);

    let child_team = kernel.team(child).unwrap();
    assert_eq!(
        child_team.lock().signal_action(Signal::SIGUSR1),
        SignalAction::handler(0x4000)
    );
    assert!(kernel.signals().is_signal_blocked(child, Signal::SIGUSR2));

    let main = kernel.get_thread_info(child_thread).unwrap();
    let parent_main = kernel.get_thread_info(parent_thread).unwrap();
    assert_eq!(main.priority, 30);
    assert_eq!(
        main.user_stack.map(|s| s.size),
        parent_main.user_stack.map(|s| s.size)
    );
}

#[test]
fn test_kernel_team_cannot_fork_or_exec() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();

    assert!(matches!(kernel.fork(root), Err(KernelError::NotAllowed(_))));
    assert!(matches!(
        kernel.exec(root, "/bin/sh", &[]),
        Err(KernelError::NotAllowed(_))
    ));
}

#[test]
fn test_exec_replaces_image() {
    let kernel = Kernel::boot().unwrap();
    let team = kernel
        .create_team(kernel.root_thread_id(), "/bin/sh", &[])
        .unwrap();
    let main = ThreadId::from(team);
    kernel
        .set_signal_action(main, Signal::SIGUSR1, SignalAction::handler(0x1000))
        .unwrap();
    kernel
        .create_user_timer(team, TimerClock::RealTime, Duration::from_secs(1))
        .unwrap();
    kernel.set_alarm(main, Some(Duration::from_secs(5))).unwrap();
    let events = kernel.subscribe();

    kernel.exec(main, "/bin/top", &args(&["-d", "1"])).unwrap();

    let info = kernel.get_team_info(team).unwrap();
    assert_eq!(info.name, "top");
    assert_eq!(info.args, "-d 1");
    assert!(info.exec_done);
    assert_eq!(kernel.get_thread_info(main).unwrap().name, "top");

    let locked = kernel.team(team).unwrap();
    let locked = locked.lock();
    let timers: Vec<i32> = locked.user_timers().iter().map(|t| t.id).collect();
    assert_eq!(timers, vec![ALARM_TIMER_ID]);
    assert_eq!(locked.signal_action(Signal::SIGUSR1), SignalAction::DEFAULT);

    let seen: Vec<KernelEvent> = events.try_iter().collect();
    assert_eq!(seen, vec![KernelEvent::TeamExec { team }]);
}

#[test]
fn test_exec_requires_single_main_thread() {
    let kernel = Kernel::boot().unwrap();
    let team = kernel
        .create_team(kernel.root_thread_id(), "/bin/sh", &[])
        .unwrap();
    let main = ThreadId::from(team);
    let worker = kernel
        .spawn_thread(team, ThreadAttributes::new("worker"))
        .unwrap();

    assert!(matches!(
        kernel.exec(main, "/bin/ls", &[]),
        Err(KernelError::NotAllowed(_))
    ));
    assert!(matches!(
        kernel.exec(worker, "/bin/ls", &[]),
        Err(KernelError::NotAllowed(_))
    ));

    kernel.kill_thread(worker).unwrap();
    kernel.exec(main, "/bin/ls", &[]).unwrap();
    assert_eq!(kernel.get_team_info(team).unwrap().name, "ls");
}

#[test]
fn test_exec_ignores_debugger_nub() {
    let kernel = Kernel::boot().unwrap();
    let team = kernel
        .create_team(kernel.root_thread_id(), "/bin/sh", &[])
        .unwrap();
    kernel.install_debugger_nub(team).unwrap();

    kernel.exec(ThreadId::from(team), "/bin/ls", &[]).unwrap();
    assert!(kernel.get_team_info(team).unwrap().exec_done);
}

#[test]
fn test_exec_load_failure_keeps_team() {
    let kernel = Kernel::builder()
        .with_image_loader(Arc::new(RejectingLoader))
        .boot()
        .unwrap();
    let team = kernel
        .create_team(kernel.root_thread_id(), "/bin/sh", &[])
        .unwrap();

    let result = kernel.exec(ThreadId::from(team), "/bad/image", &[]);
    assert!(matches!(result, Err(KernelError::ImageLoad { .. })));

    let info = kernel.get_team_info(team).unwrap();
    assert_eq!(info.name, "sh");
    assert!(!info.exec_done);
}

#[test]
fn test_team_table_limit() {
    let config = team_kernel::KernelConfig::new().with_max_teams(3);
    let kernel = Kernel::builder().with_config(config).boot().unwrap();
    let root = kernel.root_thread_id();

    kernel.create_team(root, "/bin/a", &[]).unwrap();
    kernel.create_team(root, "/bin/b", &[]).unwrap();
    let result = kernel.create_team(root, "/bin/c", &[]);

    assert_eq!(result, Err(KernelError::NoMoreTeams { limit: 3 }));
    assert_eq!(kernel.team_count(), 3);
}

#[test]
fn test_next_team_info_visits_every_team() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let a = kernel.create_team(root, "/bin/a", &[]).unwrap();
    let b = kernel.create_team(root, "/bin/b", &[]).unwrap();
    kernel.kill_team(a).unwrap();

    let mut seen = Vec::new();
    let mut cursor = TeamId(0);
    while let Some(info) = kernel.get_next_team_info(cursor) {
        seen.push(info.team);
        cursor = info.team;
    }
    assert_eq!(seen, vec![TeamId(1), b]);
}
