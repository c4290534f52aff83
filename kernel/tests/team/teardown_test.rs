/*!
 * Team Teardown Tests
 * Tests for team exit, reaping, reparenting and death notifications
 */

use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use team_kernel::{
    ChildSelector, ExitReason, JobControlState, Kernel, KernelConfig, KernelError, KernelEvent,
    Signal, TeamId, ThreadAttributes, ThreadId, UsageWho, WaitFlags,
};

fn spawn_child(kernel: &Kernel, parent: ThreadId, path: &str) -> TeamId {
    kernel.create_team(parent, path, &[]).unwrap()
}

#[test]
fn test_kill_team_reports_killed() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = spawn_child(&kernel, root, "/bin/sleep");

    kernel.kill_team(child).unwrap();
    assert!(kernel.team(child).is_none());

    let info = kernel
        .wait_for_child(root, ChildSelector::Team(child), WaitFlags::EXITED)
        .unwrap();
    assert_eq!(info.team, child);
    assert_eq!(info.state, JobControlState::Dead);
    assert_eq!(info.reason, ExitReason::Killed);
    assert_eq!(info.signal, Some(Signal::SIGKILL));
    assert_eq!(info.status, 0);
}

#[test]
fn test_exit_status_reported() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = spawn_child(&kernel, root, "/bin/false");

    kernel.exit_thread(ThreadId::from(child), 7).unwrap();

    let info = kernel
        .wait_for_child(root, ChildSelector::Any, WaitFlags::EXITED)
        .unwrap();
    assert_eq!(info.team, child);
    assert_eq!(info.reason, ExitReason::Exited);
    assert_eq!(info.status, 7);
    assert_eq!(info.signal, None);
}

#[test]
fn test_exit_team_from_secondary_thread() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = spawn_child(&kernel, root, "/bin/app");
    let worker = kernel
        .spawn_thread(child, ThreadAttributes::new("worker"))
        .unwrap();
    kernel.resume_thread(worker).unwrap();

    kernel.exit_team(worker, 3).unwrap();
    assert!(kernel.team(child).is_none());

    let info = kernel
        .wait_for_child(root, ChildSelector::Team(child), WaitFlags::EXITED)
        .unwrap();
    assert_eq!(info.reason, ExitReason::Exited);
    assert_eq!(info.status, 3);
}

#[test]
fn test_multi_threaded_team_shuts_down() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = spawn_child(&kernel, root, "/bin/app");
    for i in 0..3 {
        let worker = kernel
            .spawn_thread(child, ThreadAttributes::new(format!("worker-{i}")))
            .unwrap();
        kernel.resume_thread(worker).unwrap();
    }
    assert_eq!(kernel.get_team_info(child).unwrap().thread_count, 4);

    kernel.kill_team(child).unwrap();
    kernel
        .wait_for_child(root, ChildSelector::Team(child), WaitFlags::EXITED)
        .unwrap();
    kernel.wait_for_undertaker();

    assert_eq!(kernel.thread_count(), 1);
    assert_eq!(kernel.team_count(), 1);
    assert_eq!(kernel.stats().kernel_stack_bytes, kernel.config().kernel_stack_size);
}

#[test]
fn test_nowait_leaves_entry() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = spawn_child(&kernel, root, "/bin/true");
    kernel.exit_thread(ThreadId::from(child), 0).unwrap();

    let peek = WaitFlags::EXITED | WaitFlags::NOWAIT;
    let first = kernel.wait_for_child(root, ChildSelector::Any, peek).unwrap();
    let second = kernel.wait_for_child(root, ChildSelector::Any, peek).unwrap();
    assert_eq!(first, second);

    let reaped = kernel
        .wait_for_child(root, ChildSelector::Any, WaitFlags::EXITED)
        .unwrap();
    assert_eq!(reaped, first);
    assert_eq!(
        kernel.wait_for_child(root, ChildSelector::Any, WaitFlags::EXITED),
        Err(KernelError::NoSuchChild)
    );
}

#[test]
fn test_dead_child_reaped_exactly_once() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = spawn_child(&kernel, root, "/bin/true");
    kernel.exit_thread(ThreadId::from(child), 0).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let kernel = kernel.clone();
            thread::spawn(move || {
                kernel.wait_for_child(
                    root,
                    ChildSelector::Team(child),
                    WaitFlags::EXITED | WaitFlags::NOHANG,
                )
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == KernelError::NoSuchChild));
}

#[test]
fn test_nohang_with_running_child() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    spawn_child(&kernel, root, "/bin/sleep");

    assert_eq!(
        kernel.wait_for_child(root, ChildSelector::Any, WaitFlags::EXITED | WaitFlags::NOHANG),
        Err(KernelError::WouldBlock)
    );
}

#[test]
fn test_wait_without_children() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();

    assert_eq!(
        kernel.wait_for_child(root, ChildSelector::Any, WaitFlags::EXITED),
        Err(KernelError::NoSuchChild)
    );
    assert!(matches!(
        kernel.wait_for_child(root, ChildSelector::Any, WaitFlags::NOHANG),
        Err(KernelError::BadValue(_))
    ));
}

#[test]
fn test_blocking_wait_woken_by_exit() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = spawn_child(&kernel, root, "/bin/sleep");

    let waiter = {
        let kernel = kernel.clone();
        thread::spawn(move || kernel.wait_for_child(root, ChildSelector::Any, WaitFlags::EXITED))
    };
    thread::sleep(Duration::from_millis(20));
    kernel.exit_thread(ThreadId::from(child), 42).unwrap();

    let info = waiter.join().unwrap().unwrap();
    assert_eq!(info.team, child);
    assert_eq!(info.status, 42);
}

#[test]
fn test_children_reparented_to_kernel_team() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let parent = spawn_child(&kernel, root, "/bin/sh");
    let child = spawn_child(&kernel, ThreadId::from(parent), "/bin/sleep");

    kernel.exit_thread(ThreadId::from(parent), 0).unwrap();

    assert_eq!(kernel.getppid(root, child).unwrap(), Some(TeamId(1)));
    assert!(kernel.root_team().lock().child_ids().contains(&child));

    kernel.kill_team(child).unwrap();
    let info = kernel
        .wait_for_child(root, ChildSelector::Team(child), WaitFlags::EXITED)
        .unwrap();
    assert_eq!(info.reason, ExitReason::Killed);
}

#[test]
fn test_dead_children_capped() {
    let config = KernelConfig::new().with_max_dead_children(2);
    let kernel = Kernel::builder().with_config(config).boot().unwrap();
    let root = kernel.root_thread_id();

    let children: Vec<TeamId> = (0..4)
        .map(|_| spawn_child(&kernel, root, "/bin/true"))
        .collect();
    for child in &children {
        kernel.exit_thread(ThreadId::from(*child), 0).unwrap();
    }

    assert_eq!(kernel.root_team().lock().dead_children_count(), 2);
    // the oldest entries were forgotten
    let first = kernel
        .wait_for_child(root, ChildSelector::Any, WaitFlags::EXITED)
        .unwrap();
    assert_eq!(first.team, children[2]);
}

#[test]
fn test_usage_accumulates_in_parent() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let child = spawn_child(&kernel, root, "/bin/cc");
    let worker = kernel
        .spawn_thread(child, ThreadAttributes::new("worker"))
        .unwrap();

    kernel
        .charge_cpu_time(ThreadId::from(child), Duration::from_millis(5), Duration::from_millis(1))
        .unwrap();
    kernel
        .charge_cpu_time(worker, Duration::from_millis(3), Duration::from_millis(2))
        .unwrap();
    let own = kernel.get_team_usage_info(child, UsageWho::Team).unwrap();
    assert_eq!(own.user_time, Duration::from_millis(8));

    kernel.kill_team(child).unwrap();
    let info = kernel
        .wait_for_child(root, ChildSelector::Team(child), WaitFlags::EXITED)
        .unwrap();
    assert_eq!(info.usage.user_time, Duration::from_millis(8));
    assert_eq!(info.usage.kernel_time, Duration::from_millis(3));

    let children = kernel
        .get_team_usage_info(TeamId(1), UsageWho::Children)
        .unwrap();
    assert_eq!(children.user_time, Duration::from_millis(8));
}

#[test]
fn test_watcher_runs_on_delete() {
    let kernel = Kernel::boot().unwrap();
    let child = spawn_child(&kernel, kernel.root_thread_id(), "/bin/app");
    let seen = Arc::new(AtomicU32::new(0));
    let dropped = Arc::new(AtomicU32::new(0));

    let flag = Arc::clone(&seen);
    kernel
        .start_watching_team(
            child,
            1,
            Box::new(move |id: TeamId| flag.store(id.raw(), Ordering::SeqCst)),
        )
        .unwrap();
    let flag = Arc::clone(&dropped);
    kernel
        .start_watching_team(child, 2, Box::new(move |_: TeamId| {
            flag.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    assert!(matches!(
        kernel.start_watching_team(child, 1, Box::new(|_: TeamId| {})),
        Err(KernelError::Busy(_))
    ));
    kernel.stop_watching_team(child, 2).unwrap();
    assert!(matches!(
        kernel.stop_watching_team(child, 2),
        Err(KernelError::BadValue(_))
    ));

    kernel.kill_team(child).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), child.raw());
    assert_eq!(dropped.load(Ordering::SeqCst), 0);
}

#[test]
fn test_lifecycle_events_published() {
    let kernel = Kernel::boot().unwrap();
    let events = kernel.subscribe();
    let child = spawn_child(&kernel, kernel.root_thread_id(), "/bin/app");
    kernel.kill_team(child).unwrap();

    let seen: Vec<KernelEvent> = events.try_iter().collect();
    let thread = ThreadId::from(child);
    assert_eq!(
        seen,
        vec![
            KernelEvent::TeamAdded { team: child },
            KernelEvent::ThreadAdded { thread, team: child },
            KernelEvent::TeamRemoved { team: child },
            KernelEvent::ThreadRemoved { thread, team: child },
        ]
    );
}
