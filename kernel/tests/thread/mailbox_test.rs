/*!
 * Mailbox and User Blocking Tests
 * Tests for send_data/receive_data, find_thread and block/unblock
 */

use pretty_assertions::assert_eq;
use std::thread;
use std::time::Duration;
use team_kernel::{
    Kernel, KernelError, KillTarget, Signal, SignalAction, TeamId, ThreadAttributes, ThreadId,
    ThreadMessage, ThreadState,
};

fn app_team(kernel: &Kernel) -> TeamId {
    kernel
        .create_team(kernel.root_thread_id(), "/bin/app", &[])
        .unwrap()
}

fn spawn_worker(kernel: &Kernel, team: TeamId, name: &str) -> ThreadId {
    kernel
        .spawn_thread(team, ThreadAttributes::new(name))
        .unwrap()
}

/// Spin until `id` sits in a blocking wait
fn wait_until_blocked(kernel: &Kernel, id: ThreadId) {
    for _ in 0..500 {
        if kernel.thread(id).is_some_and(|t| {
            t.blocking_descriptor().is_some() && t.state() == ThreadState::Waiting
        }) {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    panic!("thread {id} never blocked");
}

#[test]
fn test_send_then_receive() {
    let kernel = Kernel::boot().unwrap();
    let team = app_team(&kernel);
    let main = ThreadId::from(team);
    let worker = spawn_worker(&kernel, team, "worker");

    assert!(!kernel.has_data(worker).unwrap());
    kernel.send_data(main, worker, 42, b"hello").unwrap();
    assert!(kernel.has_data(worker).unwrap());

    let message = kernel.receive_data(worker).unwrap();
    assert_eq!(
        message,
        ThreadMessage {
            sender: main,
            code: 42,
            data: b"hello".to_vec(),
        }
    );
    assert!(!kernel.has_data(worker).unwrap());
}

#[test]
fn test_second_sender_waits_for_free_slot() {
    let kernel = Kernel::boot().unwrap();
    let team = app_team(&kernel);
    let main = ThreadId::from(team);
    let worker = spawn_worker(&kernel, team, "worker");

    kernel.send_data(main, worker, 1, b"first").unwrap();
    let sender = {
        let kernel = kernel.clone();
        thread::spawn(move || kernel.send_data(main, worker, 2, b"second"))
    };
    wait_until_blocked(&kernel, main);
    assert_eq!(
        kernel.get_thread_info(main).unwrap().blocked_on,
        Some("thread send")
    );

    assert_eq!(kernel.receive_data(worker).unwrap().code, 1);
    assert_eq!(sender.join().unwrap(), Ok(()));
    let second = kernel.receive_data(worker).unwrap();
    assert_eq!(second.code, 2);
    assert_eq!(second.data, b"second".to_vec());
}

#[test]
fn test_receiver_waits_for_message() {
    let kernel = Kernel::boot().unwrap();
    let team = app_team(&kernel);
    let main = ThreadId::from(team);
    let worker = spawn_worker(&kernel, team, "worker");

    let receiver = {
        let kernel = kernel.clone();
        thread::spawn(move || kernel.receive_data(worker))
    };
    wait_until_blocked(&kernel, worker);
    assert_eq!(kernel.get_thread_info(worker).unwrap().state, ThreadState::Waiting);

    kernel.send_data(main, worker, 7, &[]).unwrap();
    let message = receiver.join().unwrap().unwrap();
    assert_eq!(message.sender, main);
    assert_eq!(message.code, 7);
    assert!(message.data.is_empty());
}

#[test]
fn test_oversized_message_rejected() {
    let kernel = Kernel::boot().unwrap();
    let team = app_team(&kernel);
    let worker = spawn_worker(&kernel, team, "worker");

    let payload = vec![0u8; 64 * 1024 + 1];
    assert!(matches!(
        kernel.send_data(ThreadId::from(team), worker, 1, &payload),
        Err(KernelError::NoMemory(_))
    ));
    assert!(!kernel.has_data(worker).unwrap());
}

#[test]
fn test_target_exit_fails_blocked_sender() {
    let kernel = Kernel::boot().unwrap();
    let team = app_team(&kernel);
    let main = ThreadId::from(team);
    let worker = spawn_worker(&kernel, team, "worker");

    kernel.send_data(main, worker, 1, b"queued").unwrap();
    let sender = {
        let kernel = kernel.clone();
        thread::spawn(move || kernel.send_data(main, worker, 2, b"late"))
    };
    wait_until_blocked(&kernel, main);

    kernel.exit_thread(worker, 0).unwrap();
    assert_eq!(sender.join().unwrap(), Err(KernelError::BadThreadId(worker)));
    assert_eq!(
        kernel.send_data(main, worker, 3, &[]),
        Err(KernelError::BadThreadId(worker))
    );
    assert_eq!(kernel.has_data(worker), Err(KernelError::BadThreadId(worker)));
}

#[test]
fn test_signal_interrupts_receive() {
    let kernel = Kernel::boot().unwrap();
    let root = kernel.root_thread_id();
    let team = app_team(&kernel);
    let main = ThreadId::from(team);
    kernel
        .set_signal_action(main, Signal::SIGUSR1, SignalAction::handler(0x1000))
        .unwrap();

    let receiver = {
        let kernel = kernel.clone();
        thread::spawn(move || kernel.receive_data(main))
    };
    wait_until_blocked(&kernel, main);
    kernel.kill(root, KillTarget::Team(team), Signal::SIGUSR1).unwrap();

    assert_eq!(receiver.join().unwrap(), Err(KernelError::Interrupted));
    assert!(!kernel.has_data(main).unwrap());
}

#[test]
fn test_find_thread_by_name() {
    let kernel = Kernel::boot().unwrap();
    let team = app_team(&kernel);
    let server = spawn_worker(&kernel, team, "net server");
    spawn_worker(&kernel, team, "net client");

    assert_eq!(kernel.find_thread("net server"), Some(server));
    assert_eq!(kernel.find_thread("missing"), None);

    kernel.rename_thread(server, "net idle").unwrap();
    assert_eq!(kernel.find_thread("net server"), None);
    assert_eq!(kernel.find_thread("net idle"), Some(server));

    kernel.exit_thread(server, 0).unwrap();
    assert_eq!(kernel.find_thread("net idle"), None);
}

#[test]
fn test_block_returns_posted_status() {
    let kernel = Kernel::boot().unwrap();
    let team = app_team(&kernel);
    let main = ThreadId::from(team);

    let blocker = {
        let kernel = kernel.clone();
        thread::spawn(move || kernel.block_thread(main))
    };
    wait_until_blocked(&kernel, main);
    let info = kernel.get_thread_info(main).unwrap();
    assert_eq!(info.state, ThreadState::Waiting);
    assert_eq!(info.blocked_on, Some("user block"));

    kernel.unblock_thread(main, -5).unwrap();
    assert_eq!(blocker.join().unwrap(), Ok(-5));

    let info = kernel.get_thread_info(main).unwrap();
    assert_ne!(info.state, ThreadState::Waiting);
    assert_eq!(info.blocked_on, None);
}

#[test]
fn test_unblock_before_block_is_kept() {
    let kernel = Kernel::boot().unwrap();
    let team = app_team(&kernel);
    let main = ThreadId::from(team);

    kernel.unblock_thread(main, 3).unwrap();
    kernel.unblock_thread(main, 4).unwrap();
    assert_eq!(kernel.block_thread(main), Ok(4));
}

#[test]
fn test_unblock_rejects_kernel_and_unknown_threads() {
    let kernel = Kernel::boot().unwrap();
    assert!(matches!(
        kernel.unblock_thread(kernel.root_thread_id(), 0),
        Err(KernelError::NotAllowed(_))
    ));
    assert_eq!(
        kernel.unblock_thread(ThreadId(9999), 0),
        Err(KernelError::BadThreadId(ThreadId(9999)))
    );
}
