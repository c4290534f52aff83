/*!
 * Team Kernel - Demo Entry Point
 *
 * Boots the kernel, runs a short job-control session and prints the
 * resulting statistics:
 * - A shell team starting its own session
 * - A background job that is stopped, continued and killed
 * - Reaping both through wait_for_child
 */

use std::error::Error;
use tracing::info;

use team_kernel::{
    init_tracing, ChildSelector, GroupId, Kernel, KernelConfig, KillTarget, Signal, TeamId,
    ThreadId, WaitFlags,
};

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize structured tracing
    init_tracing();

    info!("Team kernel starting...");
    info!("================================================");

    let kernel = Kernel::builder()
        .with_config(KernelConfig::from_env())
        .boot()?;
    let root = kernel.root_thread_id();
    let events = kernel.subscribe();

    info!("Spawning shell team...");
    let shell = kernel.create_team(root, "/bin/sh", &["-i".to_string()])?;
    let shell_thread = ThreadId::from(shell);
    let session = kernel.setsid(shell_thread)?;
    kernel.set_controlling_tty(shell_thread, 1)?;
    info!(%shell, %session, "Shell leads a new session");

    info!("Starting background job...");
    let job = kernel.create_team(shell_thread, "/bin/sleep", &["60".to_string()])?;
    let group = kernel.setpgid(shell_thread, job, GroupId(0))?;
    info!(%job, %group, "Job runs in its own process group");

    kernel.kill(shell_thread, KillTarget::Group(group), Signal::SIGTSTP)?;
    let stopped =
        kernel.wait_for_child(shell_thread, ChildSelector::Team(job), WaitFlags::UNTRACED)?;
    info!(state = ?stopped.state, signal = ?stopped.signal, "Job stopped");

    kernel.kill(shell_thread, KillTarget::Group(group), Signal::SIGCONT)?;
    let continued =
        kernel.wait_for_child(shell_thread, ChildSelector::Team(job), WaitFlags::CONTINUED)?;
    info!(state = ?continued.state, "Job continued");

    kernel.kill(shell_thread, KillTarget::Team(job), Signal::SIGKILL)?;
    let dead = kernel.wait_for_child(shell_thread, ChildSelector::Any, WaitFlags::EXITED)?;
    info!(team = %dead.team, reason = ?dead.reason, signal = ?dead.signal, "Job reaped");

    info!("Shutting down shell...");
    kernel.exit_thread(shell_thread, 0)?;
    let shell_exit = kernel.wait_for_child(root, ChildSelector::Team(shell), WaitFlags::EXITED)?;
    info!(status = shell_exit.status, "Shell reaped");
    kernel.wait_for_undertaker();

    let mut cursor = TeamId(0);
    while let Some(team) = kernel.get_next_team_info(cursor) {
        info!(team = %team.team, name = %team.name, threads = team.thread_count, "Team alive");
        cursor = team.team;
    }

    info!(events = events.len(), "Lifecycle events published");
    info!("================================================");
    println!("{}", serde_json::to_string_pretty(&kernel.stats())?);
    Ok(())
}
