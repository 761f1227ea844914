//! End-to-end scenarios exercising the public API surface together:
//! reconciliation, the script executor, id allocation, and observer mode.

use sheriff::bus::message::{CmdInfo, Info, Orders, SheriffCmd};
use sheriff::bus::InMemoryBus;
use sheriff::model::{Action, CommandStatus, IdentType, Script, SheriffId, WaitFor};
use sheriff::{DispatchStep, Sheriff, SheriffError};
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

fn info_for(host: &str, sheriff_id: SheriffId, pid: i32, actual_runid: u32, exit_code: i32) -> Info {
    Info {
        utime: now_us(),
        host: host.to_string(),
        cpu_load: 0.0,
        phys_mem_total: 0,
        phys_mem_free: 0,
        cmds: vec![CmdInfo {
            name: "/bin/true".into(),
            nickname: "svc".into(),
            group: "".into(),
            sheriff_id,
            pid,
            actual_runid,
            exit_code,
            cpu_usage: 0.0,
            mem_vsize_bytes: 0,
            mem_rss_bytes: 0,
            auto_respawn: false,
        }],
        variables: Default::default(),
    }
}

#[tokio::test]
async fn natural_completion_transitions_through_running_to_stopped_ok() {
    let (bus, _handle) = InMemoryBus::new();
    let mut sheriff = Sheriff::with_name("test-sheriff");
    let cmd = sheriff
        .add_command(&bus, "host-a", "/bin/true", "svc", "", false)
        .await
        .unwrap();
    sheriff.start_command(&bus, cmd.sheriff_id).await.unwrap();
    assert_eq!(
        sheriff.command(cmd.sheriff_id).unwrap().status(),
        CommandStatus::TryingToStart
    );

    sheriff.apply_info(info_for("host-a", cmd.sheriff_id, 10, 1, 0));
    assert_eq!(
        sheriff.command(cmd.sheriff_id).unwrap().status(),
        CommandStatus::Running
    );

    sheriff.apply_info(info_for("host-a", cmd.sheriff_id, 0, 1, 0));
    let finished = sheriff.command(cmd.sheriff_id).unwrap();
    assert_eq!(finished.status(), CommandStatus::StoppedOk);
    assert!(finished.force_quit, "natural completion must synthesize force_quit");
}

#[tokio::test]
async fn kill_transitions_through_trying_to_stop_to_stopped_ok() {
    let (bus, _handle) = InMemoryBus::new();
    let mut sheriff = Sheriff::with_name("test-sheriff");
    let cmd = sheriff
        .add_command(&bus, "host-a", "/bin/true", "svc", "", false)
        .await
        .unwrap();
    sheriff.start_command(&bus, cmd.sheriff_id).await.unwrap();
    sheriff.apply_info(info_for("host-a", cmd.sheriff_id, 10, 1, 0));
    assert_eq!(
        sheriff.command(cmd.sheriff_id).unwrap().status(),
        CommandStatus::Running
    );

    sheriff.stop_command(&bus, cmd.sheriff_id).await.unwrap();
    assert_eq!(
        sheriff.command(cmd.sheriff_id).unwrap().status(),
        CommandStatus::TryingToStop
    );

    // raw wait-status encoding: low 7 bits hold the signal number (SIGTERM = 15).
    sheriff.apply_info(info_for("host-a", cmd.sheriff_id, 0, 1, 15));
    assert_eq!(
        sheriff.command(cmd.sheriff_id).unwrap().status(),
        CommandStatus::StoppedOk
    );
}

#[tokio::test]
async fn script_with_wait_blocks_until_status_changes_and_throttle_does_not_stall_forever() {
    let (bus, _handle) = InMemoryBus::new();
    let mut sheriff = Sheriff::with_name("test-sheriff");
    let cmd = sheriff
        .add_command(&bus, "host-a", "/bin/true", "foo", "", false)
        .await
        .unwrap();
    sheriff
        .add_script(Script {
            name: "deploy".into(),
            actions: vec![
                Action::Start {
                    ident_type: IdentType::Cmd,
                    ident: Some("foo".into()),
                    wait: Some(WaitFor::Running),
                },
                Action::WaitMs(50),
                Action::Stop {
                    ident_type: IdentType::Cmd,
                    ident: Some("foo".into()),
                    wait: Some(WaitFor::Stopped),
                },
            ],
        })
        .unwrap();

    sheriff.execute_script("deploy").unwrap();
    let step = sheriff.advance_script();
    assert_eq!(step, DispatchStep::Waiting);

    // Reporting immediately after the start dispatch falls inside the
    // 100ms throttle window; the wait must still be outstanding.
    sheriff.apply_info(info_for("host-a", cmd.sheriff_id, 10, 1, 0));
    assert_eq!(
        sheriff.advance_script(),
        DispatchStep::Waiting,
        "throttle should still suppress progress immediately after dispatch"
    );

    // Once the throttle window elapses, eventual progress must happen.
    sleep(Duration::from_millis(110));
    sheriff.apply_info(info_for("host-a", cmd.sheriff_id, 10, 1, 0));
    assert_eq!(
        sheriff.advance_script(),
        DispatchStep::Dispatched { delay_ms: Some(50) },
        "wait ms should be reached once the cohort is confirmed running"
    );
}

#[test]
fn cycle_detection_reports_infinite_loop_without_recursing() {
    let mut sheriff = Sheriff::with_name("test-sheriff");
    sheriff
        .add_script(Script {
            name: "a".into(),
            actions: vec![Action::RunScript("b".into())],
        })
        .unwrap();
    sheriff
        .add_script(Script {
            name: "b".into(),
            actions: vec![Action::RunScript("a".into())],
        })
        .unwrap();

    let errors = sheriff.check_script_for_errors("a");
    assert_eq!(
        errors,
        vec!["Infinite loop: script a eventually calls itself".to_string()]
    );
}

#[tokio::test]
async fn id_allocation_avoids_collision_with_a_densely_populated_deputy() {
    let (bus, _handle) = InMemoryBus::new();
    let mut sheriff = Sheriff::with_name("test-sheriff");

    // Report 500 sparse ids in one shot, including id 1 — the sheriff's
    // initial `next_sheriff_id` cursor.
    let cmds: Vec<CmdInfo> = (0u32..500)
        .map(|i| CmdInfo {
            name: "/bin/true".into(),
            nickname: format!("svc-{i}"),
            group: "".into(),
            sheriff_id: SheriffId::new(1 + i * 4),
            pid: 10,
            actual_runid: 1,
            exit_code: 0,
            cpu_usage: 0.0,
            mem_vsize_bytes: 0,
            mem_rss_bytes: 0,
            auto_respawn: false,
        })
        .collect();
    sheriff.apply_info(Info {
        utime: now_us(),
        host: "host-a".into(),
        cpu_load: 0.0,
        phys_mem_total: 0,
        phys_mem_free: 0,
        cmds,
        variables: Default::default(),
    });

    let allocated = sheriff
        .add_command(&bus, "host-a", "/bin/new", "fresh", "", false)
        .await
        .unwrap();

    let collisions = sheriff
        .all_commands()
        .into_iter()
        .filter(|c| c.sheriff_id == allocated.sheriff_id && c.nickname != "fresh")
        .count();
    assert_eq!(collisions, 0);
}

#[tokio::test]
async fn observer_mode_mirrors_peer_orders_and_rejects_local_mutators() {
    let (bus, _handle) = InMemoryBus::new();
    let mut sheriff = Sheriff::with_name("observer");
    sheriff.set_observer(true);

    let peer_orders = Orders {
        utime: now_us(),
        host: "host-a".into(),
        sheriff_name: "peer-sheriff".into(),
        cmds: vec![SheriffCmd {
            name: "/bin/true".into(),
            nickname: "peer-svc".into(),
            sheriff_id: SheriffId::new(42),
            desired_runid: 3,
            force_quit: false,
            group: "".into(),
            auto_respawn: false,
        }],
        variables: Default::default(),
    };
    sheriff.apply_orders(peer_orders);

    let mirrored = sheriff.command(SheriffId::new(42)).unwrap();
    assert_eq!(mirrored.nickname, "peer-svc");
    assert_eq!(mirrored.desired_runid.get(), 3);

    let err = sheriff
        .add_command(&bus, "host-a", "/bin/true", "local", "", false)
        .await
        .unwrap_err();
    assert!(matches!(err, SheriffError::ModeViolation));
}
