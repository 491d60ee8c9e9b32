//! Channel lifecycle against real shared memory and real child processes.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tlpfuzz_coverage::{
    AliveProbe, CancelToken, ChannelOptions, CoverageChannel, CoverageError, SharedSegment,
    TargetCommand, TcpProbe, WarmupPolicy,
};

fn small_channel() -> CoverageChannel {
    CoverageChannel::create(ChannelOptions {
        map_size: 4096,
        warmup: WarmupPolicy {
            deadline: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
        },
        shutdown_grace: Duration::from_secs(2),
        ..ChannelOptions::default()
    })
    .unwrap()
}

fn shell(script: &str) -> TargetCommand {
    TargetCommand::new("/bin/sh").arg("-c").arg(script)
}

#[test]
fn refresh_after_clear_is_zero_and_writes_become_visible() {
    let mut channel = small_channel();
    let writer = SharedSegment::attach(channel.shm_id(), channel.map_size()).unwrap();

    writer.write_byte(10, 5).unwrap();
    writer.write_byte(4095, 1).unwrap();
    channel.clear().unwrap();
    assert!(channel.refresh().unwrap().as_slice().iter().all(|b| *b == 0));

    writer.write_byte(42, 7).unwrap();
    let map = channel.refresh().unwrap();
    assert_eq!(map.as_slice()[42], 7);
    assert_eq!(map.hit_edges(), 1);
}

#[test]
fn counters_accumulate_until_cleared() {
    let mut channel = small_channel();
    let writer = SharedSegment::attach(channel.shm_id(), channel.map_size()).unwrap();

    writer.write_byte(1, 1).unwrap();
    channel.refresh().unwrap();
    writer.write_byte(2, 1).unwrap();
    assert_eq!(channel.refresh().unwrap().hit_edges(), 2);
}

#[test]
fn target_sees_injected_environment() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("env.txt");
    let script = format!(
        "echo \"$__AFL_SHM_ID $AFL_MAP_SIZE $AFL_IGNORE_PROBLEMS $EXTRA\" > {}; exec sleep 30",
        out.display()
    );

    let mut channel = small_channel();
    let mut probe = AliveProbe::new(Duration::from_millis(200));
    let pid = channel
        .spawn(&shell(&script).env("EXTRA", "x"), &mut probe, &CancelToken::new())
        .unwrap();
    assert_eq!(channel.target_pid(), Some(pid));
    assert!(channel.target_alive());

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text.trim(), format!("{} 4096 1 x", channel.shm_id()));

    let started = Instant::now();
    channel.close().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(channel.is_closed());
}

#[test]
fn second_spawn_is_rejected_while_target_runs() {
    let mut channel = small_channel();
    let mut probe = AliveProbe::new(Duration::from_millis(20));
    channel
        .spawn(&shell("exec sleep 30"), &mut probe, &CancelToken::new())
        .unwrap();

    let mut probe = AliveProbe::new(Duration::from_millis(20));
    let err = channel
        .spawn(&shell("exec sleep 30"), &mut probe, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, CoverageError::TargetAlreadySpawned { .. }));
}

#[test]
fn target_exit_during_warmup_is_reported() {
    let mut channel = small_channel();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut probe = TcpProbe::new(addr);
    let err = channel
        .spawn(&shell("exit 3"), &mut probe, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, CoverageError::TargetExited { .. }));
    assert_eq!(channel.target_pid(), None);
}

#[test]
fn readiness_deadline_is_enforced() {
    let mut channel = CoverageChannel::create(ChannelOptions {
        map_size: 1024,
        warmup: WarmupPolicy {
            deadline: Duration::from_millis(150),
            poll_interval: Duration::from_millis(10),
        },
        shutdown_grace: Duration::from_secs(1),
        ..ChannelOptions::default()
    })
    .unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut probe = TcpProbe::new(addr).with_connect_timeout(Duration::from_millis(10));
    let err = channel
        .spawn(&shell("exec sleep 30"), &mut probe, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, CoverageError::ReadinessTimeout(_)));
}

#[test]
fn cancelled_wait_stops_target() {
    let mut channel = small_channel();
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut probe = AliveProbe::new(Duration::from_secs(10));
    let err = channel
        .spawn(&shell("exec sleep 30"), &mut probe, &cancel)
        .unwrap_err();
    assert!(matches!(err, CoverageError::Cancelled));
}

#[test]
fn target_ignoring_sigterm_is_killed() {
    let mut channel = CoverageChannel::create(ChannelOptions {
        map_size: 1024,
        shutdown_grace: Duration::from_millis(200),
        ..ChannelOptions::default()
    })
    .unwrap();
    let mut probe = AliveProbe::new(Duration::from_millis(100));
    channel
        .spawn(
            &shell("trap '' TERM; while true; do sleep 1; done"),
            &mut probe,
            &CancelToken::new(),
        )
        .unwrap();

    let started = Instant::now();
    channel.close().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn close_is_idempotent_across_threads() {
    let channel = Arc::new(small_channel());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.close())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert!(channel.is_closed());
    channel.close().unwrap();
}

#[test]
fn closed_channel_rejects_refresh() {
    let mut channel = small_channel();
    channel.close().unwrap();
    assert!(matches!(channel.refresh(), Err(CoverageError::Closed)));
    assert!(matches!(channel.clear(), Err(CoverageError::Closed)));
}

#[test]
fn segment_is_removed_on_close() {
    let channel = small_channel();
    let id = channel.shm_id();
    channel.close().unwrap();
    assert!(SharedSegment::attach(id, 4096).is_err());
}

#[test]
fn summary_serializes_to_json() {
    let mut channel = small_channel();
    let writer = SharedSegment::attach(channel.shm_id(), channel.map_size()).unwrap();
    writer.write_byte(3, 9).unwrap();
    channel.refresh().unwrap();

    let json = serde_json::to_value(channel.summary()).unwrap();
    assert_eq!(json["hit_edges"], 1);
    assert_eq!(json["status"], "low");
    assert_eq!(channel.top_edges(5).len(), 1);
}
