//! Integration tests for interactive sessions.
//!
//! Most tests drive the scripted fake shell from `support`; the ones named
//! `real_sh_*` run against the system `sh`.

mod support;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sushell::shell::{
    Batch, BatchResult, Builder, LineHandler, Outcome, Phase, Session, ThreadDispatcher,
    TokioDispatcher,
};
use support::FakeShell;

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

type Seen = Arc<Mutex<Vec<(i32, Outcome, Vec<String>)>>>;

fn recorder(seen: &Seen) -> impl FnOnce(BatchResult) + Send + 'static {
    let seen = Arc::clone(seen);
    move |r| seen.lock().unwrap().push((r.tag, r.outcome, r.output))
}

fn fake_builder(fake: &FakeShell) -> Builder {
    Builder::new().log_io(false).context(fake.context())
}

#[test]
fn batches_complete_in_submission_order() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    let seen = Seen::default();

    for tag in 0..20 {
        session.submit_lines([format!("echo line {tag}")], tag, recorder(&seen));
    }
    assert!(session.wait_for_idle(WAIT));
    session.close();

    let seen = seen.lock().unwrap();
    let expected: Vec<_> =
        (0..20).map(|tag| (tag, Outcome::Exited(0), vec![format!("line {tag}")])).collect();
    assert_eq!(*seen, expected);
}

#[test]
fn exit_status_of_last_line_is_reported() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    let seen = Seen::default();

    session.submit_lines(["echo a", "(exit 5)"], 1, recorder(&seen));
    session.submit_lines(["(exit 5)", "echo b"], 2, recorder(&seen));
    session.wait_for_idle(WAIT);
    session.close();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (1, Outcome::Exited(5), vec!["a".to_string()]),
            (2, Outcome::Exited(0), vec!["b".to_string()]),
        ]
    );
}

#[test]
fn markers_are_unique_across_ten_thousand_batches() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();

    for tag in 0..10_000 {
        session.submit(Batch::new(["echo x"], tag));
    }
    assert!(session.wait_for_idle(Some(Duration::from_secs(60))));
    session.close();

    let markers = fake.stats().markers;
    assert_eq!(markers.len(), 10_000);
    let unique: HashSet<_> = markers.iter().collect();
    assert_eq!(unique.len(), markers.len());
}

#[test]
fn concurrent_submitters_never_overlap_batches() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    let completed = Arc::new(AtomicUsize::new(0));

    thread::scope(|scope| {
        for worker in 0..8 {
            let session = &session;
            let completed = Arc::clone(&completed);
            scope.spawn(move || {
                for i in 0..50 {
                    let completed = Arc::clone(&completed);
                    session.submit_lines([format!("echo {worker}-{i}")], worker, move |r| {
                        assert_eq!(r.outcome, Outcome::Exited(0));
                        completed.fetch_add(1, Ordering::SeqCst);
                    });
                }
            });
        }
    });
    assert!(session.wait_for_idle(WAIT));
    session.close();

    assert_eq!(completed.load(Ordering::SeqCst), 400);
    let stats = fake.stats();
    assert_eq!(stats.scripts_written, 400);
    assert_eq!(stats.max_in_flight, 1);
}

#[test]
fn empty_batch_completes_without_touching_the_shell() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    let seen = Seen::default();

    session.submit(Batch::new(Vec::<String>::new(), 5).on_result(recorder(&seen)));
    session.submit_lines(["echo after"], 6, recorder(&seen));
    session.wait_for_idle(WAIT);
    session.close();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(5, Outcome::Exited(0), vec![]), (6, Outcome::Exited(0), vec!["after".to_string()])]
    );
    assert_eq!(fake.stats().scripts_written, 1);
}

#[test]
fn close_is_idempotent_and_later_submits_fail_fast() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    session.close();
    session.close();
    assert_eq!(session.phase(), Phase::Closed);
    assert!(!session.is_running());

    let seen = Seen::default();
    session.submit_lines(["echo late"], 9, recorder(&seen));
    assert_eq!(*seen.lock().unwrap(), vec![(9, Outcome::ShellDied, vec![])]);
}

#[test]
fn close_drains_queued_work_first() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    let seen = Seen::default();
    for tag in 0..5 {
        session.submit_lines(["echo queued"], tag, recorder(&seen));
    }
    session.close();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert!(seen.iter().all(|(_, outcome, _)| *outcome == Outcome::Exited(0)));
}

#[test]
fn watchdog_fires_once_and_kills_the_session() {
    let fake = FakeShell::new();
    let tick = Duration::from_millis(50);
    let session = fake_builder(&fake).watchdog_timeout(2).watchdog_tick(tick).open().unwrap();
    let seen = Seen::default();
    let fired_at = Arc::new(Mutex::new(None));

    let started = Instant::now();
    let fired = Arc::clone(&fired_at);
    let record = recorder(&seen);
    session.submit_lines(["echo partial", "hang"], 1, move |r| {
        *fired.lock().unwrap() = Some(started.elapsed());
        record(r);
    });
    session.submit_lines(["echo never"], 2, recorder(&seen));
    assert!(session.wait_for_idle(WAIT));
    thread::sleep(tick * 4);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (1, Outcome::WatchdogTimeout, vec!["partial".to_string()]),
            (2, Outcome::ShellDied, vec![]),
        ]
    );
    let elapsed = fired_at.lock().unwrap().unwrap();
    assert!(elapsed >= tick * 2, "fired after {elapsed:?}");
    assert!(elapsed < tick * 20, "fired after {elapsed:?}");
    assert_eq!(session.phase(), Phase::Closed);
    assert!(!session.is_running());
}

#[test]
fn watchdog_stays_quiet_for_fast_batches() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake)
        .watchdog_timeout(2)
        .watchdog_tick(Duration::from_millis(20))
        .open()
        .unwrap();
    let seen = Seen::default();
    for tag in 0..20 {
        session.submit_lines(["echo ok"], tag, recorder(&seen));
        thread::sleep(Duration::from_millis(5));
    }
    session.wait_for_idle(WAIT);
    thread::sleep(Duration::from_millis(100));
    assert!(session.is_running());
    session.close();
    assert!(seen.lock().unwrap().iter().all(|(_, outcome, _)| *outcome == Outcome::Exited(0)));
}

#[test]
fn watchdog_is_rearmed_for_every_batch() {
    let fake = FakeShell::new();
    let tick = Duration::from_millis(20);
    let session = fake_builder(&fake).watchdog_timeout(2).watchdog_tick(tick).open().unwrap();
    let seen = Seen::default();

    for tag in 0..30 {
        session.submit_lines(["echo ok"], tag, recorder(&seen));
    }
    assert!(session.wait_for_idle(WAIT));
    thread::sleep(tick * 5);
    assert!(session.is_running());

    session.submit_lines(["hang"], 30, recorder(&seen));
    assert!(session.wait_for_idle(WAIT));
    thread::sleep(tick * 4);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 31);
    assert!(seen[..30].iter().all(|(_, outcome, _)| *outcome == Outcome::Exited(0)));
    assert_eq!(seen[30].1, Outcome::WatchdogTimeout);
    assert_eq!(session.phase(), Phase::Closed);
}

struct CountingHandler {
    lines: AtomicUsize,
    result: Mutex<Option<(i32, Outcome)>>,
}

impl LineHandler for CountingHandler {
    fn on_line(&self, _line: &str) {
        self.lines.fetch_add(1, Ordering::SeqCst);
    }

    fn on_result(&self, tag: i32, outcome: Outcome) {
        *self.result.lock().unwrap() = Some((tag, outcome));
    }
}

#[test]
fn streaming_batches_are_never_buffered() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    let handler =
        Arc::new(CountingHandler { lines: AtomicUsize::new(0), result: Mutex::new(None) });

    session.submit_streaming(["spam 100000"], 3, handler.clone());
    let mut max_buffered = 0;
    while !session.is_idle() {
        max_buffered = max_buffered.max(session.buffered_lines());
        thread::sleep(Duration::from_millis(1));
    }
    session.wait_for_idle(WAIT);
    session.close();

    assert_eq!(max_buffered, 0);
    assert_eq!(handler.lines.load(Ordering::SeqCst), 100_000);
    assert_eq!(*handler.result.lock().unwrap(), Some((3, Outcome::Exited(0))));
}

#[test]
fn stderr_reaches_listeners_and_batches_only_when_wanted() {
    for want_stderr in [false, true] {
        let fake = FakeShell::new();
        let stdout_lines = Arc::new(Mutex::new(Vec::new()));
        let stderr_lines = Arc::new(Mutex::new(Vec::new()));
        let (out, err) = (Arc::clone(&stdout_lines), Arc::clone(&stderr_lines));
        let session = fake_builder(&fake)
            .want_stderr(want_stderr)
            .on_stdout_line(move |line| out.lock().unwrap().push(line.to_string()))
            .on_stderr_line(move |line| err.lock().unwrap().push(line.to_string()))
            .open()
            .unwrap();
        let seen = Seen::default();

        session.submit_lines(["echo out", "err oops"], 1, recorder(&seen));
        session.wait_for_idle(WAIT);
        session.close();

        let mut output = seen.lock().unwrap()[0].2.clone();
        output.sort();
        let expected: Vec<String> =
            if want_stderr { vec!["oops".into(), "out".into()] } else { vec!["out".into()] };
        assert_eq!(output, expected);
        assert_eq!(*stdout_lines.lock().unwrap(), vec!["out"]);
        assert_eq!(*stderr_lines.lock().unwrap(), vec!["oops"]);
    }
}

#[test]
fn shell_exit_reports_its_status_and_fails_queued_batches() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    let seen = Seen::default();

    session.submit_lines(["exit 4"], 0, recorder(&seen));
    for tag in 1..=3 {
        session.submit_lines(["echo unreachable"], tag, recorder(&seen));
    }
    assert!(session.wait_for_idle(WAIT));

    let outcomes: Vec<_> = seen.lock().unwrap().iter().map(|(t, o, _)| (*t, *o)).collect();
    let mut expected = vec![(0, Outcome::Exited(4))];
    expected.extend((1..=3).map(|t| (t, Outcome::ShellDied)));
    assert_eq!(outcomes, expected);
    assert!(!session.is_running());
    session.close();
    assert_eq!(session.phase(), Phase::Closed);
}

#[test]
fn kill_fails_running_and_queued_batches() {
    let fake = FakeShell::new();
    let session = fake_builder(&fake).open().unwrap();
    let seen = Seen::default();
    session.submit_lines(["hang"], 1, recorder(&seen));
    session.submit_lines(["echo next"], 2, recorder(&seen));

    session.kill();
    session.kill();
    assert!(session.wait_for_idle(WAIT));

    let outcomes: Vec<_> = seen.lock().unwrap().iter().map(|(t, o, _)| (*t, *o)).collect();
    assert_eq!(outcomes, vec![(1, Outcome::ShellDied), (2, Outcome::ShellDied)]);
    assert_eq!(session.phase(), Phase::Closed);
}

fn kill_on_thread(session: &Arc<Session>) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    let session = Arc::clone(session);
    thread::spawn(move || {
        session.kill();
        let _ = tx.send(());
    });
    rx
}

#[test]
fn kill_returns_when_the_shell_cannot_be_signalled() {
    let fake = FakeShell::new().refusing_kill();
    let session = Arc::new(fake_builder(&fake).open().unwrap());
    let seen = Seen::default();
    session.submit_lines(["hang"], 1, recorder(&seen));
    session.submit_lines(["echo next"], 2, recorder(&seen));

    let killed = kill_on_thread(&session);
    assert!(killed.recv_timeout(Duration::from_secs(3)).is_ok(), "kill blocked on the shell");
    assert_eq!(session.phase(), Phase::Closed);
    assert!(!session.is_running());
    assert!(session.is_idle());

    let outcomes: Vec<_> = seen.lock().unwrap().iter().map(|(t, o, _)| (*t, *o)).collect();
    assert_eq!(outcomes, vec![(1, Outcome::ShellDied), (2, Outcome::ShellDied)]);
}

#[test]
fn kill_closes_input_so_an_unsignalled_shell_still_exits() {
    let fake = FakeShell::new().refusing_kill();
    let session = Arc::new(fake_builder(&fake).open().unwrap());
    session.submit_lines(["echo ready"], 1, |_| {});
    assert!(session.wait_for_idle(WAIT));

    let killed = kill_on_thread(&session);
    assert!(killed.recv_timeout(Duration::from_secs(3)).is_ok(), "kill blocked on the shell");

    let deadline = Instant::now() + Duration::from_secs(3);
    while fake.stats().exits == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(fake.stats().exits, 1);
}

#[test]
fn kill_ends_a_close_stuck_on_a_shell_ignoring_exit() {
    let fake = FakeShell::new();
    let session = Arc::new(fake_builder(&fake).open().unwrap());
    session.submit_lines(["stubborn"], 1, |_| {});
    assert!(session.wait_for_idle(WAIT));

    let (tx, closed) = mpsc::channel();
    let closer = Arc::clone(&session);
    thread::spawn(move || {
        closer.close();
        let _ = tx.send(());
    });
    assert!(closed.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(session.phase(), Phase::Closing);

    session.kill();
    assert!(closed.recv_timeout(Duration::from_secs(3)).is_ok(), "close kept waiting after kill");
    assert_eq!(session.phase(), Phase::Closed);
}

#[test]
fn callbacks_may_submit_follow_up_batches() {
    let fake = FakeShell::new();
    let session = Arc::new(fake_builder(&fake).open().unwrap());
    let seen = Seen::default();

    let follow_up = Arc::clone(&session);
    let record = recorder(&seen);
    let record_second = recorder(&seen);
    session.submit_lines(["echo first"], 1, move |r| {
        record(r);
        follow_up.submit_lines(["echo second"], 2, record_second);
    });
    assert!(session.wait_for_idle(WAIT));
    assert!(session.wait_for_idle(WAIT));
    session.close();

    let tags: Vec<_> = seen.lock().unwrap().iter().map(|(t, _, _)| *t).collect();
    assert_eq!(tags, vec![1, 2]);
}

#[test]
fn thread_dispatcher_runs_callbacks_off_session_threads() {
    let fake = FakeShell::new();
    let dispatcher = Arc::new(ThreadDispatcher::spawn("sushell-callbacks").unwrap());
    let session = fake_builder(&fake).dispatcher(dispatcher).open().unwrap();
    let (tx, rx) = mpsc::channel();

    session.submit_lines(["echo hi"], 4, move |r| {
        let name = thread::current().name().map(String::from);
        tx.send((r.tag, r.output, name)).unwrap();
    });
    assert!(session.wait_for_idle(WAIT));
    session.close();

    let (tag, output, thread_name) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(tag, 4);
    assert_eq!(output, vec!["hi"]);
    assert_eq!(thread_name.as_deref(), Some("sushell-callbacks"));
}

#[tokio::test]
async fn tokio_dispatcher_delivers_on_the_runtime() {
    let fake = FakeShell::new();
    let dispatcher = Arc::new(TokioDispatcher::new(&tokio::runtime::Handle::current()));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let session = tokio::task::spawn_blocking(move || {
        let session = fake_builder(&fake).dispatcher(dispatcher).open().unwrap();
        session.submit_lines(["echo async"], 11, move |r| {
            tx.send((r.tag, r.outcome, r.output)).unwrap();
        });
        session
    })
    .await
    .unwrap();

    let result = rx.recv().await.unwrap();
    assert_eq!(result, (11, Outcome::Exited(0), vec!["async".to_string()]));
    tokio::task::spawn_blocking(move || session.close()).await.unwrap();
}

fn open_checked_outcome(builder: Builder) -> (Outcome, Vec<String>) {
    let (tx, rx) = mpsc::channel();
    let session = builder
        .open_checked(move |outcome, output| tx.send((outcome, output)).unwrap())
        .unwrap();
    let result = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    session.close();
    result
}

#[test]
fn open_checked_accepts_root_su() {
    let fake = FakeShell::new().with_uid(0);
    let (outcome, output) = open_checked_outcome(fake_builder(&fake).use_su());
    assert_eq!(outcome, Outcome::RUNNING);
    assert_eq!(output, vec!["-BOC-", "uid=0(fake) gid=0(fake)"]);
}

#[test]
fn open_checked_rejects_unprivileged_su() {
    let fake = FakeShell::new().with_uid(10_001);
    let (outcome, _) = open_checked_outcome(fake_builder(&fake).use_su());
    assert_eq!(outcome, Outcome::WrongPrivilege);
    assert_eq!(outcome.code(), -4);
}

#[test]
fn open_checked_does_not_require_root_for_sh() {
    let fake = FakeShell::new().with_uid(10_001);
    let (outcome, _) = open_checked_outcome(fake_builder(&fake).use_sh());
    assert_eq!(outcome, Outcome::RUNNING);
}

#[test]
fn open_checked_reports_a_helper_that_exits_as_died() {
    let fake = FakeShell::new().exiting_at_start(1);
    let (outcome, output) = open_checked_outcome(fake_builder(&fake).use_su());
    assert_eq!(outcome, Outcome::ShellDied);
    assert!(output.is_empty());
}

#[test]
fn open_checked_reports_spawn_failure() {
    let fake = FakeShell::new().refusing_spawn();
    let (tx, rx) = mpsc::channel();
    let result = fake_builder(&fake)
        .use_su()
        .open_checked(move |outcome, output| tx.send((outcome, output)).unwrap());

    assert!(result.is_err());
    let (outcome, output) = rx.try_recv().unwrap();
    assert_eq!(outcome, Outcome::SpawnFailed);
    assert_eq!(outcome.code(), -3);
    assert!(output.is_empty());
}

#[test]
fn prequeued_commands_run_before_later_submissions() {
    let fake = FakeShell::new();
    let seen = Seen::default();
    let session = fake_builder(&fake)
        .batch(Batch::new(["echo early"], 1).on_result(recorder(&seen)))
        .command(["echo discarded"])
        .open()
        .unwrap();
    session.submit_lines(["echo late"], 2, recorder(&seen));
    session.wait_for_idle(WAIT);
    session.close();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (1, Outcome::Exited(0), vec!["early".to_string()]),
            (2, Outcome::Exited(0), vec!["late".to_string()]),
        ]
    );
}

#[test]
fn real_sh_runs_batches_end_to_end() {
    let session = Builder::new().use_sh().open().unwrap();
    let seen = Seen::default();

    session.submit_lines(["echo hello"], 7, recorder(&seen));
    session.submit_lines(["exit 3"], 8, recorder(&seen));
    assert!(session.wait_for_idle(WAIT));
    session.close();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(7, Outcome::Exited(0), vec!["hello".to_string()]), (8, Outcome::Exited(3), vec![])]
    );
}

#[test]
fn real_sh_subshell_exit_keeps_the_session() {
    let session = Builder::new().use_sh().open().unwrap();
    let seen = Seen::default();

    session.submit_lines(["(exit 3)"], 1, recorder(&seen));
    session.submit_lines(["echo still here"], 2, recorder(&seen));
    assert!(session.wait_for_idle(WAIT));
    assert!(session.is_running());
    session.close();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, Outcome::Exited(3), vec![]), (2, Outcome::Exited(0), vec!["still here".to_string()])]
    );
}

#[test]
fn real_sh_exit_fails_later_batches() {
    let session = Builder::new().use_sh().open().unwrap();
    let seen = Seen::default();

    session.submit_lines(["exit 3"], 1, recorder(&seen));
    session.submit_lines(["echo gone"], 2, recorder(&seen));
    assert!(session.wait_for_idle(WAIT));
    assert!(!session.is_running());
    session.close();

    let outcomes: Vec<_> = seen.lock().unwrap().iter().map(|(t, o, _)| (*t, *o)).collect();
    assert_eq!(outcomes, vec![(1, Outcome::Exited(3)), (2, Outcome::ShellDied)]);
}

#[test]
fn real_sh_sees_environment_overrides() {
    let session = Builder::new().use_sh().env("SUSHELL_TEST_VALUE", "42").open().unwrap();
    let seen = Seen::default();
    session.submit_lines(["echo $SUSHELL_TEST_VALUE"], 1, recorder(&seen));
    session.wait_for_idle(WAIT);
    session.close();

    assert_eq!(seen.lock().unwrap()[0].2, vec!["42"]);
}

#[test]
fn missing_shell_fails_to_open() {
    let result = Builder::new().shell("/nonexistent/sushell-test-sh").open();
    assert!(matches!(result, Err(sushell::error::SpawnError::NotFound { .. })));
}
