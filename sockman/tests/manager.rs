use sockman::{Condition, Error, Events, Interest, Manager, Serviced, Shutdown};

use std::cell::{Cell, RefCell};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Option<Duration> = Some(Duration::from_secs(5));
const POLL: Option<Duration> = Some(Duration::ZERO);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pair() -> (UnixStream, UnixStream) {
    UnixStream::pair().expect("Failed to create socket pair")
}

/// Returns `(read end, write end)` of a new pipe.
fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "Failed to create pipe");
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

/// Duplicates `fd` far above the descriptors other tests open, so the
/// number is not handed out again right after it is closed.
fn high_dup(fd: &impl AsRawFd) -> OwnedFd {
    let dup = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_DUPFD_CLOEXEC, 900) };
    assert!(dup >= 0, "Failed to duplicate descriptor");
    unsafe { OwnedFd::from_raw_fd(dup) }
}

/// Sends `signal` to the calling thread every 50ms until `done` is set.
///
/// Repeating covers a signal landing just before the thread blocks.
fn signal_current_thread(signal: libc::c_int, done: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    let target = unsafe { libc::pthread_self() } as usize;
    thread::spawn(move || {
        while !done.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(50));
            unsafe { libc::pthread_kill(target as libc::pthread_t, signal) };
        }
    })
}

/// Records every dispatch as `(fd, events)`.
fn recorder() -> (
    Rc<RefCell<Vec<(RawFd, Events)>>>,
    impl FnMut(&mut sockman::Registry, RawFd, Events) + 'static,
) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);
    (
        calls,
        move |_: &mut sockman::Registry, fd: RawFd, events: Events| {
            sink.borrow_mut().push((fd, events))
        },
    )
}

#[test]
fn test_create() {
    init_logging();
    let manager = Manager::new().expect("Failed to create manager");
    assert!(manager.is_empty());
}

#[test]
fn test_builder_options() {
    let manager = Manager::builder()
        .capacity(4)
        .close_on_exec(false)
        .build()
        .expect("Failed to create manager");
    assert_eq!(manager.len(), 0);
}

#[test]
fn test_add_socket() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();

    manager
        .add(a.as_raw_fd(), Interest::READABLE, |_, _, _| {})
        .expect("Failed to add socket");

    assert!(manager.contains(a.as_raw_fd()));
    assert_eq!(manager.interest(a.as_raw_fd()), Some(Interest::READABLE));
    assert_eq!(manager.len(), 1);
}

#[test]
fn test_add_fails_with_invalid_socket() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");

    let err = manager
        .add(-1, Interest::READABLE, |_, _, _| {})
        .expect_err("negative descriptor must be rejected");

    assert!(matches!(err, Error::InvalidDescriptor { fd: -1, .. }));
    assert!(manager.is_empty());
}

#[cfg(all(target_os = "linux", not(feature = "poll")))]
#[test]
fn test_add_fails_with_regular_file() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let file = std::fs::File::open(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"))
        .expect("Failed to open manifest");

    let err = manager
        .add(file.as_raw_fd(), Interest::READABLE, |_, _, _| {})
        .expect_err("epoll refuses regular files");

    assert!(matches!(err, Error::InvalidDescriptor { .. }));
    assert!(!manager.contains(file.as_raw_fd()));
}

#[test]
fn test_remove() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();

    manager
        .add(a.as_raw_fd(), Interest::READABLE, |_, _, _| {})
        .expect("Failed to add socket");
    manager.remove(a.as_raw_fd());

    assert!(!manager.contains(a.as_raw_fd()));
    assert!(manager.is_empty());
}

#[test]
fn test_remove_unknown_socket() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, b) = pair();

    manager
        .add(b.as_raw_fd(), Interest::empty(), |_, _, _| {})
        .expect("Failed to add socket");
    manager.remove(a.as_raw_fd());

    assert_eq!(manager.len(), 1);
    assert!(manager.contains(b.as_raw_fd()));
}

#[test]
fn test_callback_on_writable() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();
    let fd = a.as_raw_fd();
    let (calls, callback) = recorder();

    manager
        .add(fd, Interest::empty(), callback)
        .expect("Failed to add socket");
    manager
        .notify_on_writable(fd, true)
        .expect("Failed to enable writable");

    assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(fd));
    assert_eq!(*calls.borrow(), vec![(fd, Events::WRITABLE)]);
}

#[test]
fn test_callback_on_readable() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, mut b) = pair();
    let fd = a.as_raw_fd();
    let (calls, callback) = recorder();

    manager
        .add(fd, Interest::READABLE, callback)
        .expect("Failed to add socket");
    b.write_all(&[42]).expect("Failed to write");

    assert_eq!(manager.service(None).unwrap(), Serviced::Dispatched(fd));
    assert_eq!(*calls.borrow(), vec![(fd, Events::READABLE)]);
}

#[test]
fn test_callback_on_closed() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, b) = pair();
    let fd = a.as_raw_fd();
    let hangups = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hangups);

    manager
        .add(fd, Interest::empty(), move |registry, fd, events| {
            if events.is_hangup() {
                counter.set(counter.get() + 1);
                registry.remove(fd);
            }
        })
        .expect("Failed to add socket");
    drop(b);

    assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(fd));
    assert_eq!(hangups.get(), 1);

    assert_eq!(manager.service(POLL).unwrap(), Serviced::Idle);
    assert_eq!(hangups.get(), 1);
    assert!(manager.is_empty());
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[test]
fn test_callback_on_tcp_peer_close() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");
    let client = TcpStream::connect(addr).expect("Failed to connect");
    let (server, _) = listener.accept().expect("Failed to accept");
    let fd = server.as_raw_fd();
    let (calls, callback) = recorder();

    manager
        .add(fd, Interest::READABLE, callback)
        .expect("Failed to add socket");
    drop(client);

    assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(fd));

    let (called_fd, events) = calls.borrow()[0];
    assert_eq!(called_fd, fd);
    assert!(events.is_hangup());
    assert!(events.is_readable());
    assert!(!events.is_error());
    assert_eq!(events.condition(), Some(Condition::Hangup));
}

#[test]
fn test_callback_on_error() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (reader, writer) = pipe();
    let fd = writer.as_raw_fd();
    let (calls, callback) = recorder();

    // A pipe whose read end is gone reports an error on the write end.
    drop(reader);
    manager
        .add(fd, Interest::WRITABLE, callback)
        .expect("Failed to add pipe");

    assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(fd));

    let (_, events) = calls.borrow()[0];
    assert!(events.is_error());
    assert_eq!(events.condition(), Some(Condition::Error));
}

#[test]
fn test_service_polls_without_blocking() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();
    let (calls, callback) = recorder();

    manager
        .add(a.as_raw_fd(), Interest::READABLE, callback)
        .expect("Failed to add socket");

    let start = Instant::now();
    assert_eq!(manager.service(POLL).unwrap(), Serviced::Idle);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_service_times_out() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");

    let start = Instant::now();
    assert_eq!(
        manager.service(Some(Duration::from_millis(20))).unwrap(),
        Serviced::Idle
    );
    assert!(start.elapsed() >= Duration::from_millis(15));
}

#[test]
fn test_readd_replaces_callback() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, mut b) = pair();
    let fd = a.as_raw_fd();
    let (first, first_callback) = recorder();
    let (second, second_callback) = recorder();

    manager
        .add(fd, Interest::READABLE, first_callback)
        .expect("Failed to add socket");
    manager
        .add(fd, Interest::READABLE, second_callback)
        .expect("Failed to re-add socket");
    assert_eq!(manager.len(), 1);

    b.write_all(b"x").expect("Failed to write");
    for _ in 0..3 {
        assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(fd));
    }

    assert!(first.borrow().is_empty());
    assert_eq!(second.borrow().len(), 3);
}

#[test]
fn test_writable_toggle_restores_interest() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();
    let fd = a.as_raw_fd();

    manager
        .add(fd, Interest::READABLE, |_, _, _| {})
        .expect("Failed to add socket");

    manager.notify_on_writable(fd, true).unwrap();
    assert_eq!(
        manager.interest(fd),
        Some(Interest::READABLE | Interest::WRITABLE)
    );

    manager.notify_on_writable(fd, false).unwrap();
    assert_eq!(manager.interest(fd), Some(Interest::READABLE));

    // Writable interest is really gone: an idle socket reports nothing.
    assert_eq!(manager.service(POLL).unwrap(), Serviced::Idle);
}

#[test]
fn test_set_interest_unknown_socket() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();

    let err = manager
        .set_interest(a.as_raw_fd(), Interest::READABLE, true)
        .expect_err("unknown descriptor must be rejected");
    assert!(matches!(err, Error::NotRegistered(fd) if fd == a.as_raw_fd()));

    let err = manager
        .notify_on_writable(a.as_raw_fd(), false)
        .expect_err("unknown descriptor must be rejected");
    assert!(matches!(err, Error::NotRegistered(_)));
}

#[test]
fn test_unchanged_interest_skips_the_poller() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();
    let fd = a.as_raw_fd();

    manager
        .add(fd, Interest::READABLE, |_, _, _| {})
        .expect("Failed to add socket");
    drop(a);

    // Nothing changes, so the closed descriptor is never handed to the OS.
    manager.notify_on_readable(fd, true).unwrap();
    manager.notify_on_writable(fd, false).unwrap();
    assert_eq!(manager.interest(fd), Some(Interest::READABLE));

    manager.remove(fd);
}

#[test]
fn test_set_interest_on_closed_socket_fails() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();
    let dup = high_dup(&a);
    let fd = dup.as_raw_fd();

    manager
        .add(fd, Interest::READABLE, |_, _, _| {})
        .expect("Failed to add socket");
    drop(dup);

    let err = manager
        .notify_on_writable(fd, true)
        .expect_err("closed descriptor must fail");
    assert!(matches!(err, Error::Os { .. }));
    assert_eq!(manager.interest(fd), Some(Interest::READABLE));

    manager.remove(fd);
    assert!(manager.is_empty());
}

#[test]
fn test_untouched_socket_is_never_dispatched() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _pa) = pair();
    let (b, _pb) = pair();
    let (calls, callback) = recorder();
    let (untouched, untouched_callback) = recorder();

    manager
        .add(a.as_raw_fd(), Interest::empty(), callback)
        .expect("Failed to add socket");
    manager
        .add(b.as_raw_fd(), Interest::empty(), untouched_callback)
        .expect("Failed to add socket");
    manager.notify_on_writable(a.as_raw_fd(), true).unwrap();

    for _ in 0..5 {
        assert_eq!(
            manager.service(WAIT).unwrap(),
            Serviced::Dispatched(a.as_raw_fd())
        );
    }

    assert_eq!(calls.borrow().len(), 5);
    assert!(untouched.borrow().is_empty());
}

#[test]
fn test_ready_sockets_take_turns() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _pa) = pair();
    let (b, _pb) = pair();

    manager
        .add(a.as_raw_fd(), Interest::WRITABLE, |_, _, _| {})
        .expect("Failed to add socket");
    manager
        .add(b.as_raw_fd(), Interest::WRITABLE, |_, _, _| {})
        .expect("Failed to add socket");

    let mut seen = Vec::new();
    for _ in 0..4 {
        match manager.service(WAIT).unwrap() {
            Serviced::Dispatched(fd) => seen.push(fd),
            other => panic!("unexpected service result: {:?}", other),
        }
    }

    assert!(seen.contains(&a.as_raw_fd()));
    assert!(seen.contains(&b.as_raw_fd()));
}

#[test]
fn test_callback_can_mutate_registry() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, mut pa) = pair();
    let (b, _pb) = pair();
    let b_fd = b.as_raw_fd();
    let (calls, b_callback) = recorder();
    let mut b_callback = Some(b_callback);

    manager
        .add(a.as_raw_fd(), Interest::READABLE, move |registry, fd, _| {
            registry.remove(fd);
            if let Some(callback) = b_callback.take() {
                registry
                    .add(b_fd, Interest::WRITABLE, callback)
                    .expect("Failed to add socket from callback");
            }
        })
        .expect("Failed to add socket");

    pa.write_all(b"x").expect("Failed to write");
    assert_eq!(
        manager.service(WAIT).unwrap(),
        Serviced::Dispatched(a.as_raw_fd())
    );

    assert!(!manager.contains(a.as_raw_fd()));
    assert!(manager.contains(b_fd));

    assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(b_fd));
    assert_eq!(*calls.borrow(), vec![(b_fd, Events::WRITABLE)]);
}

#[test]
fn test_callback_can_replace_itself() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();
    let fd = a.as_raw_fd();
    let (calls, replacement) = recorder();
    let mut replacement = Some(replacement);
    let first_runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&first_runs);

    manager
        .add(fd, Interest::WRITABLE, move |registry, fd, _| {
            counter.set(counter.get() + 1);
            if let Some(callback) = replacement.take() {
                registry
                    .add(fd, Interest::WRITABLE, callback)
                    .expect("Failed to re-add socket");
            }
        })
        .expect("Failed to add socket");

    for _ in 0..3 {
        assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(fd));
    }

    assert_eq!(first_runs.get(), 1);
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn test_callback_can_toggle_own_interest() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, mut b) = pair();
    let fd = a.as_raw_fd();
    let mut reader = a.try_clone().expect("Failed to clone socket");

    manager
        .add(fd, Interest::WRITABLE, move |registry, fd, events| {
            if events.is_writable() {
                registry.notify_on_writable(fd, false).unwrap();
                registry.notify_on_readable(fd, true).unwrap();
            }
            if events.is_readable() {
                let mut buf = [0u8; 1];
                reader.read_exact(&mut buf).unwrap();
            }
        })
        .expect("Failed to add socket");

    assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(fd));
    assert_eq!(manager.interest(fd), Some(Interest::READABLE));
    assert_eq!(manager.service(POLL).unwrap(), Serviced::Idle);

    b.write_all(b"z").expect("Failed to write");
    assert_eq!(manager.service(WAIT).unwrap(), Serviced::Dispatched(fd));
    assert_eq!(manager.service(POLL).unwrap(), Serviced::Idle);
}

#[test]
fn test_drop_releases_callbacks() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _pa) = pair();
    let (b, _pb) = pair();
    let token = Rc::new(());

    for fd in [a.as_raw_fd(), b.as_raw_fd()] {
        let held = Rc::clone(&token);
        manager
            .add(fd, Interest::READABLE, move |_, _, _| {
                let _ = Rc::strong_count(&held);
            })
            .expect("Failed to add socket");
    }
    assert_eq!(Rc::strong_count(&token), 3);

    drop(manager);
    assert_eq!(Rc::strong_count(&token), 1);
}

#[test]
fn test_clear_removes_everything() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, b) = pair();

    for fd in [a.as_raw_fd(), b.as_raw_fd()] {
        manager
            .add(fd, Interest::WRITABLE, |_, _, _| {})
            .expect("Failed to add socket");
    }

    let mut fds: Vec<RawFd> = manager.registry().descriptors().collect();
    fds.sort();
    let mut expected = vec![a.as_raw_fd(), b.as_raw_fd()];
    expected.sort();
    assert_eq!(fds, expected);

    manager.registry_mut().clear();
    assert!(manager.is_empty());
    assert_eq!(manager.service(POLL).unwrap(), Serviced::Idle);
}

#[test]
fn test_run_until_shutdown() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();
    let shutdown = Shutdown::new();
    let stopper = shutdown.clone();
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);

    manager
        .add(a.as_raw_fd(), Interest::WRITABLE, move |_, _, _| {
            counter.set(counter.get() + 1);
            if counter.get() == 3 {
                stopper.request();
            }
        })
        .expect("Failed to add socket");

    manager
        .run(&shutdown, Some(Duration::from_millis(100)))
        .expect("Event loop failed");

    assert_eq!(runs.get(), 3);
}

#[test]
fn test_run_returns_immediately_when_already_requested() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let shutdown = Shutdown::new();
    shutdown.request();

    manager.run(&shutdown, None).expect("Event loop failed");
}

#[test]
fn test_signal_interrupts_service() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let shutdown = Shutdown::new();
    shutdown
        .register_signal(libc::SIGUSR1)
        .expect("Failed to register signal");

    let done = Arc::new(AtomicBool::new(false));
    let sender = signal_current_thread(libc::SIGUSR1, Arc::clone(&done));

    let serviced = manager.service(None).expect("Wait failed");
    done.store(true, Ordering::Release);
    sender.join().expect("Signal thread panicked");

    assert_eq!(serviced, Serviced::Interrupted);
    assert!(shutdown.is_requested());
}

#[test]
fn test_run_stops_on_signal() {
    init_logging();
    let mut manager = Manager::new().expect("Failed to create manager");
    let (a, _b) = pair();
    let shutdown = Shutdown::new();
    shutdown
        .register_signal(libc::SIGUSR2)
        .expect("Failed to register signal");

    manager
        .add(a.as_raw_fd(), Interest::READABLE, |_, _, _| {})
        .expect("Failed to add socket");

    let done = Arc::new(AtomicBool::new(false));
    let sender = signal_current_thread(libc::SIGUSR2, Arc::clone(&done));

    let result = manager.run(&shutdown, None);
    done.store(true, Ordering::Release);
    sender.join().expect("Signal thread panicked");

    result.expect("Event loop failed");
    assert!(shutdown.is_requested());
}
