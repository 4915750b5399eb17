//! Example: echo client.
//!
//! Sends every line typed on stdin to the echo server and prints what
//! comes back. Outgoing lines are queued and flushed once the socket
//! reports writable; writable interest is only enabled while the queue
//! is non-empty.
//!
//! ```sh
//! cargo run --example echo_client -- /tmp/sockman_echo.sock
//! ```

mod common;

use clap::Parser;
use log::warn;
use signal_hook::consts::SIGINT;
use sockman::{Handler, Interest, Manager, Registry, Shutdown};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::error::Error;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser)]
#[clap(name = "echo_client", about = "A sockman example: talks to echo_server.")]
struct Args {
    /// Path of the server socket.
    #[clap(default_value = "/tmp/sockman_echo.sock")]
    socket: PathBuf,
}

struct Connection {
    stream: UnixStream,
    pending: VecDeque<String>,
    shutdown: Shutdown,
}

impl Connection {
    /// Queues `line` and asks to be told when it can be written.
    fn request_write(&mut self, registry: &mut Registry, line: String) -> sockman::Result<()> {
        self.pending.push_back(line);
        registry.notify_on_writable(self.stream.as_raw_fd(), true)
    }

    fn on_closed(&mut self) {
        eprintln!("error: connection closed by remote");
        self.shutdown.request();
    }
}

impl Handler for Connection {
    fn on_readable(&mut self, _registry: &mut Registry, _fd: RawFd) {
        match common::read_frame(&mut self.stream) {
            Ok(Some(message)) => println!("{message}"),
            Ok(None) => self.on_closed(),
            Err(err) => {
                warn!("read failed: {err}");
                self.shutdown.request();
            }
        }
    }

    fn on_writable(&mut self, registry: &mut Registry, fd: RawFd) {
        while let Some(line) = self.pending.pop_front() {
            if let Err(err) = common::write_frame(&mut self.stream, &line) {
                warn!("write failed: {err}");
                if err.kind() != io::ErrorKind::InvalidInput {
                    self.shutdown.request();
                    return;
                }
            }
        }

        if let Err(err) = registry.notify_on_writable(fd, false) {
            warn!("{err}");
            self.shutdown.request();
        }
    }

    fn on_hungup(&mut self, _registry: &mut Registry, _fd: RawFd) {
        self.on_closed();
    }

    fn on_error(&mut self, _registry: &mut Registry, _fd: RawFd) {
        self.on_closed();
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let args = Args::parse();

    let shutdown = Shutdown::new();
    shutdown.register_signal(SIGINT)?;

    let stream = UnixStream::connect(&args.socket)?;
    let fd = stream.as_raw_fd();

    let connection = Rc::new(RefCell::new(Connection {
        stream,
        pending: VecDeque::new(),
        shutdown: shutdown.clone(),
    }));

    let mut manager = Manager::new()?;
    manager.add_handler(fd, Interest::READABLE, Rc::clone(&connection))?;

    let mut stdin = common::stdin_lines()?;
    let input = Rc::clone(&connection);
    let stop = shutdown.clone();
    manager.add(
        stdin.as_raw_fd(),
        Interest::READABLE,
        move |registry, _, _| {
            let lines = match stdin.read_lines() {
                Ok(Some(lines)) => lines,
                Ok(None) => return stop.request(),
                Err(err) => {
                    warn!("failed to read stdin: {err}");
                    return stop.request();
                }
            };

            for line in lines {
                if line == "exit" || line == "quit" {
                    return stop.request();
                }
                if let Err(err) = input.borrow_mut().request_write(registry, line) {
                    warn!("{err}");
                    return stop.request();
                }
            }
        },
    )?;

    manager.run(&shutdown, None)?;

    println!("shutdown");
    Ok(())
}
