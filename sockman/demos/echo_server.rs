//! Example: echo server over a Unix socket.
//!
//! Every frame a client sends is written straight back to it.
//!
//! ```sh
//! cargo run --example echo_server -- --socket /tmp/sockman_echo.sock
//! ```

mod common;

use clap::Parser;
use log::{debug, info, warn};
use signal_hook::consts::SIGINT;
use sockman::{Events, Interest, Manager, Registry, Shutdown};

use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser)]
#[clap(name = "echo_server", about = "A sockman example: echoes every message back.")]
struct Args {
    /// Path of the server socket.
    #[clap(short, long, default_value = "/tmp/sockman_echo.sock")]
    socket: PathBuf,
}

type Clients = Rc<RefCell<HashMap<RawFd, UnixStream>>>;

fn main() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let args = Args::parse();

    let shutdown = Shutdown::new();
    shutdown.register_signal(SIGINT)?;

    let _ = std::fs::remove_file(&args.socket);
    let listener = UnixListener::bind(&args.socket)?;
    info!("listening on {}", args.socket.display());

    let clients: Clients = Rc::default();
    let mut manager = Manager::new()?;

    let accepted = Rc::clone(&clients);
    manager.add(
        listener.as_raw_fd(),
        Interest::READABLE,
        move |registry, _, events| {
            if events.is_readable() {
                accept(registry, &listener, &accepted);
            }
        },
    )?;

    manager.run(&shutdown, None)?;

    // Deregister before the client sockets close.
    drop(manager);
    clients.borrow_mut().clear();
    let _ = std::fs::remove_file(&args.socket);

    info!("shutdown");
    Ok(())
}

fn accept(registry: &mut Registry, listener: &UnixListener, clients: &Clients) {
    let stream = match listener.accept() {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!("accept failed: {err}");
            return;
        }
    };

    let fd = stream.as_raw_fd();
    let connections = Rc::clone(clients);

    let added = registry.add(fd, Interest::READABLE, move |registry, fd, events| {
        echo(registry, &connections, fd, events)
    });

    match added {
        Ok(()) => {
            clients.borrow_mut().insert(fd, stream);
            info!("client {fd} connected");
        }
        Err(err) => warn!("failed to watch client {fd}: {err}"),
    }
}

fn echo(registry: &mut Registry, clients: &Clients, fd: RawFd, events: Events) {
    let mut clients = clients.borrow_mut();
    let Some(stream) = clients.get_mut(&fd) else {
        return;
    };

    let closed = if events.is_readable() {
        match common::read_frame(stream) {
            Ok(Some(message)) => {
                debug!("client {fd}: {message}");
                common::write_frame(stream, &message).is_err()
            }
            Ok(None) => true,
            Err(err) => {
                warn!("client {fd}: {err}");
                true
            }
        }
    } else {
        events.is_hangup() || events.is_error()
    };

    if closed {
        registry.remove(fd);
        clients.remove(&fd);
        info!("client {fd} disconnected");
    }
}
