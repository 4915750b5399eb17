//! Example: chat server.
//!
//! Every client first sends its name, then chat messages. Messages are
//! relayed to every other client; joins and leaves are announced.
//!
//! ```sh
//! cargo run --example chat_server -- --socket /tmp/sockman_chat.sock
//! ```

mod common;

use clap::Parser;
use log::{info, warn};
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
#[clap(name = "chat_server", about = "A sockman example: relays chat messages.")]
struct Args {
    /// Path of the server socket.
    #[clap(short, long, default_value = "/tmp/sockman_chat.sock")]
    socket: PathBuf,
}

struct Client {
    name: String,
    stream: UnixStream,
}

#[derive(Default)]
struct Room {
    clients: HashMap<RawFd, Client>,
}

impl Room {
    /// Sends `message` to every client except `from`.
    fn broadcast(&mut self, from: Option<RawFd>, message: &str) {
        for (fd, client) in self.clients.iter_mut() {
            if Some(*fd) == from {
                continue;
            }
            if let Err(err) = common::write_frame(&mut client.stream, message) {
                warn!("failed to send to {}: {err}", client.name);
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let args = Args::parse();

    let shutdown = Shutdown::new();
    shutdown.register_signal(SIGINT)?;

    let _ = std::fs::remove_file(&args.socket);
    let listener = UnixListener::bind(&args.socket)?;
    info!("listening on {}", args.socket.display());

    let room = Rc::new(RefCell::new(Room::default()));
    let mut manager = Manager::new()?;

    let lobby = Rc::clone(&room);
    manager.add(
        listener.as_raw_fd(),
        Interest::READABLE,
        move |registry, _, events| {
            if events.is_readable() {
                join(registry, &listener, &lobby);
            }
        },
    )?;

    manager.run(&shutdown, None)?;

    drop(manager);
    room.borrow_mut().clients.clear();
    let _ = std::fs::remove_file(&args.socket);

    info!("shutdown");
    Ok(())
}

fn join(registry: &mut Registry, listener: &UnixListener, room: &Rc<RefCell<Room>>) {
    let mut stream = match listener.accept() {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!("accept failed: {err}");
            return;
        }
    };

    let name = match common::read_frame(&mut stream) {
        Ok(Some(name)) if !name.is_empty() => name,
        Ok(_) => {
            warn!("client left before sending a name");
            return;
        }
        Err(err) => {
            warn!("failed to read client name: {err}");
            return;
        }
    };

    let fd = stream.as_raw_fd();
    let members = Rc::clone(room);
    if let Err(err) = registry.add(fd, Interest::READABLE, move |registry, fd, events| {
        relay(registry, &members, fd, events)
    }) {
        warn!("failed to watch {name}: {err}");
        return;
    }

    let mut room = room.borrow_mut();
    let info = format!("{name} has entered the chat");
    println!("{info}");
    room.broadcast(None, &info);

    let greeting = format!("Hi there, {name}");
    if let Err(err) = common::write_frame(&mut stream, &greeting) {
        warn!("failed to greet {name}: {err}");
    }

    room.clients.insert(fd, Client { name, stream });
}

fn relay(registry: &mut Registry, room: &Rc<RefCell<Room>>, fd: RawFd, events: Events) {
    let mut room = room.borrow_mut();
    let Some(client) = room.clients.get_mut(&fd) else {
        return;
    };

    let mut left = events.is_error();
    if !left && events.is_readable() {
        match common::read_frame(&mut client.stream) {
            Ok(Some(message)) if !message.is_empty() => {
                let full_message = format!("{}: {message}", client.name);
                println!("{full_message}");
                room.broadcast(Some(fd), &full_message);
            }
            Ok(Some(_)) => {}
            Ok(None) => left = true,
            Err(err) => {
                warn!("failed to read from {}: {err}", client.name);
                left = true;
            }
        }
    } else if events.is_hangup() {
        left = true;
    }

    if left {
        registry.remove(fd);
        if let Some(client) = room.clients.remove(&fd) {
            let info = format!("{} left the chat", client.name);
            println!("{info}");
            room.broadcast(None, &info);
        }
    }
}
