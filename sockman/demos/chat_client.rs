//! Example: chat client.
//!
//! Joins the room under a name, prints everything the server relays and
//! sends every line typed on stdin. Type `exit` or `quit` to leave.
//!
//! ```sh
//! cargo run --example chat_client -- --name alice
//! ```

mod common;

use clap::Parser;
use log::warn;
use signal_hook::consts::SIGINT;
use sockman::{Interest, Manager, Shutdown};

use std::cell::RefCell;
use std::error::Error;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::rc::Rc;

/// Longest line a user may type.
const MAX_MESSAGE_SIZE: usize = 80;

#[derive(Parser)]
#[clap(name = "chat_client", about = "A sockman example: joins a chat_server room.")]
struct Args {
    /// Name shown to the other participants.
    #[clap(short, long, default_value = "anonymous")]
    name: String,

    /// Path of the server socket.
    #[clap(short, long, default_value = "/tmp/sockman_chat.sock")]
    socket: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    common::init_logging();
    let args = Args::parse();

    let shutdown = Shutdown::new();
    shutdown.register_signal(SIGINT)?;

    let mut stream = UnixStream::connect(&args.socket)?;
    common::write_frame(&mut stream, &args.name)?;

    let fd = stream.as_raw_fd();
    let stream = Rc::new(RefCell::new(stream));
    let mut manager = Manager::new()?;

    let incoming = Rc::clone(&stream);
    let stop = shutdown.clone();
    manager.add(fd, Interest::READABLE, move |_, _, events| {
        if events.is_readable() {
            match common::read_frame(&mut *incoming.borrow_mut()) {
                Ok(Some(message)) => println!("{message}"),
                Ok(None) => {
                    eprintln!("error: connection closed by remote");
                    stop.request();
                }
                Err(err) => {
                    warn!("failed to read message: {err}");
                    stop.request();
                }
            }
        } else if events.is_hangup() || events.is_error() {
            eprintln!("error: connection closed by remote");
            stop.request();
        }
    })?;

    let mut stdin = common::stdin_lines()?;
    let outgoing = Rc::clone(&stream);
    let stop = shutdown.clone();
    manager.add(stdin.as_raw_fd(), Interest::READABLE, move |_, _, _| {
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

            if line.len() > MAX_MESSAGE_SIZE {
                eprintln!("error: message too long");
                continue;
            }

            if let Err(err) = common::write_frame(&mut *outgoing.borrow_mut(), &line) {
                warn!("failed to send message: {err}");
                return stop.request();
            }
        }
    })?;

    manager.run(&shutdown, None)?;

    println!("shutdown");
    Ok(())
}
