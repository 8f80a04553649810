//! mio event loop implementation.
//!
//! Readiness-based model: poll tells us when sockets are ready,
//! then we perform non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! One thread owns the listener, every connection and the chat state, so
//! the engine needs no locking. Sockets are registered edge-triggered:
//! a readable connection is drained until `WouldBlock` before moving on.

use crate::config::Config;
use crate::runtime::server::ChatServer;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKER_TOKEN: Token = Token(usize::MAX - 1);

/// Largest single read; never more than the connection's free buffer space.
const READ_CHUNK: usize = 4096;

/// Handle for stopping a running [`EventLoop`] from another thread or a
/// signal handler.
#[derive(Clone)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Shutdown {
    /// Ask the loop to stop and wake it if it is blocked in poll.
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Readiness collected for one connection during a poll round.
#[derive(Debug, Clone, Copy)]
struct Ready {
    id: usize,
    readable: bool,
    writable: bool,
}

/// The server's single-threaded reactor.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    local_addr: SocketAddr,
    server: ChatServer<TcpStream>,
    shutdown: Shutdown,
}

impl EventLoop {
    /// Bind the listening socket and set up the poller.
    pub fn bind(config: &Config) -> io::Result<Self> {
        let poll = Poll::new()?;
        let events = Events::with_capacity(config.event_capacity.max(1));

        let listener = create_listener(config.listen, config.backlog)?;
        let mut listener = TcpListener::from_std(listener);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let local_addr = listener.local_addr()?;

        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let shutdown = Shutdown {
            requested: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(waker),
        };

        let server = ChatServer::new(config.max_connections, config.max_rooms, config.max_members);

        info!(
            addr = %local_addr,
            max_connections = config.max_connections,
            max_rooms = config.max_rooms,
            max_members = config.max_members,
            "Listening"
        );

        Ok(Self {
            poll,
            events,
            listener,
            local_addr,
            server,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until shutdown is requested, then close every connection.
    pub fn run(mut self) -> io::Result<()> {
        let mut ready: Vec<Ready> = Vec::new();

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            match self.poll.poll(&mut self.events, None) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let mut accept = false;
            ready.clear();
            for event in self.events.iter() {
                match event.token() {
                    LISTENER_TOKEN => accept = true,
                    WAKER_TOKEN => {}
                    Token(id) => ready.push(Ready {
                        id,
                        // Closed and errored sockets are discovered by reading.
                        readable: event.is_readable() || event.is_read_closed() || event.is_error(),
                        writable: event.is_writable(),
                    }),
                }
            }

            if accept {
                self.accept_connections();
            }

            ready.sort_unstable_by_key(|r| r.id);
            ready.dedup_by(|later, earlier| {
                if later.id != earlier.id {
                    return false;
                }
                earlier.readable |= later.readable;
                earlier.writable |= later.writable;
                true
            });

            for r in &ready {
                self.handle_connection_event(*r);
            }
        }

        self.close();
        Ok(())
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let Some(id) = self.server.accept(stream, Some(peer)) else {
                        warn!(peer = %peer, "Connection limit reached, rejecting");
                        continue;
                    };

                    let registered = match self.server.connections_mut().get_mut(id) {
                        Some(conn) => self.poll.registry().register(
                            conn.stream_mut(),
                            Token(id),
                            Interest::READABLE | Interest::WRITABLE,
                        ),
                        None => continue,
                    };
                    if let Err(e) = registered {
                        error!(conn_id = id, peer = %peer, error = %e, "Failed to register");
                        self.server.disconnect(id);
                        continue;
                    }

                    debug!(
                        conn_id = id,
                        peer = %peer,
                        connections = self.server.connections().len(),
                        "Accepted connection"
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
    }

    fn handle_connection_event(&mut self, r: Ready) {
        if !self.server.connections().contains(r.id) {
            return;
        }

        if r.writable {
            if let Err(e) = self.server.flush(r.id) {
                debug!(conn_id = r.id, error = %e, "Write failed");
            }
        }

        if r.readable {
            if let Err(e) = self.drain_reads(r.id) {
                match e.kind() {
                    io::ErrorKind::UnexpectedEof => {
                        debug!(conn_id = r.id, "Peer closed connection");
                    }
                    io::ErrorKind::InvalidData => {
                        warn!(conn_id = r.id, error = %e, "Protocol error, closing connection");
                    }
                    _ => debug!(conn_id = r.id, error = %e, "Read failed"),
                }
                self.close_connection(r.id);
            }
        }
    }

    /// Read until the socket would block, feeding the engine as we go.
    fn drain_reads(&mut self, id: usize) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let Some(conn) = self.server.connections_mut().get_mut(id) else {
                return Ok(());
            };

            let space = conn.buffer.remaining().min(READ_CHUNK);
            if space == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "receive buffer full without a complete frame",
                ));
            }

            let n = match conn.stream_mut().read(&mut chunk[..space]) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            self.server
                .receive(id, &chunk[..n])
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
    }

    fn close_connection(&mut self, id: usize) {
        if let Some(mut stream) = self.server.disconnect(id) {
            let _ = self.poll.registry().deregister(&mut stream);
        }
    }

    fn close(mut self) {
        let streams = self.server.close_all();
        let count = streams.len();
        for mut stream in streams {
            let _ = self.poll.registry().deregister(&mut stream);
        }
        let _ = self.poll.registry().deregister(&mut self.listener);
        info!(connections = count, rooms = self.server.rooms().len(), "Server stopped");
    }
}

fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    use socket2::{Domain, Protocol, Socket, Type};

    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
