//! Socket plumbing around the engine: the switch-facing listener, the
//! per-slice controller dialer, message framing, and the xid sweeper.
//!
//! Each connection gets a reader task and a writer task; every parsed
//! frame funnels into one channel drained by `FlowVisorFuture`, which
//! locks the engine, dispatches, and routes the resulting emissions back
//! out through the per-connection writers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::BytesMut;
use futures::sync::mpsc;
use futures::sync::mpsc::{Receiver, Sender};
use tokio;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::prelude::*;
use tokio::timer::Interval;

use flowvisor::engine::{Emission, Engine};
use flowvisor::message::{Message, Pattern};
use flowvisor::ofp_header::OfpHeader;
use flowvisor::ofp_message::{OfpMessage, OfpSerializationError};
use flowvisor::slice::SliceId;
use flowvisor::topology::{DatapathId, Topology};
use flowvisor::xid::SWEEP_INTERVAL;

const EVENTS_CHANNEL_BUFFER: usize = 1000;
const WRITER_CHANNEL_BUFFER: usize = 1000;
const EVENTS_PER_TICK: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

#[derive(Debug, Clone, Copy)]
enum Role {
    /// A physical switch; the dpid arrives with its features reply.
    Switch(Option<DatapathId>),
    /// The controller session of one slice.
    Controller(SliceId),
}

enum SessionEvent {
    /// A whole frame (header included) read from a connection.
    Frame(ConnectionId, Vec<u8>),
    Closed(ConnectionId),
    Sweep,
}

struct SessionState {
    role: Role,
    writer: Sender<Vec<u8>>,
}

struct Sessions {
    next_id: u64,
    conns: HashMap<ConnectionId, SessionState>,
}

impl Sessions {
    fn new() -> Sessions {
        Sessions {
            next_id: 1,
            conns: HashMap::new(),
        }
    }

    fn register(&mut self, role: Role, writer: Sender<Vec<u8>>) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.conns.insert(id, SessionState { role, writer });
        id
    }

    fn role(&self, conn: ConnectionId) -> Option<Role> {
        self.conns.get(&conn).map(|s| s.role)
    }

    fn set_dpid(&mut self, conn: ConnectionId, dpid: DatapathId) {
        if let Some(state) = self.conns.get_mut(&conn) {
            state.role = Role::Switch(Some(dpid));
        }
    }

    fn writer(&self, conn: ConnectionId) -> Option<Sender<Vec<u8>>> {
        self.conns.get(&conn).map(|s| s.writer.clone())
    }

    fn remove(&mut self, conn: ConnectionId) -> Option<Role> {
        self.conns.remove(&conn).map(|s| s.role)
    }

    fn switch_writer(&self, dpid: DatapathId) -> Option<Sender<Vec<u8>>> {
        self.conns
            .values()
            .find(|s| match s.role {
                Role::Switch(Some(d)) => d == dpid,
                _ => false,
            })
            .map(|s| s.writer.clone())
    }

    fn controller_writer(&self, slice: SliceId) -> Option<Sender<Vec<u8>>> {
        self.conns
            .values()
            .find(|s| match s.role {
                Role::Controller(s) => s == slice,
                _ => false,
            })
            .map(|s| s.writer.clone())
    }
}

/// The proxy: engine state behind one mutex, plus the session table.
pub struct FlowVisor {
    engine: Mutex<Engine>,
    sessions: Mutex<Sessions>,
    event_tx: Sender<SessionEvent>,
    event_rx: Mutex<Receiver<SessionEvent>>,
}

impl FlowVisor {
    pub fn new(topology: Box<Topology + Send>) -> Arc<FlowVisor> {
        let (tx, rx) = mpsc::channel(EVENTS_CHANNEL_BUFFER);
        Arc::new(FlowVisor {
            engine: Mutex::new(Engine::new(topology)),
            sessions: Mutex::new(Sessions::new()),
            event_tx: tx,
            event_rx: Mutex::new(rx),
        })
    }

    /// Spawn the event pump and the xid sweeper. Must run inside a tokio
    /// runtime.
    pub fn start(fv: &Arc<FlowVisor>) {
        tokio::spawn(FlowVisorFuture { fv: fv.clone() });

        let mut tx = fv.event_tx.clone();
        let sweeper = Interval::new(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL)
            .for_each(move |_instant| {
                let _ = tx.try_send(SessionEvent::Sweep);
                Ok(())
            })
            .map_err(|e| panic!("sweeper interval errored; err={:?}", e));
        tokio::spawn(sweeper);
    }

    /// Accept physical switches on `addr`.
    pub fn listen(fv: &Arc<FlowVisor>, addr: &SocketAddr) -> ::std::io::Result<()> {
        let listener = TcpListener::bind(addr)?;
        info!("listening for switches on {}", addr);
        let fv = fv.clone();
        let server = listener
            .incoming()
            .for_each(move |socket| {
                FlowVisor::register(&fv, socket, Role::Switch(None));
                Ok(())
            })
            .map_err(|e| error!("switch accept error: {}", e));
        tokio::spawn(server);
        Ok(())
    }

    /// Register a slice and dial its controller. The connection presents
    /// the virtual switch with the given datapath id.
    pub fn add_slice(
        fv: &Arc<FlowVisor>,
        filter: Pattern,
        controller: SocketAddr,
        dpid: DatapathId,
    ) -> SliceId {
        let slice = fv.engine.lock().unwrap().add_slice(filter, dpid);
        let fv = fv.clone();
        let task = TcpStream::connect(&controller)
            .map(move |socket| {
                info!("{} connected to controller {}", slice, controller);
                FlowVisor::register(&fv, socket, Role::Controller(slice));
            })
            .map_err(move |e| error!("connecting controller {}: {}", controller, e));
        tokio::spawn(task);
        slice
    }

    pub fn remove_slice(fv: &Arc<FlowVisor>, slice: SliceId) {
        fv.engine.lock().unwrap().controller_leave(slice);
    }

    /// Wire a fresh connection: split the stream, start its writer and
    /// reader tasks, say hello.
    fn register(fv: &Arc<FlowVisor>, socket: TcpStream, role: Role) {
        let (rd, wr) = socket.split();
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_CHANNEL_BUFFER);
        let conn = fv.sessions.lock().unwrap().register(role, writer_tx.clone());

        spawn_writer(wr, writer_rx);
        spawn_reader(fv.event_tx.clone(), conn, rd);

        // both sides of an OpenFlow connection open with a hello
        if let Ok(frame) = <Message as OfpMessage>::marshal(0, Message::Hello) {
            let _ = writer_tx.clone().try_send(frame);
        }
    }

    fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Frame(conn, frame) => self.handle_frame(conn, frame),
            SessionEvent::Closed(conn) => self.handle_closed(conn),
            SessionEvent::Sweep => {
                let emissions = self.engine.lock().unwrap().sweep_xids(Instant::now());
                self.dispatch(emissions);
            }
        }
    }

    fn handle_frame(&self, conn: ConnectionId, frame: Vec<u8>) {
        let role = match self.sessions.lock().unwrap().role(conn) {
            Some(role) => role,
            None => return,
        };
        let header = OfpHeader::parse(&frame[..OfpHeader::size()]);
        let xid = header.xid();
        let parsed = <Message as OfpMessage>::parse(&header, &frame[OfpHeader::size()..])
            .map(|(_, msg)| msg);

        let emissions = match role {
            Role::Switch(None) => self.handshake(conn, xid, parsed),
            Role::Switch(Some(dpid)) => match parsed {
                Ok(msg) => self.engine.lock().unwrap().switch_message(dpid, xid, msg),
                Err(err) => {
                    warn!("undecodable frame from datapath {:#x}: {}", dpid, err);
                    vec![]
                }
            },
            Role::Controller(slice) => match parsed {
                Ok(msg) => self
                    .engine
                    .lock()
                    .unwrap()
                    .controller_message(slice, xid, msg, &frame),
                Err(ref err) if err.is_unknown_type() => self
                    .engine
                    .lock()
                    .unwrap()
                    .controller_bad_type(slice, xid, &frame),
                Err(err) => {
                    warn!("undecodable frame from {}: {}", slice, err);
                    vec![]
                }
            },
        };
        self.dispatch(emissions);
    }

    /// The switch-side handshake: our hello went out at registration; the
    /// peer's hello triggers a features request, and the features reply
    /// promotes the connection to a known datapath.
    fn handshake(
        &self,
        conn: ConnectionId,
        xid: u32,
        parsed: Result<Message, OfpSerializationError>,
    ) -> Vec<Emission> {
        match parsed {
            Ok(Message::Hello) => {
                if let Ok(frame) = <Message as OfpMessage>::marshal(xid, Message::FeaturesReq) {
                    self.send_to_conn(conn, frame);
                }
                vec![]
            }
            Ok(Message::FeaturesReply(features)) => {
                let dpid = features.datapath_id;
                self.sessions.lock().unwrap().set_dpid(conn, dpid);
                self.engine.lock().unwrap().switch_joined(dpid, features)
            }
            Ok(Message::EchoRequest(bytes)) => {
                if let Ok(frame) =
                    <Message as OfpMessage>::marshal(xid, Message::EchoReply(bytes))
                {
                    self.send_to_conn(conn, frame);
                }
                vec![]
            }
            Ok(other) => {
                debug!("ignoring {:?} before the features reply", other);
                vec![]
            }
            Err(err) => {
                warn!("undecodable frame during handshake: {}", err);
                vec![]
            }
        }
    }

    fn handle_closed(&self, conn: ConnectionId) {
        let role = match self.sessions.lock().unwrap().remove(conn) {
            Some(role) => role,
            None => return,
        };
        match role {
            Role::Switch(Some(dpid)) => {
                let emissions = self.engine.lock().unwrap().switch_left(dpid);
                self.dispatch(emissions);
            }
            Role::Switch(None) => {}
            Role::Controller(slice) => {
                info!("controller session of {} closed", slice);
                self.engine.lock().unwrap().controller_leave(slice);
            }
        }
    }

    /// Send each emission through the writer of its destination session.
    /// Messages for sessions that are already gone are dropped.
    fn dispatch(&self, emissions: Vec<Emission>) {
        for emission in emissions {
            let (writer, xid, msg) = {
                let sessions = self.sessions.lock().unwrap();
                match emission {
                    Emission::Switch(dpid, xid, msg) => (sessions.switch_writer(dpid), xid, msg),
                    Emission::Controller(slice, xid, msg) => {
                        (sessions.controller_writer(slice), xid, msg)
                    }
                }
            };
            let mut writer = match writer {
                Some(writer) => writer,
                None => continue,
            };
            match <Message as OfpMessage>::marshal(xid, msg) {
                Ok(frame) => {
                    if writer.try_send(frame).is_err() {
                        warn!("writer backlog full, dropping frame");
                    }
                }
                Err(err) => error!("failed to marshal outbound message: {}", err),
            }
        }
    }

    fn send_to_conn(&self, conn: ConnectionId, frame: Vec<u8>) {
        if let Some(mut writer) = self.sessions.lock().unwrap().writer(conn) {
            let _ = writer.try_send(frame);
        }
    }
}

/// Drains the shared event channel, a bounded batch per poll.
pub struct FlowVisorFuture {
    fv: Arc<FlowVisor>,
}

impl FlowVisorFuture {
    pub fn new(fv: Arc<FlowVisor>) -> FlowVisorFuture {
        FlowVisorFuture { fv }
    }
}

impl Future for FlowVisorFuture {
    type Item = ();
    type Error = ();

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        for _ in 0..EVENTS_PER_TICK {
            let event = {
                let mut rx = self.fv.event_rx.lock().unwrap();
                match try_ready!(rx.poll()) {
                    Some(event) => event,
                    None => return Ok(Async::Ready(())),
                }
            };
            self.fv.handle_event(event);
        }
        // more events may be queued; make sure we are rescheduled
        task::current().notify();
        Ok(Async::NotReady)
    }
}

fn spawn_writer(wr: WriteHalf<TcpStream>, rx: Receiver<Vec<u8>>) {
    let task = rx
        .map_err(|_| ::std::io::Error::new(::std::io::ErrorKind::Other, "writer channel dropped"))
        .fold(wr, |wr, frame: Vec<u8>| {
            tokio::io::write_all(wr, frame).map(|(wr, _)| wr)
        })
        .map(|_| ())
        .map_err(|e| debug!("writer finished: {}", e));
    tokio::spawn(task);
}

fn spawn_reader(event_tx: Sender<SessionEvent>, conn: ConnectionId, rd: ReadHalf<TcpStream>) {
    let mut frame_tx = event_tx.clone();
    let mut closed_tx = event_tx;
    let task = OfpMessageReader::new(rd)
        .map_err(move |e| debug!("read error on connection: {}", e))
        .for_each(move |frame| {
            if frame_tx.try_send(SessionEvent::Frame(conn, frame)).is_err() {
                warn!("event backlog full, dropping inbound frame");
            }
            Ok(())
        })
        .then(move |_result: Result<(), ()>| {
            let _ = closed_tx.try_send(SessionEvent::Closed(conn));
            Ok::<(), ()>(())
        });
    tokio::spawn(task);
}

/// Reassembles length-prefixed OpenFlow frames from a socket. Yields each
/// whole frame, header bytes included, so that error replies can quote the
/// original message.
struct OfpMessageReader {
    socket: ReadHalf<TcpStream>,
    rd: BytesMut,
}

impl OfpMessageReader {
    fn new(socket: ReadHalf<TcpStream>) -> OfpMessageReader {
        OfpMessageReader {
            socket,
            rd: BytesMut::new(),
        }
    }

    fn header_length(&self) -> usize {
        let len_1 = self.rd[2] as usize;
        let len_2 = self.rd[3] as usize;
        (len_1 << 8) + len_2
    }

    fn have_full_message(&self) -> bool {
        self.rd.len() >= OfpHeader::size() && self.rd.len() >= self.header_length()
    }

    fn take_message(&mut self) -> Vec<u8> {
        let length = self.header_length();
        self.rd.split_to(length).to_vec()
    }
}

impl Stream for OfpMessageReader {
    type Item = Vec<u8>;
    type Error = ::std::io::Error;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        loop {
            if self.rd.len() >= OfpHeader::size() && self.header_length() < OfpHeader::size() {
                // a length below the header size can never resynchronize
                return Err(::std::io::Error::new(
                    ::std::io::ErrorKind::InvalidData,
                    "frame length below header size",
                ));
            }
            if self.have_full_message() {
                return Ok(Async::Ready(Some(self.take_message())));
            }
            self.rd.reserve(4096);
            let n = try_ready!(self.socket.read_buf(&mut self.rd));
            if n == 0 {
                return Ok(Async::Ready(None));
            }
        }
    }
}
