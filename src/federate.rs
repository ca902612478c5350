/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief State owned by a federate participating in a federated execution.
 *
 * The process-global state of the original design (federate id, socket
 * arrays, time-advance flags) is owned here by a single FederateRuntime
 * value. Listener threads borrow it through an Arc handle.
 */
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::error::FederateError;
use crate::scheduler::Scheduler;
use crate::tag::{Instant, FOREVER, NEVER};

/**
 * The identity a federate presents during handshakes: its ID within the
 * federation and the federation ID. Immutable after construction.
 */
#[derive(Clone, Debug)]
pub struct FederateIdentity {
    fed_id: u16,
    federation_id: String,
}

impl FederateIdentity {
    pub fn new(fed_id: u16, federation_id: String) -> Result<FederateIdentity, FederateError> {
        // The federation ID length must fit in the one-byte length field
        // of the FED_ID and P2P_SENDING_FED_ID frames.
        if federation_id.len() > 255 {
            return Err(FederateError::Protocol(format!(
                "federation ID of {} bytes does not fit in one byte",
                federation_id.len()
            )));
        }
        Ok(FederateIdentity {
            fed_id,
            federation_id,
        })
    }

    pub fn fed_id(&self) -> u16 {
        self.fed_id
    }

    pub fn federation_id(&self) -> &str {
        &self.federation_id
    }
}

/**
 * Time-coordination state shared between the main (scheduler) thread
 * and the listener threads, guarded by the runtime's single mutex.
 * The write half of the RTI stream lives here so that every write to
 * the RTI happens under that mutex.
 */
pub struct TimeState {
    rti_stream: Option<TcpStream>, // Write half of the RTI connection.
    start_time: Instant,           // Coordinated start time of the federation.
    current_logical_time: Instant, // Advanced by the local scheduler.
    stop_time: Instant,            // start_time + duration, or FOREVER.
    physical_start_time: Instant,  // Physical time when execution began.
    granted_tag: Instant,          // The largest TAG received (or NEVER if none received).
    tag_pending: bool,             // A NET has been sent and no TAG has arrived since.
    stop_requested: bool,          // Monotone false -> true.
    has_upstream: bool,            // Whether any federate sends to this one via the RTI.
    has_downstream: bool,          // Whether this federate sends to any other via the RTI.
}

impl TimeState {
    pub fn new(has_upstream: bool, has_downstream: bool) -> TimeState {
        TimeState {
            rti_stream: None,
            start_time: NEVER,
            current_logical_time: NEVER,
            stop_time: FOREVER,
            physical_start_time: NEVER,
            granted_tag: NEVER,
            tag_pending: false,
            stop_requested: false,
            has_upstream,
            has_downstream,
        }
    }

    pub fn rti_stream(&self) -> &Option<TcpStream> {
        &self.rti_stream
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn current_logical_time(&self) -> Instant {
        self.current_logical_time
    }

    pub fn stop_time(&self) -> Instant {
        self.stop_time
    }

    pub fn physical_start_time(&self) -> Instant {
        self.physical_start_time
    }

    pub fn granted_tag(&self) -> Instant {
        self.granted_tag
    }

    pub fn tag_pending(&self) -> bool {
        self.tag_pending
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn has_upstream(&self) -> bool {
        self.has_upstream
    }

    pub fn has_downstream(&self) -> bool {
        self.has_downstream
    }

    pub fn set_rti_stream(&mut self, rti_stream: TcpStream) {
        self.rti_stream = Some(rti_stream);
    }

    pub fn set_start_time(&mut self, start_time: Instant) {
        self.start_time = start_time;
    }

    pub fn set_current_logical_time(&mut self, current_logical_time: Instant) {
        self.current_logical_time = current_logical_time;
    }

    pub fn set_stop_time(&mut self, stop_time: Instant) {
        self.stop_time = stop_time;
    }

    pub fn set_physical_start_time(&mut self, physical_start_time: Instant) {
        self.physical_start_time = physical_start_time;
    }

    pub fn set_granted_tag(&mut self, granted_tag: Instant) {
        self.granted_tag = granted_tag;
    }

    pub fn set_tag_pending(&mut self, tag_pending: bool) {
        self.tag_pending = tag_pending;
    }

    pub fn set_stop_requested(&mut self, stop_requested: bool) {
        self.stop_requested = stop_requested;
    }
}

/**
 * The direct federate-to-federate links, indexed by the remote federate
 * ID. An inbound slot is set by the accept loop on a successful
 * handshake and cleared by the listener on EOF or error; an outbound
 * slot is set when the outbound connection handshake completes and is
 * kept until process exit.
 */
pub struct PeerLinks {
    inbound: Mutex<Vec<Option<TcpStream>>>,
    outbound: Mutex<Vec<Option<TcpStream>>>,
}

impl PeerLinks {
    pub fn new(number_of_federates: u16) -> PeerLinks {
        let mut inbound = Vec::new();
        let mut outbound = Vec::new();
        for _i in 0..number_of_federates {
            inbound.push(None::<TcpStream>);
            outbound.push(None::<TcpStream>);
        }
        PeerLinks {
            inbound: Mutex::new(inbound),
            outbound: Mutex::new(outbound),
        }
    }

    pub fn set_inbound(&self, fed_id: u16, stream: TcpStream) {
        let idx: usize = fed_id.into();
        self.inbound.lock().unwrap()[idx] = Some(stream);
    }

    /// Take the inbound socket for the given federate out of its slot,
    /// shutting it down. Used by the listener on EOF or error.
    pub fn clear_inbound(&self, fed_id: u16) {
        let idx: usize = fed_id.into();
        if let Some(stream) = self.inbound.lock().unwrap()[idx].take() {
            // The remote side may already be gone.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Clone a handle to the inbound socket for a dedicated reader.
    pub fn inbound_stream(&self, fed_id: u16) -> Option<TcpStream> {
        let idx: usize = fed_id.into();
        match &self.inbound.lock().unwrap()[idx] {
            Some(stream) => stream.try_clone().ok(),
            None => None,
        }
    }

    pub fn has_inbound(&self, fed_id: u16) -> bool {
        let idx: usize = fed_id.into();
        self.inbound.lock().unwrap()[idx].is_some()
    }

    pub fn set_outbound(&self, fed_id: u16, stream: TcpStream) {
        let idx: usize = fed_id.into();
        self.outbound.lock().unwrap()[idx] = Some(stream);
    }

    pub fn has_outbound(&self, fed_id: u16) -> bool {
        let idx: usize = fed_id.into();
        self.outbound.lock().unwrap()[idx].is_some()
    }

    /// Lock the outbound slots for a serialized write to one peer.
    pub fn lock_outbound(&self) -> MutexGuard<Vec<Option<TcpStream>>> {
        self.outbound.lock().unwrap()
    }
}

/**
 * A federate's view of the federation: its identity, its connection to
 * the RTI, its direct peer links, and the time-coordination state.
 */
pub struct FederateRuntime {
    identity: FederateIdentity,
    number_of_federates: u16,
    num_inbound_physical: u16,  // Inbound physical connections expected.
    outbound_peers: Vec<u16>,   // Destination federates of outbound physical connections.
    fast_mode: bool,            // Skip the physical wait for the start time.
    time_state: Mutex<TimeState>,
    event_q_changed: Condvar, // Single condition variable for all wakeups.
    rti_read_stream: Mutex<Option<TcpStream>>, // Read half; taken by the RTI listener.
    server_socket: Mutex<Option<TcpListener>>, // Taken by the P2P accept loop.
    server_port: Mutex<i32>, // Port of the socket server, or -1 if none.
    peer_links: PeerLinks,
    scheduler: Arc<dyn Scheduler>,
}

impl FederateRuntime {
    pub fn new(
        identity: FederateIdentity,
        number_of_federates: u16,
        num_inbound_physical: u16,
        outbound_peers: Vec<u16>,
        has_upstream: bool,
        has_downstream: bool,
        fast_mode: bool,
        scheduler: Arc<dyn Scheduler>,
    ) -> FederateRuntime {
        FederateRuntime {
            identity,
            number_of_federates,
            num_inbound_physical,
            outbound_peers,
            fast_mode,
            time_state: Mutex::new(TimeState::new(has_upstream, has_downstream)),
            event_q_changed: Condvar::new(),
            rti_read_stream: Mutex::new(None),
            server_socket: Mutex::new(None),
            server_port: Mutex::new(-1),
            peer_links: PeerLinks::new(number_of_federates),
            scheduler,
        }
    }

    pub fn identity(&self) -> &FederateIdentity {
        &self.identity
    }

    pub fn fed_id(&self) -> u16 {
        self.identity.fed_id()
    }

    pub fn number_of_federates(&self) -> u16 {
        self.number_of_federates
    }

    pub fn num_inbound_physical(&self) -> u16 {
        self.num_inbound_physical
    }

    pub fn num_outbound_physical(&self) -> u16 {
        self.outbound_peers.len() as u16
    }

    pub fn outbound_peers(&self) -> &Vec<u16> {
        &self.outbound_peers
    }

    pub fn fast_mode(&self) -> bool {
        self.fast_mode
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn peer_links(&self) -> &PeerLinks {
        &self.peer_links
    }

    pub fn event_q_changed(&self) -> &Condvar {
        &self.event_q_changed
    }

    pub fn lock_time_state(&self) -> MutexGuard<TimeState> {
        self.time_state.lock().unwrap()
    }

    /// Store both halves of the freshly connected RTI stream: the write
    /// half inside the time state (writes happen under the mutex) and
    /// the read half for the RTI listener thread.
    pub fn set_rti_streams(&self, write_stream: TcpStream, read_stream: TcpStream) {
        self.lock_time_state().set_rti_stream(write_stream);
        *self.rti_read_stream.lock().unwrap() = Some(read_stream);
    }

    pub fn take_rti_read_stream(&self) -> Option<TcpStream> {
        self.rti_read_stream.lock().unwrap().take()
    }

    /// Read an exact reply from the RTI during startup, before the RTI
    /// listener thread has taken ownership of the read half.
    pub fn read_from_rti(&self, buffer: &mut [u8], err_msg: &str) -> Result<(), FederateError> {
        let mut guard = self.rti_read_stream.lock().unwrap();
        match guard.as_mut() {
            Some(stream) => {
                crate::net_util::NetUtil::read_from_socket(stream, buffer, self.fed_id(), err_msg)
            }
            None => Err(FederateError::Protocol(format!(
                "federate {} is not connected to the RTI",
                self.fed_id()
            ))),
        }
    }

    pub fn set_server(&self, socket: TcpListener, port: u16) {
        *self.server_socket.lock().unwrap() = Some(socket);
        *self.server_port.lock().unwrap() = port as i32;
    }

    pub fn take_server_socket(&self) -> Option<TcpListener> {
        self.server_socket.lock().unwrap().take()
    }

    pub fn server_port(&self) -> i32 {
        *self.server_port.lock().unwrap()
    }

    /// Block the calling thread until a STOP has been received.
    pub fn wait_until_stop_requested(&self) {
        let mut state = self.lock_time_state();
        while !state.stop_requested() {
            state = self.event_q_changed.wait(state).unwrap();
        }
    }
}
