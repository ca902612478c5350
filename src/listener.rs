/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Dedicated listeners for inbound sockets and the bridge that
 * turns received timed messages into scheduled events.
 *
 * Every inbound socket has exactly one reader thread, so messages from
 * a given peer reach the scheduler in the order they arrive on that
 * socket. The mutex is never held across a socket read.
 */
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use tracing::{debug, error, warn};

use crate::error::FederateError;
use crate::federate::FederateRuntime;
use crate::net_common::MsgType;
use crate::net_util::{NetUtil, TIMED_HEADER_LENGTH};

/**
 * Listen for messages from the RTI: timed messages, time advance
 * grants, and stop requests. Returns with an error on EOF, on a fatal
 * I/O failure, and on an unrecognized message type; every such
 * condition on the RTI socket is fatal to the federate.
 */
pub fn listen_to_rti(
    federate: Arc<FederateRuntime>,
    mut stream: TcpStream,
) -> Result<(), FederateError> {
    let fed_id = federate.fed_id();
    loop {
        // Read one byte to get the message type.
        let mut header = vec![0 as u8; 1];
        NetUtil::read_from_socket(&mut stream, &mut header, fed_id, "message type from the RTI")?;
        match MsgType::to_msg_type(header[0]) {
            MsgType::TimedMessage => handle_timed_message(&federate, &mut stream)?,
            MsgType::TimeAdvanceGrant => federate.handle_time_advance_grant(&mut stream)?,
            MsgType::Stop => federate.handle_incoming_stop(&mut stream)?,
            _ => {
                return Err(FederateError::Protocol(format!(
                    "federate {} received from the RTI an unrecognized message type: {}",
                    fed_id, header[0]
                )));
            }
        }
    }
}

/// Spawn the dedicated RTI listener thread. Losing the RTI terminates
/// the federate.
pub fn spawn_rti_listener(federate: Arc<FederateRuntime>, stream: TcpStream) -> JoinHandle<()> {
    thread::spawn(move || {
        let fed_id = federate.fed_id();
        if let Err(e) = listen_to_rti(federate, stream) {
            error!(
                "Federate {} lost the connection to the RTI ({}). Exiting.",
                fed_id, e
            );
            std::process::exit(1);
        }
    })
}

/**
 * Listen for P2P_TIMED_MESSAGE frames from the specified peer federate
 * and schedule an event for each. EOF from the peer is a normal
 * teardown: the inbound slot is cleared and the thread exits cleanly.
 * Any other error closes the socket as well.
 */
pub fn listen_to_federate(federate: Arc<FederateRuntime>, fed_id: u16) {
    let my_fed_id = federate.fed_id();
    debug!("Federate {} listening to federate {}.", my_fed_id, fed_id);
    let mut stream = match federate.peer_links().inbound_stream(fed_id) {
        Some(stream) => stream,
        None => {
            warn!(
                "Federate {} has no inbound socket for federate {}.",
                my_fed_id, fed_id
            );
            return;
        }
    };

    loop {
        // Read one byte to get the message type.
        let mut header = vec![0 as u8; 1];
        match NetUtil::read_from_socket(&mut stream, &mut header, my_fed_id, "message type from the peer")
        {
            Ok(..) => {}
            Err(FederateError::UnexpectedEof) => {
                debug!(
                    "Federate {} received EOF from peer federate {}. Closing the socket.",
                    my_fed_id, fed_id
                );
                federate.peer_links().clear_inbound(fed_id);
                return;
            }
            Err(e) => {
                warn!(
                    "P2P socket between federate {} and {} broken ({}).",
                    my_fed_id, fed_id, e
                );
                federate.peer_links().clear_inbound(fed_id);
                return;
            }
        }
        match MsgType::to_msg_type(header[0]) {
            MsgType::P2pTimedMessage => {
                debug!(
                    "Federate {} handling timed P2P message from federate {}.",
                    my_fed_id, fed_id
                );
                if let Err(e) = handle_timed_message(&federate, &mut stream) {
                    warn!(
                        "Federate {} failed to handle a timed message from federate {} ({}). Closing the socket.",
                        my_fed_id, fed_id, e
                    );
                    federate.peer_links().clear_inbound(fed_id);
                    return;
                }
            }
            _ => {
                warn!(
                    "Federate {} received erroneous message type {} from federate {}. Closing the socket.",
                    my_fed_id, header[0], fed_id
                );
                federate.peer_links().clear_inbound(fed_id);
                return;
            }
        }
    }
}

/// Spawn a dedicated listener for one inbound peer socket. The peer id
/// is passed by value into the thread.
pub fn spawn_federate_listener(federate: Arc<FederateRuntime>, fed_id: u16) -> JoinHandle<()> {
    thread::spawn(move || listen_to_federate(federate, fed_id))
}

/**
 * Handle a timed message whose type byte has already been consumed:
 * read the 16-byte header and the payload, then schedule an event on
 * the trigger wired to the destination port at an offset equal to the
 * difference between the message timestamp and the current logical
 * time. The scheduler clamps negative offsets to zero (a tardy
 * message). Ownership of the payload transfers to the scheduler.
 */
pub fn handle_timed_message(
    federate: &FederateRuntime,
    stream: &mut TcpStream,
) -> Result<(), FederateError> {
    let my_fed_id = federate.fed_id();
    let mut header_buffer = vec![0 as u8; TIMED_HEADER_LENGTH];
    NetUtil::read_from_socket(stream, &mut header_buffer, my_fed_id, "timed message header")?;
    let header = NetUtil::extract_timed_header(&header_buffer)?;
    debug!(
        "Federate {} receiving a message of length {} to port {}.",
        my_fed_id, header.length, header.port_id
    );
    if header.dest_fed_id != my_fed_id {
        // A message routed to the wrong federate means the federation
        // wiring itself is broken.
        error!(
            "Federate {} received a timed message destined for federate {}. Exiting.",
            my_fed_id, header.dest_fed_id
        );
        std::process::exit(1);
    }

    let mut payload = vec![0 as u8; header.length as usize];
    NetUtil::read_from_socket(stream, &mut payload, my_fed_id, "timed message body")?;

    let trigger = match federate.scheduler().trigger_for_port(header.port_id) {
        Some(trigger) => trigger,
        None => {
            return Err(FederateError::Protocol(format!(
                "federate {} has no trigger for port {}",
                my_fed_id, header.port_id
            )));
        }
    };

    // Acquire the mutex to prevent logical time from advancing between
    // reading it and calling schedule().
    let state = federate.lock_time_state();
    let delay = header.timestamp - state.current_logical_time();
    federate.scheduler().schedule(trigger, delay, payload);
    debug!("Federate {} called schedule with delay {}.", my_fed_id, delay);
    // Notify the main thread in case it is blocked in next_event_time.
    federate.event_q_changed().notify_all();
    drop(state);
    Ok(())
}
