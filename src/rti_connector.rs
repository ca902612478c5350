/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Connection to the RTI and the outbound message frames sent over it.
 */
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::*;
use crate::error::FederateError;
use crate::federate::{FederateRuntime, TimeState};
use crate::net_common::{MsgType, RejectReason, FED_ID_HEADER_LENGTH, TIMED_MESSAGE_HEADER_LENGTH, TIME_MESSAGE_LENGTH};
use crate::net_util::NetUtil;
use crate::tag::Instant;

/**
 * Connect to the RTI at the specified host and port and perform the
 * FED_ID handshake. If the port is 0, the ports in
 * STARTING_PORT..=STARTING_PORT+PORT_RANGE_LIMIT are tried in order,
 * wrapping around between full sweeps, with at most CONNECT_NUM_RETRIES
 * sweeps. A REJECT with FEDERATION_ID_DOES_NOT_MATCH or WRONG_SERVER on
 * an unspecified port means this endpoint belongs to some other
 * federation, so the scan advances to the next port; any other
 * rejection cause is fatal.
 *
 * On success both halves of the stream are registered with the runtime.
 */
pub fn connect_to_rti(
    federate: &FederateRuntime,
    hostname: &str,
    specified_port: u16,
) -> Result<(), FederateError> {
    let fed_id = federate.fed_id();
    let specific_port_given = specified_port != 0;
    let mut port = if specific_port_given {
        specified_port
    } else {
        STARTING_PORT
    };
    let mut count_retries: u32 = 0;
    loop {
        let stream = match TcpStream::connect((hostname, port)) {
            Ok(stream) => stream,
            Err(..) => {
                if !specific_port_given && port < STARTING_PORT + PORT_RANGE_LIMIT {
                    debug!(
                        "Federate {} failed to connect to RTI on port {}. Trying {}.",
                        fed_id,
                        port,
                        port + 1
                    );
                    port += 1;
                    continue;
                }
                // The whole range (or the one specified port) failed.
                if !specific_port_given {
                    port = STARTING_PORT;
                }
                count_retries += 1;
                if count_retries >= CONNECT_NUM_RETRIES {
                    warn!(
                        "Federate {} failed to connect to the RTI after {} retries. Giving up.",
                        fed_id, CONNECT_NUM_RETRIES
                    );
                    return Err(FederateError::ConnectionTimeout(CONNECT_NUM_RETRIES));
                }
                info!(
                    "Federate {} could not connect to RTI at {}. Will try again every {} seconds.",
                    fed_id, hostname, CONNECT_RETRY_INTERVAL
                );
                thread::sleep(Duration::from_secs(CONNECT_RETRY_INTERVAL));
                continue;
            }
        };

        // Have connected to an RTI, but not sure it's the right RTI.
        // Send a FED_ID message and wait for a reply.
        send_fed_id(&stream, fed_id, federate.identity().federation_id(), MsgType::FedId)?;

        let mut stream = stream;
        let mut response = vec![0 as u8; 1];
        NetUtil::read_from_socket(&mut stream, &mut response, fed_id, "response from the RTI")?;
        if response[0] == MsgType::Reject.to_byte() {
            // Read one more byte to determine the cause of rejection.
            let mut cause = vec![0 as u8; 1];
            NetUtil::read_from_socket(
                &mut stream,
                &mut cause,
                fed_id,
                "the cause of rejection by the RTI",
            )?;
            let reason = RejectReason::to_reject_reason(cause[0]);
            if !specific_port_given
                && (reason == RejectReason::FederationIdDoesNotMatch
                    || reason == RejectReason::WrongServer)
            {
                info!(
                    "Federate {} connected to the wrong RTI on port {}. Trying {}.",
                    fed_id,
                    port,
                    port + 1
                );
                if port < STARTING_PORT + PORT_RANGE_LIMIT {
                    port += 1;
                } else {
                    port = STARTING_PORT;
                    count_retries += 1;
                    if count_retries >= CONNECT_NUM_RETRIES {
                        return Err(FederateError::ConnectionTimeout(CONNECT_NUM_RETRIES));
                    }
                    thread::sleep(Duration::from_secs(CONNECT_RETRY_INTERVAL));
                }
                continue;
            }
            warn!(
                "RTI rejected the FED_ID message of federate {} with cause {:?}.",
                fed_id, reason
            );
            return Err(FederateError::Rejected(reason));
        }
        if response[0] != MsgType::Ack.to_byte() {
            return Err(FederateError::Protocol(format!(
                "federate {} expected ACK or REJECT from the RTI, got message type {}",
                fed_id, response[0]
            )));
        }
        info!("Federate {}: connected to RTI at {}:{}.", fed_id, hostname, port);
        let read_stream = stream.try_clone()?;
        federate.set_rti_streams(stream, read_stream);
        return Ok(());
    }
}

/**
 * Send an identity frame (FED_ID toward the RTI, P2P_SENDING_FED_ID
 * toward a peer): the message type, the federate ID, the one-byte
 * federation ID length, and the federation ID itself.
 */
pub fn send_fed_id(
    stream: &TcpStream,
    fed_id: u16,
    federation_id: &str,
    message_type: MsgType,
) -> Result<(), FederateError> {
    let mut buffer = vec![0 as u8; FED_ID_HEADER_LENGTH + federation_id.len()];
    buffer[0] = message_type.to_byte();
    NetUtil::encode_uint16(fed_id, &mut buffer, 1);
    buffer[FED_ID_HEADER_LENGTH - 1] = federation_id.len() as u8;
    buffer[FED_ID_HEADER_LENGTH..].copy_from_slice(federation_id.as_bytes());
    NetUtil::write_to_socket(stream, &buffer, fed_id, "federate and federation IDs")
}

/**
 * Send a time to the RTI on a 9-byte frame. The message type is one of
 * TIMESTAMP, NEXT_EVENT_TIME, LOGICAL_TIME_COMPLETE, or STOP. The
 * caller holds the runtime mutex, which serializes writes on the RTI
 * stream.
 */
pub fn send_time(
    state: &TimeState,
    fed_id: u16,
    message_type: MsgType,
    time: Instant,
) -> Result<(), FederateError> {
    debug!("Federate {} sending time {} to the RTI.", fed_id, time);
    let mut buffer = vec![0 as u8; TIME_MESSAGE_LENGTH];
    buffer[0] = message_type.to_byte();
    NetUtil::encode_int64(time, &mut buffer, 1);
    match state.rti_stream() {
        Some(stream) => NetUtil::write_to_socket(stream, &buffer, fed_id, "time to the RTI"),
        None => Err(FederateError::Protocol(format!(
            "federate {} is not connected to the RTI",
            fed_id
        ))),
    }
}

/**
 * Send a timestamped message to an input port of the destination
 * federate, either via the RTI (TIMED_MESSAGE) or directly over the
 * outbound peer link (P2P_TIMED_MESSAGE). The message carries the
 * current logical time as its timestamp. The header and body are
 * written under the runtime mutex, so at most one outbound write is in
 * flight per socket.
 */
pub fn send_timed_message(
    federate: &FederateRuntime,
    message_type: MsgType,
    port_id: u16,
    dest_fed_id: u16,
    message: &[u8],
) -> Result<(), FederateError> {
    let fed_id = federate.fed_id();
    let mut header = vec![0 as u8; TIMED_MESSAGE_HEADER_LENGTH];
    header[0] = message_type.to_byte();
    NetUtil::encode_uint16(port_id, &mut header, 1);
    NetUtil::encode_uint16(dest_fed_id, &mut header, 3);
    NetUtil::encode_uint32(message.len() as u32, &mut header, 5);

    // Hold the mutex from the timestamp read through the write so that
    // logical time cannot advance between the two.
    let state = federate.lock_time_state();
    let current_time = state.current_logical_time();
    NetUtil::encode_int64(current_time, &mut header, 9);
    debug!(
        "Federate {} sending message with timestamp {} to port {} of federate {}.",
        fed_id, current_time, port_id, dest_fed_id
    );
    match message_type {
        MsgType::TimedMessage => match state.rti_stream() {
            Some(stream) => {
                NetUtil::write_to_socket(stream, &header, fed_id, "timed message header to the RTI")?;
                NetUtil::write_to_socket(stream, message, fed_id, "timed message body to the RTI")
            }
            None => Err(FederateError::Protocol(format!(
                "federate {} is not connected to the RTI",
                fed_id
            ))),
        },
        MsgType::P2pTimedMessage => {
            let outbound = federate.peer_links().lock_outbound();
            match outbound.get(dest_fed_id as usize).and_then(|slot| slot.as_ref()) {
                Some(stream) => {
                    NetUtil::write_to_socket(
                        stream,
                        &header,
                        fed_id,
                        "timed message header to the peer",
                    )?;
                    NetUtil::write_to_socket(stream, message, fed_id, "timed message body to the peer")
                }
                None => {
                    warn!(
                        "Federate {} has no outbound connection to federate {}.",
                        fed_id, dest_fed_id
                    );
                    Err(FederateError::Protocol(format!(
                        "federate {} has no outbound connection to federate {}",
                        fed_id, dest_fed_id
                    )))
                }
            }
        }
        _ => Err(FederateError::Protocol(format!(
            "message type {:?} is not a timed message type",
            message_type
        ))),
    }
}
