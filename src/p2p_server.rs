/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Socket server for inbound physical connections from peer federates.
 */
use std::net::{Ipv4Addr, Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::constants::*;
use crate::error::FederateError;
use crate::federate::FederateRuntime;
use crate::listener;
use crate::net_common::{MsgType, RejectReason, ADDRESS_AD_LENGTH, FED_ID_HEADER_LENGTH};
use crate::net_util::NetUtil;

/**
 * Create a server to listen for incoming physical connections from
 * remote federates. If a port is specified, it is the only candidate;
 * otherwise the ports in STARTING_PORT..=STARTING_PORT+PORT_RANGE_LIMIT
 * are tried in order. On success the reserved port is advertised to the
 * RTI on an ADDRESS_AD message; no response is expected.
 */
pub fn create_server(federate: &FederateRuntime, specified_port: u16) -> Result<(), FederateError> {
    let fed_id = federate.fed_id();
    let mut port = if specified_port == 0 {
        STARTING_PORT
    } else {
        specified_port
    };
    debug!(
        "Federate {} attempting to create a socket server on port {}.",
        fed_id, port
    );
    let socket = loop {
        // An IPv4 socket listening on all interfaces. The platform
        // queues at most LISTEN_BACKLOG pending connections.
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(socket) => break socket,
            Err(..) if specified_port == 0 && port < STARTING_PORT + PORT_RANGE_LIMIT => {
                info!(
                    "Federate {} failed to get port {}. Trying {}.",
                    fed_id,
                    port,
                    port + 1
                );
                port += 1;
            }
            Err(e) => {
                if specified_port == 0 {
                    warn!(
                        "Federate {} cannot find a usable port. Consider increasing PORT_RANGE_LIMIT.",
                        fed_id
                    );
                } else {
                    warn!(
                        "Federate {} could not bind the specified port {}. Consider leaving the port unspecified.",
                        fed_id, port
                    );
                }
                return Err(FederateError::Io(e));
            }
        }
    };
    info!("Server for federate {} started using port {}.", fed_id, port);

    // Send the server port number to the RTI on an ADDRESS_AD message.
    let mut buffer = vec![0 as u8; ADDRESS_AD_LENGTH];
    buffer[0] = MsgType::AddressAd.to_byte();
    NetUtil::encode_uint32(port as u32, &mut buffer, 1);
    {
        let state = federate.lock_time_state();
        match state.rti_stream() {
            Some(stream) => {
                NetUtil::write_to_socket(stream, &buffer, fed_id, "address advertisement to the RTI")?
            }
            None => {
                return Err(FederateError::Protocol(format!(
                    "federate {} is not connected to the RTI",
                    fed_id
                )));
            }
        }
    }
    debug!("Federate {} sent port {} to the RTI.", fed_id, port);

    federate.set_server(socket, port);
    Ok(())
}

/**
 * Accept connections from other federates that send this federate
 * messages directly, not through the RTI. Each accepted peer must
 * identify itself with a P2P_SENDING_FED_ID frame carrying the matching
 * federation ID; a peer that fails the handshake is rejected and the
 * loop keeps waiting. A listener thread is started for each validated
 * peer, and after all expected peers have connected this waits for
 * those threads to exit before returning.
 */
pub fn handle_p2p_connections(federate: Arc<FederateRuntime>) {
    let my_fed_id = federate.fed_id();
    let socket = match federate.take_server_socket() {
        Some(socket) => socket,
        None => {
            warn!(
                "Federate {} has no socket server for P2P connections.",
                my_fed_id
            );
            return;
        }
    };

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    let mut received_federates = 0;
    while received_federates < federate.num_inbound_physical() {
        let (mut stream, peer_address) = match socket.accept() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    "Federate {} failed to accept a P2P connection ({}).",
                    my_fed_id, e
                );
                return;
            }
        };
        debug!(
            "Federate {} accepted new connection from remote federate at {}.",
            my_fed_id, peer_address
        );

        // The first message from the peer must carry its ID and the
        // federation ID.
        let mut header = vec![0 as u8; FED_ID_HEADER_LENGTH];
        let header_ok = NetUtil::read_from_socket(
            &mut stream,
            &mut header,
            my_fed_id,
            "P2P federate ID header",
        )
        .is_ok();
        if !header_ok || MsgType::to_msg_type(header[0]) != MsgType::P2pSendingFedId {
            warn!(
                "Federate {} received an invalid first message on the P2P socket. Closing it.",
                my_fed_id
            );
            send_reject(&stream, my_fed_id, RejectReason::WrongServer);
            let _ = stream.shutdown(Shutdown::Both);
            continue;
        }

        // Check the federation ID.
        let federation_id_length = header[FED_ID_HEADER_LENGTH - 1] as usize;
        let mut remote_federation_id = vec![0 as u8; federation_id_length];
        let federation_id_ok = NetUtil::read_from_socket(
            &mut stream,
            &mut remote_federation_id,
            my_fed_id,
            "P2P federation ID",
        )
        .is_ok();
        if !federation_id_ok
            || remote_federation_id != federate.identity().federation_id().as_bytes()
        {
            warn!(
                "Federate {} received an invalid federation ID. Closing the socket.",
                my_fed_id
            );
            send_reject(&stream, my_fed_id, RejectReason::FederationIdDoesNotMatch);
            let _ = stream.shutdown(Shutdown::Both);
            continue;
        }

        // Extract the ID of the sending federate.
        let remote_fed_id = match NetUtil::extract_uint16(&header[1..]) {
            Ok(remote_fed_id) => remote_fed_id,
            Err(..) => continue,
        };
        if remote_fed_id >= federate.number_of_federates() {
            warn!(
                "Federate {} received out-of-range sending federate ID {}.",
                my_fed_id, remote_fed_id
            );
            send_reject(&stream, my_fed_id, RejectReason::FederateIdOutOfRange);
            let _ = stream.shutdown(Shutdown::Both);
            continue;
        }
        debug!(
            "Federate {} received sending federate ID {}.",
            my_fed_id, remote_fed_id
        );
        federate.peer_links().set_inbound(remote_fed_id, stream);

        // Send an ACK and start a listener for this peer. The peer ID
        // is passed by value into the thread.
        let inbound = federate.peer_links().inbound_stream(remote_fed_id);
        let ack = [MsgType::Ack.to_byte()];
        let ack_ok = match inbound {
            Some(stream) => NetUtil::write_to_socket(
                &stream,
                &ack,
                my_fed_id,
                "ACK in response to the peer federate",
            )
            .is_ok(),
            None => false,
        };
        if !ack_ok {
            warn!(
                "Federate {} failed to acknowledge federate {}. Closing the socket.",
                my_fed_id, remote_fed_id
            );
            federate.peer_links().clear_inbound(remote_fed_id);
            continue;
        }
        handles.push(listener::spawn_federate_listener(
            federate.clone(),
            remote_fed_id,
        ));
        received_federates += 1;
    }

    debug!(
        "All remote federates are connected to federate {}.",
        my_fed_id
    );
    for handle in handles {
        let _ = handle.join();
        debug!(
            "Federate {}: thread listening for incoming P2P messages exited.",
            my_fed_id
        );
    }
}

/// Spawn the accept loop on its own thread.
pub fn spawn_p2p_accept_thread(federate: Arc<FederateRuntime>) -> JoinHandle<()> {
    thread::spawn(move || handle_p2p_connections(federate))
}

fn send_reject(stream: &TcpStream, fed_id: u16, reason: RejectReason) {
    let buffer = [MsgType::Reject.to_byte(), reason.to_byte()];
    // Ignore errors on this response.
    let _ = NetUtil::write_to_socket(stream, &buffer, fed_id, "reject response to the peer");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};
    use std::net::TcpStream;

    use crate::federate::FederateIdentity;
    use crate::scheduler::IdleScheduler;

    const LOCAL_HOST: &str = "127.0.0.1";

    fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind((LOCAL_HOST, 0)).unwrap();
        let address = listener.local_addr().unwrap();
        let client = TcpStream::connect(address).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn test_runtime(num_inbound: u16) -> Arc<FederateRuntime> {
        let identity = FederateIdentity::new(3, String::from("x")).unwrap();
        Arc::new(FederateRuntime::new(
            identity,
            8,
            num_inbound,
            Vec::new(),
            false,
            false,
            true,
            Arc::new(IdleScheduler::new()),
        ))
    }

    #[test]
    fn test_create_server_advertises_port_positive() {
        let runtime = test_runtime(1);
        let (write_half, mut rti_side) = stream_pair();
        runtime.lock_time_state().set_rti_stream(write_half);

        let port = 45301;
        create_server(&runtime, port).unwrap();
        assert!(runtime.server_port() == port as i32);

        let mut frame = vec![0 as u8; ADDRESS_AD_LENGTH];
        rti_side.read_exact(&mut frame).unwrap();
        assert!(frame[0] == MsgType::AddressAd.to_byte());
        assert!(NetUtil::extract_uint32(&frame[1..]).unwrap() == port as u32);
    }

    #[test]
    fn test_accept_validates_and_acknowledges_peer_positive() {
        let runtime = test_runtime(1);
        let (write_half, _rti_side) = stream_pair();
        runtime.lock_time_state().set_rti_stream(write_half);
        create_server(&runtime, 45303).unwrap();
        let accept_thread = spawn_p2p_accept_thread(runtime.clone());

        let mut peer = TcpStream::connect((LOCAL_HOST, 45303)).unwrap();
        peer.write_all(&[MsgType::P2pSendingFedId.to_byte(), 5, 0, 1, b'x'])
            .unwrap();
        let mut response = vec![0 as u8; 1];
        peer.read_exact(&mut response).unwrap();
        assert!(response[0] == MsgType::Ack.to_byte());
        assert!(runtime.peer_links().has_inbound(5));

        // Closing the peer lets its listener and then the accept thread
        // finish.
        drop(peer);
        accept_thread.join().unwrap();
        assert!(!runtime.peer_links().has_inbound(5));
    }

    #[test]
    fn test_accept_rejects_wrong_first_message_negative() {
        let runtime = test_runtime(1);
        let (write_half, _rti_side) = stream_pair();
        runtime.lock_time_state().set_rti_stream(write_half);
        create_server(&runtime, 45305).unwrap();
        let accept_thread = spawn_p2p_accept_thread(runtime.clone());

        // A federate that should have talked to the RTI instead.
        let mut confused = TcpStream::connect((LOCAL_HOST, 45305)).unwrap();
        confused
            .write_all(&[MsgType::FedId.to_byte(), 5, 0, 1, b'x'])
            .unwrap();
        let mut response = vec![0 as u8; 2];
        confused.read_exact(&mut response).unwrap();
        assert!(response[0] == MsgType::Reject.to_byte());
        assert!(response[1] == RejectReason::WrongServer.to_byte());

        // The accept loop keeps waiting for a valid peer.
        let mut peer = TcpStream::connect((LOCAL_HOST, 45305)).unwrap();
        peer.write_all(&[MsgType::P2pSendingFedId.to_byte(), 5, 0, 1, b'x'])
            .unwrap();
        let mut response = vec![0 as u8; 1];
        peer.read_exact(&mut response).unwrap();
        assert!(response[0] == MsgType::Ack.to_byte());
        drop(peer);
        accept_thread.join().unwrap();
    }

    #[test]
    fn test_accept_rejects_wrong_federation_id_negative() {
        let runtime = test_runtime(1);
        let (write_half, _rti_side) = stream_pair();
        runtime.lock_time_state().set_rti_stream(write_half);
        create_server(&runtime, 45307).unwrap();
        let accept_thread = spawn_p2p_accept_thread(runtime.clone());

        let mut imposter = TcpStream::connect((LOCAL_HOST, 45307)).unwrap();
        imposter
            .write_all(&[MsgType::P2pSendingFedId.to_byte(), 5, 0, 1, b'y'])
            .unwrap();
        let mut response = vec![0 as u8; 2];
        imposter.read_exact(&mut response).unwrap();
        assert!(response[0] == MsgType::Reject.to_byte());
        assert!(response[1] == RejectReason::FederationIdDoesNotMatch.to_byte());
        assert!(!runtime.peer_links().has_inbound(5));

        let mut peer = TcpStream::connect((LOCAL_HOST, 45307)).unwrap();
        peer.write_all(&[MsgType::P2pSendingFedId.to_byte(), 5, 0, 1, b'x'])
            .unwrap();
        let mut response = vec![0 as u8; 1];
        peer.read_exact(&mut response).unwrap();
        assert!(response[0] == MsgType::Ack.to_byte());
        drop(peer);
        accept_thread.join().unwrap();
    }
}
