/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Outbound physical connections to peer federates.
 */
use std::net::{Ipv4Addr, TcpStream};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::*;
use crate::error::FederateError;
use crate::federate::FederateRuntime;
use crate::net_common::{
    MsgType, RejectReason, ADDRESS_QUERY_LENGTH, ADDRESS_QUERY_REPLY_LENGTH,
};
use crate::net_util::NetUtil;
use crate::rti_connector;

/**
 * Connect to the federate with the specified ID so that timed messages
 * can be sent to it directly, not through the RTI.
 *
 * The RTI is first asked for the peer's address with an ADDRESS_QUERY
 * message. The reply is raw, a port followed by an IPv4 address, with
 * no message type byte. A port of -1 means the peer has not yet
 * advertised its server, so the query is retried after
 * ADDRESS_QUERY_RETRY_INTERVAL nanoseconds; exhausting
 * CONNECT_NUM_RETRIES queries is fatal.
 *
 * A failure to connect or complete the handshake after
 * CONNECT_NUM_RETRIES attempts is a soft error: the federate proceeds
 * without this outbound link.
 */
pub fn connect_to_federate(
    federate: &FederateRuntime,
    remote_fed_id: u16,
) -> Result<(), FederateError> {
    let my_fed_id = federate.fed_id();

    // Ask the RTI for the port number and IP address of the remote
    // federate.
    let mut port: i32 = -1;
    let mut host_ip_addr = Ipv4Addr::UNSPECIFIED;
    let mut count_tries: u32 = 0;
    while port == -1 {
        {
            let state = federate.lock_time_state();
            let mut buffer = vec![0 as u8; ADDRESS_QUERY_LENGTH];
            buffer[0] = MsgType::AddressQuery.to_byte();
            NetUtil::encode_uint16(remote_fed_id, &mut buffer, 1);
            match state.rti_stream() {
                Some(stream) => NetUtil::write_to_socket(
                    stream,
                    &buffer,
                    my_fed_id,
                    "address query for the peer federate",
                )?,
                None => {
                    return Err(FederateError::Protocol(format!(
                        "federate {} is not connected to the RTI",
                        my_fed_id
                    )));
                }
            }
        }
        let mut reply = vec![0 as u8; ADDRESS_QUERY_REPLY_LENGTH];
        federate.read_from_rti(&mut reply, "the address reply for the peer federate")?;
        port = NetUtil::extract_int32(&reply)?;
        host_ip_addr = Ipv4Addr::from(NetUtil::extract_uint32(&reply[4..])?);

        // A reply of -1 means the RTI does not know the port number of
        // the remote federate yet, presumably because it has not sent
        // its ADDRESS_AD message. Wait and try again.
        if port == -1 {
            count_tries += 1;
            if count_tries >= CONNECT_NUM_RETRIES {
                warn!(
                    "Timed out on federate {} obtaining IP/port for federate {} from the RTI.",
                    my_fed_id, remote_fed_id
                );
                return Err(FederateError::ConnectionTimeout(CONNECT_NUM_RETRIES));
            }
            thread::sleep(Duration::from_nanos(ADDRESS_QUERY_RETRY_INTERVAL));
        }
    }
    debug!(
        "Federate {} received address {} port {} for federate {} from the RTI.",
        my_fed_id, host_ip_addr, port, remote_fed_id
    );

    let mut count_retries: u32 = 0;
    loop {
        let stream = match TcpStream::connect((host_ip_addr, port as u16)) {
            Ok(stream) => stream,
            Err(..) => {
                // The remote federate should be accepting connections,
                // but it may be busy accepting another one. Retry.
                count_retries += 1;
                if count_retries > CONNECT_NUM_RETRIES {
                    warn!(
                        "Federate {} failed to connect to federate {} after {} retries. Giving up.",
                        my_fed_id, remote_fed_id, CONNECT_NUM_RETRIES
                    );
                    return Ok(());
                }
                info!(
                    "Federate {} could not connect to federate {}. Will try again every {} nanoseconds.",
                    my_fed_id, remote_fed_id, ADDRESS_QUERY_RETRY_INTERVAL
                );
                thread::sleep(Duration::from_nanos(ADDRESS_QUERY_RETRY_INTERVAL));
                continue;
            }
        };

        rti_connector::send_fed_id(
            &stream,
            my_fed_id,
            federate.identity().federation_id(),
            MsgType::P2pSendingFedId,
        )?;

        let mut stream = stream;
        let mut response = vec![0 as u8; 1];
        NetUtil::read_from_socket(&mut stream, &mut response, my_fed_id, "ACK from the peer federate")?;
        if response[0] != MsgType::Ack.to_byte() {
            let mut cause = vec![0 as u8; 1];
            NetUtil::read_from_socket(
                &mut stream,
                &mut cause,
                my_fed_id,
                "the cause of rejection by the peer federate",
            )?;
            warn!(
                "Federate {} received a REJECT message from remote federate {} ({:?}).",
                my_fed_id,
                remote_fed_id,
                RejectReason::to_reject_reason(cause[0])
            );
            count_retries += 1;
            if count_retries > CONNECT_NUM_RETRIES {
                warn!(
                    "Federate {} failed the handshake with federate {} after {} retries. Giving up.",
                    my_fed_id, remote_fed_id, CONNECT_NUM_RETRIES
                );
                return Ok(());
            }
            thread::sleep(Duration::from_nanos(ADDRESS_QUERY_RETRY_INTERVAL));
            continue;
        }
        info!(
            "Federate {}: connected to federate {}, port {}.",
            my_fed_id, remote_fed_id, port
        );
        federate.peer_links().set_outbound(remote_fed_id, stream);
        return Ok(());
    }
}
