/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Socket read/write helpers and the little-endian wire codec.
 */
use std::io::{Read, Write};
use std::mem;
use std::net::TcpStream;

use tracing::warn;

use crate::error::FederateError;
use crate::tag::Instant;

/// Header of a timed message, as carried on the wire after the message
/// type byte: destination port, destination federate, payload length,
/// and timestamp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedMessageHeader {
    pub port_id: u16,
    pub dest_fed_id: u16,
    pub length: u32,
    pub timestamp: Instant,
}

/// Byte length of a TimedMessageHeader on the wire.
pub const TIMED_HEADER_LENGTH: usize =
    mem::size_of::<u16>() + mem::size_of::<u16>() + mem::size_of::<u32>() + mem::size_of::<i64>();

pub struct NetUtil {}

impl NetUtil {
    /**
     * Fill the whole buffer from the socket, looping over short reads.
     * EOF before the first byte is reported as UnexpectedEof so that the
     * caller can distinguish a peer closing at a frame boundary from a
     * broken frame; EOF in the middle of the buffer is a protocol error.
     */
    pub fn read_from_socket(
        stream: &mut TcpStream,
        buffer: &mut [u8],
        fed_id: u16,
        err_msg: &str,
    ) -> Result<(), FederateError> {
        let mut bytes_read = 0;
        while bytes_read < buffer.len() {
            match stream.read(&mut buffer[bytes_read..]) {
                Ok(0) => {
                    if bytes_read == 0 {
                        return Err(FederateError::UnexpectedEof);
                    }
                    return Err(FederateError::Protocol(format!(
                        "federate {} got a short read ({} of {} bytes) of {}",
                        fed_id,
                        bytes_read,
                        buffer.len(),
                        err_msg
                    )));
                }
                Ok(size) => bytes_read += size,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Federate {} failed to read {}.", fed_id, err_msg);
                    return Err(FederateError::Io(e));
                }
            }
        }
        Ok(())
    }

    /**
     * Write the whole buffer to the socket. Any failure on an RTI socket
     * is fatal to the caller; failures on peer sockets are handled at the
     * call sites.
     */
    pub fn write_to_socket(
        mut stream: &TcpStream,
        buffer: &[u8],
        fed_id: u16,
        err_msg: &str,
    ) -> Result<(), FederateError> {
        match stream.write_all(buffer) {
            Ok(..) => Ok(()),
            Err(e) => {
                warn!("Federate {} failed to write {}.", fed_id, err_msg);
                Err(FederateError::Io(e))
            }
        }
    }

    /**
     * Write the specified data as a sequence of bytes starting at the
     * specified index. This encodes the data in little-endian order
     * (lowest order byte first) regardless of the host byte order.
     */
    pub fn encode_int64(data: i64, buffer: &mut [u8], index: usize) {
        // This strategy is fairly brute force, but it avoids potential
        // alignment problems.
        let mut shift: i32 = 0;
        for i in 0..mem::size_of::<i64>() {
            buffer[index + i] = ((data >> shift) & 0xff) as u8;
            shift += 8;
        }
    }

    pub fn encode_int32(data: i32, buffer: &mut [u8], index: usize) {
        buffer[index] = (data & 0xff) as u8;
        buffer[index + 1] = ((data >> 8) & 0xff) as u8;
        buffer[index + 2] = ((data >> 16) & 0xff) as u8;
        buffer[index + 3] = ((data >> 24) & 0xff) as u8;
    }

    pub fn encode_uint32(data: u32, buffer: &mut [u8], index: usize) {
        buffer[index] = (data & 0xff) as u8;
        buffer[index + 1] = ((data >> 8) & 0xff) as u8;
        buffer[index + 2] = ((data >> 16) & 0xff) as u8;
        buffer[index + 3] = ((data >> 24) & 0xff) as u8;
    }

    pub fn encode_uint16(data: u16, buffer: &mut [u8], index: usize) {
        buffer[index] = (data & 0xff) as u8;
        buffer[index + 1] = ((data >> 8) & 0xff) as u8;
    }

    pub fn extract_int64(buffer: &[u8]) -> Result<i64, FederateError> {
        let size = mem::size_of::<i64>();
        if buffer.len() < size {
            return Err(FederateError::Protocol(format!(
                "buffer of {} bytes is too short for an int64",
                buffer.len()
            )));
        }
        match buffer[0..size].try_into() {
            Ok(bytes) => Ok(i64::from_le_bytes(bytes)),
            Err(e) => Err(FederateError::Protocol(format!(
                "failed to extract an int64 ({})",
                e
            ))),
        }
    }

    pub fn extract_int32(buffer: &[u8]) -> Result<i32, FederateError> {
        let size = mem::size_of::<i32>();
        if buffer.len() < size {
            return Err(FederateError::Protocol(format!(
                "buffer of {} bytes is too short for an int32",
                buffer.len()
            )));
        }
        match buffer[0..size].try_into() {
            Ok(bytes) => Ok(i32::from_le_bytes(bytes)),
            Err(e) => Err(FederateError::Protocol(format!(
                "failed to extract an int32 ({})",
                e
            ))),
        }
    }

    pub fn extract_uint32(buffer: &[u8]) -> Result<u32, FederateError> {
        let size = mem::size_of::<u32>();
        if buffer.len() < size {
            return Err(FederateError::Protocol(format!(
                "buffer of {} bytes is too short for a uint32",
                buffer.len()
            )));
        }
        match buffer[0..size].try_into() {
            Ok(bytes) => Ok(u32::from_le_bytes(bytes)),
            Err(e) => Err(FederateError::Protocol(format!(
                "failed to extract a uint32 ({})",
                e
            ))),
        }
    }

    pub fn extract_uint16(buffer: &[u8]) -> Result<u16, FederateError> {
        let size = mem::size_of::<u16>();
        if buffer.len() < size {
            return Err(FederateError::Protocol(format!(
                "buffer of {} bytes is too short for a uint16",
                buffer.len()
            )));
        }
        match buffer[0..size].try_into() {
            Ok(bytes) => Ok(u16::from_le_bytes(bytes)),
            Err(e) => Err(FederateError::Protocol(format!(
                "failed to extract a uint16 ({})",
                e
            ))),
        }
    }

    /**
     * Extract the header of a timed message from a 16-byte buffer.
     * The first two bytes are the ID of the destination port, the next
     * two the ID of the destination federate, the next four the payload
     * length, and the last eight the timestamp.
     */
    pub fn extract_timed_header(buffer: &[u8]) -> Result<TimedMessageHeader, FederateError> {
        if buffer.len() < TIMED_HEADER_LENGTH {
            return Err(FederateError::Protocol(format!(
                "buffer of {} bytes is too short for a timed message header",
                buffer.len()
            )));
        }
        let u16_size = mem::size_of::<u16>();
        let port_id = Self::extract_uint16(&buffer[0..])?;
        let dest_fed_id = Self::extract_uint16(&buffer[u16_size..])?;
        let length = Self::extract_uint32(&buffer[2 * u16_size..])?;
        let timestamp = Self::extract_int64(&buffer[2 * u16_size + mem::size_of::<u32>()..])?;
        Ok(TimedMessageHeader {
            port_id,
            dest_fed_id,
            length,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use socket_server_mocker::server_mocker::ServerMocker;
    use socket_server_mocker::server_mocker_instruction::{
        ServerMockerInstruction, ServerMockerInstructionsList,
    };
    use socket_server_mocker::tcp_server_mocker::TcpServerMocker;

    use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

    const MAX_BUFFER_SIZE: usize = 30000;
    const ERR_MESSAGE: &str = "test message";
    const I64_SIZE: usize = mem::size_of::<i64>();
    const LOCAL_HOST: &str = "127.0.0.1";

    fn generate_random_bytes(buffer_size: usize) -> Vec<u8> {
        let seed = [0u8; 32];
        let mut rng: StdRng = SeedableRng::from_seed(seed);
        let mut bytes = vec![0 as u8; buffer_size];
        rng.fill_bytes(&mut bytes);
        bytes.to_vec()
    }

    #[test]
    fn test_read_from_socket_positive() {
        let port_num = 35650;
        let tcp_server_mocker = TcpServerMocker::new(port_num).unwrap();
        let mut ip_address = LOCAL_HOST.to_owned();
        ip_address.push_str(":");
        ip_address.push_str(&port_num.to_string());
        let mut stream = TcpStream::connect(ip_address).unwrap();
        let mut rng = rand::thread_rng();
        let buffer_size: usize = rng.gen_range(1..MAX_BUFFER_SIZE);
        let msg = generate_random_bytes(buffer_size);
        let _ = tcp_server_mocker.add_mock_instructions_list(
            ServerMockerInstructionsList::new_with_instructions(
                [ServerMockerInstruction::SendMessage(msg.clone())].as_slice(),
            ),
        );
        let mut buffer = vec![0 as u8; buffer_size];
        NetUtil::read_from_socket(&mut stream, &mut buffer, 0, ERR_MESSAGE).unwrap();
        assert!(buffer == msg);
    }

    #[test]
    fn test_read_from_socket_eof_negative() {
        let listener = std::net::TcpListener::bind((LOCAL_HOST, 0)).unwrap();
        let address = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            // Accept and immediately close the connection.
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });
        let mut stream = TcpStream::connect(address).unwrap();
        handle.join().unwrap();
        let mut buffer = vec![0 as u8; 4];
        match NetUtil::read_from_socket(&mut stream, &mut buffer, 0, ERR_MESSAGE) {
            Err(FederateError::UnexpectedEof) => {}
            other => panic!("expected UnexpectedEof, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_write_to_socket_positive() {
        let port_num = 35654;
        let tcp_server_mocker = TcpServerMocker::new(port_num).unwrap();
        let mut ip_address = LOCAL_HOST.to_owned();
        ip_address.push_str(":");
        ip_address.push_str(&port_num.to_string());
        let stream = TcpStream::connect(ip_address).unwrap();
        let mut rng = rand::thread_rng();
        let buffer_size: usize = rng.gen_range(1..MAX_BUFFER_SIZE);
        let buffer = generate_random_bytes(buffer_size);
        NetUtil::write_to_socket(&stream, &buffer, 0, ERR_MESSAGE).unwrap();
        let _ = tcp_server_mocker.add_mock_instructions_list(
            ServerMockerInstructionsList::new_with_instructions(
                [ServerMockerInstruction::ReceiveMessage].as_slice(),
            ),
        );
        assert!(buffer == *tcp_server_mocker.pop_received_message().unwrap());
    }

    #[test]
    fn test_encode_int64_round_trip_positive() {
        let mut rng = rand::thread_rng();
        let value: i64 = rng.gen();
        let idx: usize = rng.gen_range(0..I64_SIZE);
        let mut buffer = vec![0 as u8; idx + I64_SIZE];
        NetUtil::encode_int64(value, &mut buffer, idx);
        assert!(NetUtil::extract_int64(&buffer[idx..]).unwrap() == value);
    }

    #[test]
    fn test_encode_int64_negative_value_positive() {
        let mut buffer = vec![0 as u8; I64_SIZE];
        NetUtil::encode_int64(-42, &mut buffer, 0);
        assert!(NetUtil::extract_int64(&buffer).unwrap() == -42);
        assert!(buffer == (-42 as i64).to_le_bytes());
    }

    #[test]
    fn test_encode_int32_round_trip_positive() {
        let mut rng = rand::thread_rng();
        let value: i32 = rng.gen();
        let mut buffer = vec![0 as u8; 4];
        NetUtil::encode_int32(value, &mut buffer, 0);
        assert!(NetUtil::extract_int32(&buffer).unwrap() == value);
    }

    #[test]
    fn test_encode_uint32_round_trip_positive() {
        let mut rng = rand::thread_rng();
        let value: u32 = rng.gen();
        let mut buffer = vec![0 as u8; 4];
        NetUtil::encode_uint32(value, &mut buffer, 0);
        assert!(NetUtil::extract_uint32(&buffer).unwrap() == value);
    }

    #[test]
    fn test_encode_uint16_round_trip_positive() {
        let mut rng = rand::thread_rng();
        let value: u16 = rng.gen();
        let mut buffer = vec![0 as u8; 2];
        NetUtil::encode_uint16(value, &mut buffer, 0);
        assert!(NetUtil::extract_uint16(&buffer).unwrap() == value);
    }

    #[test]
    fn test_wire_is_little_endian_positive() {
        // The wire order is fixed regardless of the host byte order.
        let mut buffer = vec![0 as u8; I64_SIZE];
        NetUtil::encode_int64(0x0102030405060708, &mut buffer, 0);
        assert!(buffer == vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        let mut buffer = vec![0 as u8; 2];
        NetUtil::encode_uint16(0x0102, &mut buffer, 0);
        assert!(buffer == vec![0x02, 0x01]);
    }

    #[test]
    fn test_extract_timed_header_round_trip_positive() {
        let mut rng = rand::thread_rng();
        let port_id: u16 = rng.gen();
        let dest_fed_id: u16 = rng.gen();
        let length: u32 = rng.gen_range(0..65536);
        let timestamp: i64 = rng.gen();
        let mut buffer = vec![0 as u8; TIMED_HEADER_LENGTH];
        NetUtil::encode_uint16(port_id, &mut buffer, 0);
        NetUtil::encode_uint16(dest_fed_id, &mut buffer, 2);
        NetUtil::encode_uint32(length, &mut buffer, 4);
        NetUtil::encode_int64(timestamp, &mut buffer, 8);
        let header = NetUtil::extract_timed_header(&buffer).unwrap();
        assert!(header.port_id == port_id);
        assert!(header.dest_fed_id == dest_fed_id);
        assert!(header.length == length);
        assert!(header.timestamp == timestamp);
    }

    #[test]
    fn test_extract_short_buffer_negative() {
        // Malformed inputs are reported as errors, never panics.
        assert!(NetUtil::extract_int64(&[0u8; 4]).is_err());
        assert!(NetUtil::extract_int32(&[0u8; 2]).is_err());
        assert!(NetUtil::extract_uint32(&[0u8; 2]).is_err());
        assert!(NetUtil::extract_uint16(&[0u8; 1]).is_err());
        assert!(NetUtil::extract_timed_header(&[0u8; 15]).is_err());
    }
}
