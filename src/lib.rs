/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Federate-side runtime core for RTI-coordinated federated execution.
 *
 * The main entry point is synchronize_with_other_federates(), reached
 * through run(): connect to the RTI, open the direct peer links, agree
 * on a coordinated start time, and hand an initialized runtime to the
 * local scheduler.
 */
pub mod constants;
pub mod error;
pub mod federate;
pub mod listener;
pub mod net_common;
pub mod net_util;
pub mod p2p_client;
pub mod p2p_server;
pub mod rti_connector;
pub mod scheduler;
pub mod tag;
mod time_advance;

use std::sync::Arc;

use tracing::{debug, info};

pub use crate::error::FederateError;
pub use crate::federate::{FederateIdentity, FederateRuntime};

use crate::net_common::{MsgType, TIME_MESSAGE_LENGTH};
use crate::net_util::NetUtil;
use crate::scheduler::Scheduler;
use crate::tag::Instant;

pub struct Config {
    pub fed_id: u16,
    pub federation_id: String,
    pub rti_host: String,
    pub rti_port: u16,
    pub number_of_federates: u16,
    pub num_inbound_physical: u16,
    pub outbound_peers: Vec<u16>,
    pub has_upstream: bool,
    pub has_downstream: bool,
    pub server_port: u16,
    pub duration: Option<i64>,
    pub fast: bool,
}

impl Config {
    pub fn build(args: &[String]) -> Result<Config, &'static str> {
        let mut config = Config {
            fed_id: 0,
            federation_id: String::from("Unidentified Federation"),
            rti_host: String::from("localhost"),
            rti_port: 0,
            number_of_federates: 1,
            num_inbound_physical: 0,
            outbound_peers: Vec::new(),
            has_upstream: false,
            has_downstream: false,
            server_port: 0,
            duration: None,
            fast: false,
        };
        let mut idx = 1;
        while idx < args.len() {
            match args[idx].as_str() {
                "-i" | "--fed-id" => {
                    idx += 1;
                    config.fed_id = Self::parse_value(args, idx, "a federate ID")?;
                }
                "-f" | "--federation-id" => {
                    idx += 1;
                    match args.get(idx) {
                        Some(federation_id) => config.federation_id = federation_id.clone(),
                        None => return Err("a federation ID is missing"),
                    }
                }
                "-h" | "--host" => {
                    idx += 1;
                    match args.get(idx) {
                        Some(rti_host) => config.rti_host = rti_host.clone(),
                        None => return Err("an RTI hostname is missing"),
                    }
                }
                "-p" | "--port" => {
                    idx += 1;
                    config.rti_port = Self::parse_value(args, idx, "an RTI port")?;
                }
                "-n" | "--number-of-federates" => {
                    idx += 1;
                    config.number_of_federates =
                        Self::parse_value(args, idx, "a number of federates")?;
                }
                "--inbound" => {
                    idx += 1;
                    config.num_inbound_physical =
                        Self::parse_value(args, idx, "a number of inbound connections")?;
                }
                "--outbound" => {
                    idx += 1;
                    match args.get(idx) {
                        Some(list) => {
                            for piece in list.split(',') {
                                match piece.parse::<u16>() {
                                    Ok(peer) => config.outbound_peers.push(peer),
                                    Err(..) => return Err("an outbound peer ID is not a number"),
                                }
                            }
                        }
                        None => return Err("a list of outbound peer IDs is missing"),
                    }
                }
                "--upstream" => config.has_upstream = true,
                "--downstream" => config.has_downstream = true,
                "--server-port" => {
                    idx += 1;
                    config.server_port = Self::parse_value(args, idx, "a server port")?;
                }
                "-d" | "--duration" => {
                    idx += 1;
                    match args.get(idx) {
                        Some(value) => match value.parse::<i64>() {
                            Ok(duration) => config.duration = Some(duration),
                            Err(..) => return Err("a duration is not a number"),
                        },
                        None => return Err("a duration is missing"),
                    }
                }
                "--fast" => config.fast = true,
                _ => return Err("unrecognized argument"),
            }
            idx += 1;
        }
        if config.federation_id.len() > 255 {
            return Err("the federation ID is longer than 255 bytes");
        }
        Ok(config)
    }

    fn parse_value<T: std::str::FromStr>(
        args: &[String],
        idx: usize,
        what: &'static str,
    ) -> Result<T, &'static str> {
        match args.get(idx) {
            Some(value) => match value.parse::<T>() {
                Ok(parsed) => Ok(parsed),
                Err(..) => Err(what),
            },
            None => Err(what),
        }
    }
}

/**
 * Bring up a federate: connect to the RTI, create the socket server for
 * inbound physical connections and advertise it, open the outbound peer
 * links, and synchronize the start time. Returns the initialized
 * runtime for the local scheduler to drive.
 */
pub fn run(
    config: Config,
    scheduler: Arc<dyn Scheduler>,
) -> Result<Arc<FederateRuntime>, FederateError> {
    let identity = FederateIdentity::new(config.fed_id, config.federation_id.clone())?;
    let federate = Arc::new(FederateRuntime::new(
        identity,
        config.number_of_federates,
        config.num_inbound_physical,
        config.outbound_peers.clone(),
        config.has_upstream,
        config.has_downstream,
        config.fast,
        scheduler,
    ));

    rti_connector::connect_to_rti(&federate, &config.rti_host, config.rti_port)?;

    if federate.num_inbound_physical() > 0 {
        p2p_server::create_server(&federate, config.server_port)?;
        p2p_server::spawn_p2p_accept_thread(federate.clone());
    }

    for remote_fed_id in federate.outbound_peers().clone() {
        p2p_client::connect_to_federate(&federate, remote_fed_id)?;
    }

    synchronize_with_other_federates(&federate, config.duration)?;
    Ok(federate)
}

/**
 * Synchronize the start with the other federates via the RTI: send the
 * current physical time on a TIMESTAMP message, receive the coordinated
 * start time in reply, reset logical time to it, start the RTI listener
 * thread, and (unless fast mode is on) wait until physical time reaches
 * the start time.
 */
pub fn synchronize_with_other_federates(
    federate: &Arc<FederateRuntime>,
    duration: Option<i64>,
) -> Result<(), FederateError> {
    debug!(
        "Federate {} synchronizing with other federates.",
        federate.fed_id()
    );

    let start_time = get_start_time_from_rti(federate, federate.scheduler().now_physical())?;
    {
        let mut state = federate.lock_time_state();
        state.set_start_time(start_time);
        state.set_current_logical_time(start_time);
        if let Some(duration) = duration {
            // A duration has been specified. Recalculate the stop time.
            state.set_stop_time(start_time + duration);
        }
    }

    // Start a thread to listen for incoming messages from the RTI.
    match federate.take_rti_read_stream() {
        Some(stream) => {
            listener::spawn_rti_listener(federate.clone(), stream);
        }
        None => {
            return Err(FederateError::Protocol(format!(
                "federate {} is not connected to the RTI",
                federate.fed_id()
            )));
        }
    }

    // Unless fast mode was requested, wait until physical time matches
    // or exceeds the start time.
    if !federate.fast_mode() {
        federate.scheduler().wait_until(start_time);
    }
    debug!("Done waiting for start time {}.", start_time);

    // Reinitialize the physical start time to match the current
    // physical time. This will be different on each federate.
    let physical_start_time = federate.scheduler().now_physical();
    federate
        .lock_time_state()
        .set_physical_start_time(physical_start_time);
    Ok(())
}

/**
 * Send the federate's current physical time to the RTI and wait for the
 * reply carrying the coordinated start time. A reply that is not a
 * TIMESTAMP message is a protocol violation and is fatal.
 */
fn get_start_time_from_rti(
    federate: &Arc<FederateRuntime>,
    my_physical_time: Instant,
) -> Result<Instant, FederateError> {
    {
        let state = federate.lock_time_state();
        rti_connector::send_time(&state, federate.fed_id(), MsgType::Timestamp, my_physical_time)?;
    }

    let mut buffer = vec![0 as u8; TIME_MESSAGE_LENGTH];
    federate.read_from_rti(&mut buffer, "the TIMESTAMP message from the RTI")?;
    if MsgType::to_msg_type(buffer[0]) != MsgType::Timestamp {
        return Err(FederateError::Protocol(format!(
            "federate {} expected a TIMESTAMP message from the RTI, got message type {}",
            federate.fed_id(),
            buffer[0]
        )));
    }
    let timestamp = NetUtil::extract_int64(&buffer[1..])?;
    info!(
        "Federate {}: starting timestamp is {}.",
        federate.fed_id(),
        timestamp
    );
    Ok(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    use crate::scheduler::testing::RecordingScheduler;

    const LOCAL_HOST: &str = "127.0.0.1";

    fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind((LOCAL_HOST, 0)).unwrap();
        let address = listener.local_addr().unwrap();
        let client = TcpStream::connect(address).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_config_defaults_positive() {
        let args = vec![String::from("federate")];
        let config = Config::build(&args).unwrap();
        assert!(config.fed_id == 0);
        assert!(config.federation_id == "Unidentified Federation");
        assert!(config.rti_host == "localhost");
        assert!(config.rti_port == 0);
        assert!(config.number_of_federates == 1);
        assert!(config.duration.is_none());
        assert!(config.fast == false);
    }

    #[test]
    fn test_config_flags_positive() {
        let args: Vec<String> = [
            "federate", "-i", "3", "-f", "x", "-h", "rti.local", "-p", "15045", "-n", "4",
            "--inbound", "1", "--outbound", "1,2", "--upstream", "--downstream", "-d",
            "1000000000", "--fast",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let config = Config::build(&args).unwrap();
        assert!(config.fed_id == 3);
        assert!(config.federation_id == "x");
        assert!(config.rti_host == "rti.local");
        assert!(config.rti_port == 15045);
        assert!(config.number_of_federates == 4);
        assert!(config.num_inbound_physical == 1);
        assert!(config.outbound_peers == vec![1, 2]);
        assert!(config.has_upstream == true);
        assert!(config.has_downstream == true);
        assert!(config.duration == Some(1_000_000_000));
        assert!(config.fast == true);
    }

    #[test]
    fn test_config_bad_value_negative() {
        let args: Vec<String> = ["federate", "-i", "not-a-number"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(Config::build(&args).is_err());
        let args: Vec<String> = ["federate", "--bogus"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(Config::build(&args).is_err());
    }

    #[test]
    fn test_start_time_exchange_positive() {
        let scheduler = Arc::new(RecordingScheduler::new());
        scheduler.set_physical_time(1_000_000_000);
        let identity = FederateIdentity::new(3, String::from("x")).unwrap();
        let federate = Arc::new(FederateRuntime::new(
            identity,
            2,
            0,
            Vec::new(),
            true,
            true,
            true,
            scheduler.clone(),
        ));
        let (rti_client, mut rti_side) = stream_pair();
        federate.set_rti_streams(rti_client.try_clone().unwrap(), rti_client);

        let rti_handle = std::thread::spawn(move || {
            let mut frame = vec![0 as u8; TIME_MESSAGE_LENGTH];
            rti_side.read_exact(&mut frame).unwrap();
            assert!(frame[0] == MsgType::Timestamp.to_byte());
            assert!(NetUtil::extract_int64(&frame[1..]).unwrap() == 1_000_000_000);
            let mut reply = vec![0 as u8; TIME_MESSAGE_LENGTH];
            reply[0] = MsgType::Timestamp.to_byte();
            NetUtil::encode_int64(2_000_000_000, &mut reply, 1);
            rti_side.write_all(&reply).unwrap();
            // Keep the socket open: the RTI listener thread spawned by
            // the synchronization would treat EOF as fatal.
            std::mem::forget(rti_side);
        });

        synchronize_with_other_federates(&federate, Some(500)).unwrap();
        rti_handle.join().unwrap();

        let state = federate.lock_time_state();
        assert!(state.start_time() == 2_000_000_000);
        assert!(state.current_logical_time() == 2_000_000_000);
        assert!(state.stop_time() == 2_000_000_500);
        assert!(state.physical_start_time() == 1_000_000_000);
    }
}
