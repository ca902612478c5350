/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Process-wide constants for the federate runtime.
 */

/// The first port the RTI (and the federate's own socket server) is
/// expected to be listening on when no port is specified.
pub const STARTING_PORT: u16 = 15045;

/// Number of ports above STARTING_PORT to try before wrapping around.
pub const PORT_RANGE_LIMIT: u16 = 1024;

/// Number of full connection attempts before giving up.
pub const CONNECT_NUM_RETRIES: u32 = 100;

/// Seconds to wait between full sweeps of the port range.
pub const CONNECT_RETRY_INTERVAL: u64 = 2;

/// Nanoseconds to wait between address queries to the RTI for a peer
/// that has not yet advertised its port.
pub const ADDRESS_QUERY_RETRY_INTERVAL: u64 = 100_000_000;

/// Size of the stack buffer used by listener threads for message headers.
/// This does not constrain the message size because payloads are
/// heap-allocated at their declared length.
pub const BUFFER_SIZE: usize = 256;

/// Maximum number of queued connection requests on the federate's
/// socket server.
pub const LISTEN_BACKLOG: u32 = 128;
