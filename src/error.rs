/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Error taxonomy of the federate runtime.
 */
use thiserror::Error;

use crate::net_common::RejectReason;

#[derive(Debug, Error)]
pub enum FederateError {
    /// Fatal I/O failure on a socket. On the RTI socket this terminates
    /// the federate; on a peer socket it closes that link only.
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side closed the socket at a frame boundary. Distinct
    /// from Io because EOF on a peer socket is a normal teardown while
    /// EOF on the RTI socket is fatal.
    #[error("unexpected EOF on socket")]
    UnexpectedEof,

    /// Unexpected message type, short read inside a framed field,
    /// destination mismatch, or an oversized federation id.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote endpoint answered the identity handshake with REJECT.
    #[error("connection rejected: {0:?}")]
    Rejected(RejectReason),

    /// The retry budget for a connection attempt was exhausted.
    #[error("failed to connect after {0} retries")]
    ConnectionTimeout(u32),
}
