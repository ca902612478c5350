/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Message types exchanged between federates and the RTI.
 *
 * Every framed message on a socket begins with a one-byte message type.
 * The byte values must be stable across all members of a federation and
 * across the RTI.
 */
use std::mem;

/// Byte length of the federate-id frame header: message type, federate
/// ID, and federation-id length. The federation id itself follows.
pub const FED_ID_HEADER_LENGTH: usize = 1 + mem::size_of::<u16>() + 1;

/// Byte length of a time-carrying frame (TIMESTAMP, NEXT_EVENT_TIME,
/// LOGICAL_TIME_COMPLETE, TIME_ADVANCE_GRANT, STOP).
pub const TIME_MESSAGE_LENGTH: usize = 1 + mem::size_of::<i64>();

/// Byte length of a timed-message frame header: message type, port id,
/// destination federate id, payload length, and timestamp. The payload
/// follows.
pub const TIMED_MESSAGE_HEADER_LENGTH: usize =
    1 + mem::size_of::<u16>() + mem::size_of::<u16>() + mem::size_of::<u32>() + mem::size_of::<i64>();

/// Byte length of an address advertisement frame.
pub const ADDRESS_AD_LENGTH: usize = 1 + mem::size_of::<u32>();

/// Byte length of an address query frame.
pub const ADDRESS_QUERY_LENGTH: usize = 1 + mem::size_of::<u16>();

/// Byte length of the raw (untagged) reply to an address query:
/// a port number followed by an IPv4 address.
pub const ADDRESS_QUERY_REPLY_LENGTH: usize = mem::size_of::<i32>() + mem::size_of::<u32>();

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MsgType {
    Reject,
    FedId,
    Timestamp,
    AddressQuery,
    AddressAd,
    TimedMessage,
    NextEventTime,
    TimeAdvanceGrant,
    LogicalTimeComplete,
    Stop,
    P2pSendingFedId,
    P2pTimedMessage,
    Ack,
    Unidentified,
}

impl MsgType {
    pub fn to_byte(&self) -> u8 {
        match self {
            MsgType::Reject => 0,
            MsgType::FedId => 1,
            MsgType::Timestamp => 2,
            MsgType::AddressQuery => 3,
            MsgType::AddressAd => 4,
            MsgType::TimedMessage => 5,
            MsgType::NextEventTime => 6,
            MsgType::TimeAdvanceGrant => 7,
            MsgType::LogicalTimeComplete => 8,
            MsgType::Stop => 9,
            MsgType::P2pSendingFedId => 15,
            MsgType::P2pTimedMessage => 17,
            MsgType::Ack => 255,
            MsgType::Unidentified => 254,
        }
    }

    pub fn to_msg_type(val: u8) -> MsgType {
        match val {
            0 => MsgType::Reject,
            1 => MsgType::FedId,
            2 => MsgType::Timestamp,
            3 => MsgType::AddressQuery,
            4 => MsgType::AddressAd,
            5 => MsgType::TimedMessage,
            6 => MsgType::NextEventTime,
            7 => MsgType::TimeAdvanceGrant,
            8 => MsgType::LogicalTimeComplete,
            9 => MsgType::Stop,
            15 => MsgType::P2pSendingFedId,
            17 => MsgType::P2pTimedMessage,
            255 => MsgType::Ack,
            _ => MsgType::Unidentified,
        }
    }
}

/// Causes carried in the byte following a REJECT message type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RejectReason {
    FederationIdDoesNotMatch,
    FederateIdInUse,
    FederateIdOutOfRange,
    UnexpectedMessage,
    WrongServer,
    Unidentified,
}

impl RejectReason {
    pub fn to_byte(&self) -> u8 {
        match self {
            RejectReason::FederationIdDoesNotMatch => 1,
            RejectReason::FederateIdInUse => 2,
            RejectReason::FederateIdOutOfRange => 3,
            RejectReason::UnexpectedMessage => 4,
            RejectReason::WrongServer => 5,
            RejectReason::Unidentified => 255,
        }
    }

    pub fn to_reject_reason(val: u8) -> RejectReason {
        match val {
            1 => RejectReason::FederationIdDoesNotMatch,
            2 => RejectReason::FederateIdInUse,
            3 => RejectReason::FederateIdOutOfRange,
            4 => RejectReason::UnexpectedMessage,
            5 => RejectReason::WrongServer,
            _ => RejectReason::Unidentified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_byte_round_trip_positive() {
        let msg_types = [
            MsgType::Reject,
            MsgType::FedId,
            MsgType::Timestamp,
            MsgType::AddressQuery,
            MsgType::AddressAd,
            MsgType::TimedMessage,
            MsgType::NextEventTime,
            MsgType::TimeAdvanceGrant,
            MsgType::LogicalTimeComplete,
            MsgType::Stop,
            MsgType::P2pSendingFedId,
            MsgType::P2pTimedMessage,
            MsgType::Ack,
        ];
        for msg_type in msg_types {
            assert!(MsgType::to_msg_type(msg_type.to_byte()) == msg_type);
        }
    }

    #[test]
    fn test_unknown_byte_is_unidentified_negative() {
        assert!(MsgType::to_msg_type(200) == MsgType::Unidentified);
        assert!(RejectReason::to_reject_reason(200) == RejectReason::Unidentified);
    }

    #[test]
    fn test_reject_reason_byte_round_trip_positive() {
        let reasons = [
            RejectReason::FederationIdDoesNotMatch,
            RejectReason::FederateIdInUse,
            RejectReason::FederateIdOutOfRange,
            RejectReason::UnexpectedMessage,
            RejectReason::WrongServer,
        ];
        for reason in reasons {
            assert!(RejectReason::to_reject_reason(reason.to_byte()) == reason);
        }
    }
}
