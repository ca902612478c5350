/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Coordination of logical-time advancement with the RTI.
 *
 * All state here is guarded by the runtime's single mutex, and a single
 * condition variable is used for all wakeups: a TAG arrival, a STOP,
 * and any change to the local event queue all broadcast it. Waiters
 * re-check their predicates on every wakeup.
 */
use std::mem;
use std::net::TcpStream;

use tracing::{debug, warn};

use crate::error::FederateError;
use crate::federate::FederateRuntime;
use crate::net_common::MsgType;
use crate::net_util::NetUtil;
use crate::rti_connector;
use crate::tag::Instant;

impl FederateRuntime {
    /**
     * If this federate depends on upstream federates or sends data to
     * downstream federates, notify the RTI of the next event on the
     * event queue. If there are upstream federates, this blocks until
     * either the RTI grants the advance to the requested time or the
     * wait is interrupted by a change in the event queue that produced
     * an earlier event. Returns the largest time not exceeding the
     * argument to which the local scheduler may safely advance.
     */
    pub fn next_event_time(&self, time: Instant) -> Result<Instant, FederateError> {
        let mut state = self.lock_time_state();
        if !state.has_downstream() && !state.has_upstream() {
            // This federate is not connected (except possibly by
            // physical links), so there is no need for the RTI to get
            // involved.
            return Ok(time);
        }

        // If time advance has already been granted for this time or a
        // larger time, return immediately.
        if state.granted_tag() >= time {
            return Ok(time);
        }

        rti_connector::send_time(&state, self.fed_id(), MsgType::NextEventTime, time)?;
        debug!(
            "Federate {} sent next event time {} to the RTI.",
            self.fed_id(),
            time
        );

        // If there are no upstream federates, return immediately
        // without waiting for a reply. This federate does not need to
        // wait for any other federate.
        if !state.has_upstream() {
            return Ok(time);
        }

        state.set_tag_pending(true);
        while state.tag_pending() {
            // Wait until either something changes on the event queue or
            // the RTI has responded with a TAG.
            state = self.event_q_changed().wait(state).unwrap();
            if state.tag_pending() {
                // The RTI has not replied, so the wait must have been
                // interrupted by activity on the event queue. If there
                // is now an earlier event on the event queue, return
                // with the time of that event.
                if let Some(head_time) = self.scheduler().event_queue_head_time() {
                    if head_time < time {
                        return Ok(head_time);
                    }
                }
                // Any other activity on the event queue is not
                // relevant. Keep waiting for the TAG.
            }
        }
        Ok(state.granted_tag())
    }

    /**
     * Send a logical time complete (LTC) message to the RTI if there
     * are downstream federates. Otherwise do nothing.
     */
    pub fn logical_time_complete(&self, time: Instant) -> Result<(), FederateError> {
        let state = self.lock_time_state();
        if state.has_downstream() {
            debug!(
                "Federate {} is handling the completion of logical time {}.",
                self.fed_id(),
                time
            );
            rti_connector::send_time(&state, self.fed_id(), MsgType::LogicalTimeComplete, time)?;
        }
        Ok(())
    }

    /**
     * Send a STOP message carrying the current logical time to the RTI,
     * which will broadcast it to all federates.
     */
    pub fn broadcast_stop(&self) -> Result<(), FederateError> {
        let state = self.lock_time_state();
        debug!(
            "Federate {} requesting a whole program stop.",
            self.fed_id()
        );
        rti_connector::send_time(
            &state,
            self.fed_id(),
            MsgType::Stop,
            state.current_logical_time(),
        )
    }

    /**
     * Handle a time advance grant (TAG) message from the RTI. The time
     * is read from the socket before the mutex is acquired; the granted
     * tag is kept monotone, so a grant earlier than one already
     * received is discarded with a warning. Everything blocked on the
     * condition variable is notified.
     */
    pub fn handle_time_advance_grant(&self, stream: &mut TcpStream) -> Result<(), FederateError> {
        let mut buffer = vec![0 as u8; mem::size_of::<i64>()];
        NetUtil::read_from_socket(
            stream,
            &mut buffer,
            self.fed_id(),
            "the time advance grant from the RTI",
        )?;
        let tag = NetUtil::extract_int64(&buffer)?;

        let mut state = self.lock_time_state();
        if tag < state.granted_tag() {
            warn!(
                "Federate {} received a time advance grant {} earlier than the current grant {}. Discarding it.",
                self.fed_id(),
                tag,
                state.granted_tag()
            );
        } else {
            state.set_granted_tag(tag);
        }
        state.set_tag_pending(false);
        debug!("Federate {} received TAG {}.", self.fed_id(), tag);
        self.event_q_changed().notify_all();
        Ok(())
    }

    /**
     * Handle a STOP message from the RTI.
     * NOTE: The stop time is ignored. This federate will stop as soon
     * as possible.
     */
    pub fn handle_incoming_stop(&self, stream: &mut TcpStream) -> Result<(), FederateError> {
        let mut buffer = vec![0 as u8; mem::size_of::<i64>()];
        NetUtil::read_from_socket(stream, &mut buffer, self.fed_id(), "the stop time from the RTI")?;
        let stop_time = NetUtil::extract_int64(&buffer)?;

        let mut state = self.lock_time_state();
        debug!(
            "Federate {} received from the RTI a STOP request with time {}.",
            self.fed_id(),
            stop_time
        );
        state.set_stop_requested(true);
        self.event_q_changed().notify_all();
        Ok(())
    }
}
