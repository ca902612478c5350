/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Time primitives shared by the federate runtime and the local scheduler.
 */

/**
 * Time instant. Both physical and logical times are represented
 * using this typedef, in nanoseconds.
 */
pub type Instant = i64;

/**
 * Interval of time, in nanoseconds. May be negative (a tardy message
 * has a negative offset from the current logical time).
 */
pub type Interval = i64;

/// Sentinel earlier than every valid time instant.
pub const NEVER: Instant = i64::MIN;

/// Sentinel later than every valid time instant.
pub const FOREVER: Instant = i64::MAX;
