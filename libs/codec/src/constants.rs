//! Wire-level constants for the chat relay protocol
//!
//! These values are part of the line format shared by the relay and its
//! clients. Changing any of them breaks compatibility with running peers.

/// Width of the transmitted checksum field (one character per bit)
pub const CHECKSUM_BITS: usize = 32;

/// Separator between a frame tag and its body
pub const TAG_SEPARATOR: char = '|';

/// Line terminator for every frame
pub const LINE_TERMINATOR: u8 = b'\n';

/// Chat message payload, preceded by its checksum line
pub const TAG_MESSAGE: &str = "MESG";

/// A member joined (server to clients)
pub const TAG_JOINED: &str = "CONN";

/// A member left (server to clients)
pub const TAG_LEFT: &str = "GONE";

/// One roster entry, replayed to a newly joined client
pub const TAG_ROSTER: &str = "LIST";

/// Rejection notice sent back to the sender of a corrupt or malformed frame
pub const TAG_REJECTED: &str = "MERR";

/// Default upper bound on a single line, terminator excluded
///
/// Matches the 1024-byte receive buffer the protocol was designed around.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;
