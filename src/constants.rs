// SYNC is the byte that marks the beginning of a binary frame. Payload bytes that
// collide with it are sent twice.
pub const SYNC: u8 = 0xAA;

// PAYLOAD_LEN is the number of logical payload bytes in a frame (one little-endian f32).
pub const PAYLOAD_LEN: usize = 4;

// CHUNK_SIZE is the number of bytes requested per serial read. A stuffed frame is
// at most 10 bytes, so one chunk always has room for a whole frame.
pub const CHUNK_SIZE: usize = 12;

// RESIDUAL_CAPACITY bounds the bytes carried between reads while hunting for a frame.
pub const RESIDUAL_CAPACITY: usize = 2 * CHUNK_SIZE;

// REPLY_CAPACITY bounds an ASCII reply line.
pub const REPLY_CAPACITY: usize = 64;

// MAX_REPLY_READS bounds the reads spent waiting for a reply line.
pub const MAX_REPLY_READS: usize = 5;

// MAX_DRAIN_READS bounds the reads spent discarding a stream that was just stopped.
pub const MAX_DRAIN_READS: usize = 16;

// START_STREAM puts the transducer in continuous-streaming mode.
pub const START_STREAM: &[u8] = b"PC\r";

// STOP_STREAM ends continuous-streaming mode.
pub const STOP_STREAM: &[u8] = b"PS\r";

// READ_ASCII requests a single reading formatted as ASCII text.
pub const READ_ASCII: &[u8] = b"P\r\n";

// READ_BINARY requests a single reading as one binary frame.
pub const READ_BINARY: &[u8] = b"B\r\n";

// Configuration commands, sent as "<CMD> <n>\r".
pub const RATE_CMD: &str = "RATE";
pub const FILTER_CMD: &str = "IFILTER";
pub const AVERAGING_CMD: &str = "AVG";
