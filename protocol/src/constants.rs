//! Wire constants for the covert channel

/// Number of values in the symbol domain (7 bits)
pub const SYMBOL_DOMAIN: u16 = 128;

/// Largest key accepted for a session
pub const MAX_KEY: u8 = 25;

/// Key used when nothing else is configured
pub const DEFAULT_KEY: u8 = 3;

/// Receiver host used when nothing else is configured
pub const DEFAULT_HOST: &str = "192.168.0.1";

/// IP protocol number for TCP
pub const IPPROTO_TCP: u8 = 6;

/// IPv4 header length without options
pub const IPV4_HEADER_LEN: usize = 20;

/// TCP header length without options
pub const TCP_HEADER_LEN: usize = 20;

/// Time-to-live written into datagrams we build ourselves
pub const DEFAULT_TTL: u8 = 64;

/// Advertised window on covert segments
pub const DEFAULT_WINDOW: u16 = 8192;

/// Default encrypted log file
pub const ENCRYPTED_LOG: &str = "enc_log.txt";

/// Default decrypted log file
pub const DECRYPTED_LOG: &str = "dec_log.txt";

/// Separator appended after every log entry
pub const LOG_SEPARATOR: char = ' ';
