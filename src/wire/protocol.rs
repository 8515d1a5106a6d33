//! Wire protocol constants: message type codes, reply codes, and field widths.
//! Byte-exact; every integer is big-endian.

pub const TYPE_CODE_FSZ: usize = 1;

// Client-to-server message type codes.
pub const PING: u8 = 0x00;
pub const REQ_TOKEN: u8 = 0x01;
pub const REQ_SWAP_ROLES: u8 = 0x02;
pub const INF_ADDR: u8 = 0x03;
pub const INF_TRANSACTION: u8 = 0x04;
pub const INF_BLOCK: u8 = 0x05;
pub const REQ_BLOCK: u8 = 0x06;
pub const REQ_BLOCKS: u8 = 0x07;
pub const REQ_ADDR_LIST: u8 = 0x08;

// Server reply codes.
pub const PONG: u8 = 0x00;
pub const REP_PROCEED: u8 = 0x00;
pub const REP_STOP: u8 = 0x01;

pub const TOKEN_FSZ: usize = 4;
pub const HOSTNAME_LEN_FSZ: usize = 1;
pub const BLOCK_HEIGHT_FSZ: usize = 4;
pub const BLOCK_LIST_LEN_FSZ: usize = 1;
pub const ADDR_LIST_LEN_FSZ: usize = 1;

pub const MAX_HOSTNAME_LEN: usize = u8::MAX as usize;
pub const MAX_BLOCK_HEIGHT: u32 = u32::MAX;
pub const MAX_BLOCKS: usize = u8::MAX as usize;
pub const MAX_ADDRS: usize = u8::MAX as usize;

/// A peer address as exchanged on the wire: hostname plus port.
pub type Addr = (String, u16);
