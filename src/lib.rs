#![crate_name = "flowvisor"]
#![crate_type = "lib"]

extern crate byteorder;
extern crate tokio;
#[macro_use]
extern crate futures;
extern crate bytes;
#[macro_use]
extern crate failure;
extern crate ini;

#[macro_use]
extern crate log;

mod bits;

pub mod buffer_bridge;
pub mod config;
pub mod engine;
pub mod message;
pub mod ofp_header;
pub mod ofp_message;
pub mod openflow;
pub mod openflow0x01;
pub mod packet;
pub mod port_map;
pub mod session;
pub mod slice;
pub mod stats;
pub mod topology;
pub mod translate;
pub mod xid;

mod flowvisor {
    pub use super::*;
}
