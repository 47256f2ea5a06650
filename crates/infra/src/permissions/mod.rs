//! Permission resolution, the authorization gate, and link-row lifecycle.

pub mod gate;
pub mod link_store;
pub mod resolver;
