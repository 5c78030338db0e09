//! Runtime: flow control, gesture gate, text reveal and the player that
//! wires them to the host.

pub mod authoring;
pub mod flow;
pub mod gate;
pub mod player;
pub mod reveal;
pub mod sink;
pub mod validate;
