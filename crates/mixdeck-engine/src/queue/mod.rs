//! Lock-free queues for real-time communication.

pub mod spsc;

pub use spsc::{spsc_queue, Consumer, Producer};
