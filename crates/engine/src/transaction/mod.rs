//! Transaction state and bookkeeping
//!
//! This module contains:
//! - `state`: per-transaction record (locks held, buffered writes, backlog)
//! - `queues`: per-variable lock queues and per-site wait queues
//! - `manager`: the registry that owns transactions, queues and the wait-for graph

mod manager;
mod queues;
mod state;

pub use manager::TransactionManager;
pub use queues::{LockQueues, WaitQueues, Waiter};
pub use state::{Transaction, TransactionStatus};
