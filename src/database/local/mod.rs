pub mod auth;
pub mod state;
pub mod storage;

pub use state::{init_memory_state_db, init_state_db, StateDb};
