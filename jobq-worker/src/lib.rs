pub mod error;
pub mod executor;
pub mod shutdown;
pub mod supervisor;
pub mod worker;
