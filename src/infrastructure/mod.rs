pub mod mail;
pub mod queue;
pub mod storage;
