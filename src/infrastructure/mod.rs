pub mod invoker;
pub mod storage;
