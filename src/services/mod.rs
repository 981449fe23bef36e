pub mod invoker;
pub mod storage;
pub mod upload_service;
