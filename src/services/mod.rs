pub mod byte_range;
pub mod storage_service;
