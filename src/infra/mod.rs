pub mod file_queue;
pub mod local_storage;
pub mod s3_storage;
pub mod session_identity;
pub mod sigv4;
pub mod sqlite_store;
pub mod sqs_queue;
