pub mod error;
pub mod id;
pub mod openai;
pub mod redis;
