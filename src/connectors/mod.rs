pub mod messages;
pub mod rest;
pub mod stream;
pub mod traits;
