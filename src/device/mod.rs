pub mod btle;
pub mod cipher;
pub mod codec;
pub mod constants;
pub mod registry;
pub mod session;
pub mod status;
pub mod transport;
pub mod types;
