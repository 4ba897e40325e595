pub mod channel;
pub mod envelope;
