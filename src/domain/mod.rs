pub mod envelope;
pub mod errors;
pub mod events;
pub mod outbox;
pub mod ports;
pub mod search;
