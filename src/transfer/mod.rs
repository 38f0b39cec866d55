pub mod assembler;
pub mod client;

pub use assembler::{BlockAssembler, InFlightDownload, RecordOutcome};
pub use client::TransferClient;
