//! Types and traits shared between the driver manager and the drivers
//! it supervises. This crate defines the wire protocols (spec §6.1,
//! §6.2), the data model's value representation, and the `Worker`
//! contract a protocol implementation has to satisfy -- it does not
//! contain the manager itself, which lives in `drvmgrd`.

mod error;
mod handle;
mod status;
mod value;

pub mod channel;
pub mod message;
pub mod worker;

pub use error::{Error, Result};
pub use handle::{DriverName, Handle, VarId};
pub use message::VarSetup;
pub use status::{DriverStatus, Stats};
pub use value::Value;
