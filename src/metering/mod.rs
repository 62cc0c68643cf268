pub mod audit;
pub mod meter;

pub use self::audit::spawn_call_logger;
pub use self::meter::{Consumed, Meter, MeteringError};
