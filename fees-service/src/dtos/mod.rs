pub mod payments;
pub mod students;

pub use payments::*;
pub use students::*;
