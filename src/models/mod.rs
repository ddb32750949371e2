pub mod endpoint;
pub mod session;
pub mod race_result;
pub mod vulnerability;

pub use endpoint::*;
pub use session::*;
pub use race_result::*;
pub use vulnerability::*;
