pub mod expiry;
pub mod password;
pub mod token;

pub use expiry::*;
pub use password::*;
pub use token::*;
