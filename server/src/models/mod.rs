pub mod principal;
pub mod session;
pub mod token;
pub mod user;

pub use principal::*;
pub use session::*;
pub use token::*;
pub use user::*;
