pub mod check;
pub mod session;

pub use check::Check;
pub use session::{percentage, Session};
