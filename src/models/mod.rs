pub mod identity;
pub mod session;
pub mod speech;

pub use identity::*;
pub use session::*;
pub use speech::*;
