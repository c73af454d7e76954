pub mod hooks;
pub mod requests;

pub use hooks::*;
pub use requests::*;
