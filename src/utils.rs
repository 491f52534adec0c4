pub mod accessor;
pub mod logging;
pub mod windows;
