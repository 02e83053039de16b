//! Session lifecycle: teardown and local player input

pub mod input;
pub mod reset;

pub use input::InputCommands;
pub use reset::SessionTeardown;
