//! Local terminal input and output.
//!
//! - **keymapper**: Keyboard input to raw xterm byte sequence mapping
//! - **console**: Display surface over the local terminal

pub mod keymapper;
pub mod console;

pub use keymapper::*;
pub use console::Console;
