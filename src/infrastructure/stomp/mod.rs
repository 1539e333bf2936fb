pub mod frame;

pub use frame::{StompCommand, StompFrame};
