pub mod constants;
mod wait;

pub use wait::poll_until;
