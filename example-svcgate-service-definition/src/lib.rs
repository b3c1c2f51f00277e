mod echo;
mod math;

pub use echo::{Echo, EchoClient};
pub use math::{Math, MathClient};
