pub mod encoder;
pub mod intent;
pub mod parse;

pub use encoder::encode;
pub use intent::{ContentIntent, Payload, WifiEncryption};
