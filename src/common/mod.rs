pub mod error;

pub use error::ConvertError;
