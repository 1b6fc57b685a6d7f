pub mod health;
pub mod proxy;

pub use health::health;
pub use proxy::proxy;
