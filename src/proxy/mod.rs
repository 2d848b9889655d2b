pub mod engine;
pub mod key;

pub use engine::CachingProxy;
pub use key::KeyStrategyKind;
