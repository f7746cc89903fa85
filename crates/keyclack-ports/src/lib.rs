pub mod audio;
pub mod preset;
pub mod priority;
pub mod soundpack;
pub mod source;
pub mod storage;
pub mod types;

pub use audio::*;
pub use preset::*;
pub use priority::*;
pub use soundpack::*;
pub use source::*;
pub use storage::*;
pub use types::*;
