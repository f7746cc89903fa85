pub mod audio_params;
pub mod channel_ring;
pub mod command;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod key_class;
pub mod loader;
pub mod micro_variator;
pub mod scheduler;
pub mod sound_bank;
pub mod wpm;

pub use audio_params::*;
pub use channel_ring::*;
pub use command::*;
pub use engine::*;
pub use error::*;
pub use ipc::*;
pub use key_class::*;
pub use loader::*;
pub use micro_variator::*;
pub use scheduler::*;
pub use sound_bank::*;
pub use wpm::*;
