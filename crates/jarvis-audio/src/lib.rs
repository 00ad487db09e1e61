pub mod device;
pub mod pcm;
pub mod playback;

pub use pcm::AudioBuffer;
pub use playback::{Clock, PlaybackScheduler};
