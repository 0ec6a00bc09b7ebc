pub mod format;
pub mod frame;
pub mod frame_buffer;
pub mod wav;

pub use format::SampleFormat;
pub use frame::AudioFrame;
pub use frame_buffer::FrameAlignedBuffer;
pub use wav::WavAudio;
